use thiserror::Error;

/// Failure of a single pipeline step. Every variant fails the whole run.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP or network failure, including a non-2xx status or an unusable body.
    #[error("remote fetch failed: {0}")]
    RemoteFetch(String),

    /// DDL or DML failure against the store, constraint violations included.
    #[error("persistence failed: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// Missing or invalid connection/credential configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

// The request URL carries the API key, so it is dropped from the message.
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::RemoteFetch(e.without_url().to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Configuration(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
