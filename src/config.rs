use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;

const ENV_PREFIX: &str = "APOD";
const DEFAULT_CONFIG_FILE: &str = "config/apod";

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub api: ApiSettings,
    pub schedule: ScheduleSettings,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file holding the `apod_data` table.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    pub base_url: String,
    pub endpoint: String,
    /// Resolved credential. Absent until the environment or a config file supplies it.
    pub key: Option<ApiKey>,
    pub timeout_secs: Option<u64>,
}

impl ApiSettings {
    /// Full request URL without the query string.
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// API credential. Never printed by `Debug`.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    #[cfg(test)]
    pub fn new(key: impl Into<String>) -> Self {
        ApiKey(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Trigger metadata handed to the external scheduler; the run itself ignores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    pub interval: String,
    pub catchup: bool,
}

impl Settings {
    /// Builder seeded with the built-in defaults only.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("database.path", "data/apod.sqlite")?
            .set_default("api.base_url", "https://api.nasa.gov")?
            .set_default("api.endpoint", "planetary/apod")?
            .set_default("schedule.interval", "@daily")?
            .set_default("schedule.catchup", false)
    }

    /// Defaults, then a config file, then `APOD_*` environment variables.
    ///
    /// An explicit `file` must exist; the implicit `config/apod.*` is optional.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_layered(file, DEFAULT_CONFIG_FILE)
    }

    fn load_layered(file: Option<&Path>, implicit: &str) -> Result<Self> {
        let builder = Self::defaults()?;
        let builder = match file {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name(implicit).required(false)),
        };
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
