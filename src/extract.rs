use std::future::Future;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{ApiKey, ApiSettings};
use crate::error::{Error, Result};
use crate::transform::RawResponse;

const ERROR_BODY_PREVIEW: usize = 200;

/// Where a run gets its raw record from.
pub trait ApodSource {
    fn fetch(&self) -> impl Future<Output = Result<RawResponse>>;
}

/// One GET against the APOD endpoint per `fetch`, no retries.
pub struct ApodClient {
    http: Client,
    url: String,
    key: ApiKey,
}

impl ApodClient {
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let key = settings
            .key
            .clone()
            .filter(|k| !k.expose().trim().is_empty())
            .ok_or_else(|| Error::Configuration("api.key is not set (APOD_API__KEY)".into()))?;

        let url = settings.url();
        reqwest::Url::parse(&url)
            .map_err(|e| Error::Configuration(format!("invalid API url {}: {}", url, e)))?;

        let mut builder = Client::builder();
        if let Some(timeout) = settings.timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(ApodClient { http, url, key })
    }
}

impl ApodSource for ApodClient {
    async fn fetch(&self) -> Result<RawResponse> {
        info!("Fetching {}", self.url);
        let response = self
            .http
            .get(&self.url)
            .query(&[("api_key", self.key.expose())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!("{} answered {} ({} bytes)", self.url, status, body.len());

        if !status.is_success() {
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(Error::RemoteFetch(format!(
                "{} returned {}: {}",
                self.url, status, preview
            )));
        }
        parse_object(&body)
    }
}

fn parse_object(body: &str) -> Result<RawResponse> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::RemoteFetch(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(Error::RemoteFetch(format!("invalid JSON body: {}", e))),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
