use crate::config::SourceConfig;
use crate::error::{Result, ScrapError};
use crate::metrics::FetchMetrics;
use crate::types::{RawRecord, RecordSource};
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Split a decoded payload into records; the payload must be an array of objects
pub fn records_from_payload(payload: Value) -> Result<Vec<RawRecord>> {
    let items = match payload {
        Value::Array(items) => items,
        other => {
            return Err(ScrapError::Fetch {
                message: format!("expected a JSON array of records, got {}", json_kind(&other)),
            })
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            other => Err(ScrapError::Fetch {
                message: format!("record {} is {}, not an object", i, json_kind(&other)),
            }),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Fetches the weekly scrap batch from the measurement API
pub struct HttpRecordSource {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpRecordSource {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            token,
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| ScrapError::Config("source.url is not set".into()))?;
        Self::new(
            url,
            config.token.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }
}

#[async_trait::async_trait]
impl RecordSource for HttpRecordSource {
    fn source_name(&self) -> &str {
        &self.url
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_records(&self) -> Result<Vec<RawRecord>> {
        let started = Instant::now();
        let mut request = self.client.get(&self.url);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, token);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Request to {} failed: {}", self.url, e);
                FetchMetrics::record_error(&self.url);
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            FetchMetrics::record_error(&self.url);
            return Err(ScrapError::Fetch {
                message: format!("{} responded with HTTP {}", self.url, status.as_u16()),
            });
        }

        let payload: Value = response.json().await.map_err(|e| {
            FetchMetrics::record_error(&self.url);
            ScrapError::Http(e)
        })?;
        let records = records_from_payload(payload)?;

        let elapsed = started.elapsed().as_secs_f64();
        FetchMetrics::record_success(&self.url, elapsed);
        info!("Fetched {} records in {:.2}s", records.len(), elapsed);
        Ok(records)
    }
}

/// Reads a saved batch (the same JSON array the API returns) from disk
pub struct FileRecordSource {
    path: PathBuf,
    name: String,
}

impl FileRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }
}

#[async_trait::async_trait]
impl RecordSource for FileRecordSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(path = %self.name))]
    async fn fetch_records(&self) -> Result<Vec<RawRecord>> {
        let bytes = tokio::fs::read(&self.path).await?;
        let payload: Value = serde_json::from_slice(&bytes)?;
        let records = records_from_payload(payload)?;
        debug!("Loaded {} records from {}", records.len(), self.name);
        Ok(records)
    }
}
