use crate::clean::CleanOptions;
use crate::constants::{DEFAULT_PORT, FETCH_TIMEOUT_SECS};
use crate::error::{Result, ScrapError};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub server: ServerConfig,
    pub cleaning: CleanOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Endpoint returning the JSON array of scrap records
    pub url: Option<String>,
    /// Sent verbatim as the `Authorization` header
    pub token: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout_seconds: FETCH_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Prometheus exporter port; no exporter when unset
    pub metrics_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load `path` (defaults when the file is absent), then apply environment overrides
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_content = fs::read_to_string(path).map_err(|e| {
            ScrapError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Override file settings with `SCRAP_*` variables resolved by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SCRAP_API_URL") {
            self.source.url = Some(url);
        }
        if let Some(token) = lookup("SCRAP_API_TOKEN") {
            self.source.token = Some(token);
        }
        if let Some(port) = lookup("SCRAP_PORT") {
            self.server.port = parse_port("SCRAP_PORT", &port)?;
        }
        if let Some(port) = lookup("SCRAP_METRICS_PORT") {
            self.server.metrics_port = Some(parse_port("SCRAP_METRICS_PORT", &port)?);
        }
        Ok(())
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
    value
        .trim()
        .parse()
        .map_err(|e| ScrapError::Config(format!("{key}='{value}' is not a valid port: {e}")))
}
