//! Engine configuration: defaults, then an optional file, then `WARDWATCH__*`
//! environment variables.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EngineError, Result};

pub const ENV_PREFIX: &str = "WARDWATCH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Live reading poll period
    pub poll_interval_ms: u64,
    /// Device directory (alert) refresh period
    pub alert_refresh_secs: u64,
    pub prediction_ttl_secs: u64,
    pub prediction_cache_path: PathBuf,
    /// Backend base URL; `None` means fixture-only operation
    pub backend_url: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            alert_refresh_secs: 30,
            prediction_ttl_secs: 3_600,
            prediction_cache_path: PathBuf::from("prediction-cache.json"),
            backend_url: None,
            request_timeout_ms: 10_000,
        }
    }
}

impl EngineConfig {
    /// Layer defaults, `path` (format chosen by extension) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        tracing::debug!(?config, "Engine configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(EngineError::InvalidConfig("poll_interval_ms must be positive".into()));
        }
        if self.alert_refresh_secs == 0 {
            return Err(EngineError::InvalidConfig("alert_refresh_secs must be positive".into()));
        }
        if self.prediction_ttl_secs == 0 {
            return Err(EngineError::InvalidConfig("prediction_ttl_secs must be positive".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig("request_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn alert_refresh(&self) -> Duration {
        Duration::from_secs(self.alert_refresh_secs)
    }

    pub fn prediction_ttl(&self) -> Duration {
        Duration::from_secs(self.prediction_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
