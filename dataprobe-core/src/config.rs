//! Layered configuration: defaults, optional file, then `DATAPROBE_*` env vars

use crate::{DataProbeError, Result};
use config as config_rs;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Analysis service root, e.g. `http://localhost:8000`
    pub base_url: String,
    /// Delay between two status polls
    pub poll_interval_ms: u64,
    /// Give up after this many polls; `None` polls until cancelled
    pub max_poll_attempts: Option<u32>,
    pub preview_page_size: u32,
    pub request_timeout_secs: u64,
    /// How long transient poll failures are retried before surfacing
    pub transient_retry_window_secs: u64,
    /// Emit logs as JSON lines
    pub log_json: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            poll_interval_ms: 1000,
            max_poll_attempts: Some(3600),
            preview_page_size: 10,
            request_timeout_secs: 30,
            transient_retry_window_secs: 30,
            log_json: false,
        }
    }
}

impl ProbeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn transient_retry_window(&self) -> Duration {
        Duration::from_secs(self.transient_retry_window_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(DataProbeError::Configuration("base_url is empty".into()));
        }
        if self.preview_page_size == 0 {
            return Err(DataProbeError::Configuration(
                "preview_page_size must be at least 1".into(),
            ));
        }
        if self.max_poll_attempts == Some(0) {
            return Err(DataProbeError::Configuration(
                "max_poll_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Load configuration.
///
/// Sources, later ones winning: built-in defaults, the optional file at
/// `path` (format from its extension), environment variables prefixed with
/// `DATAPROBE_` (e.g. `DATAPROBE_POLL_INTERVAL_MS=500`).
pub fn load_config(path: Option<&Path>) -> Result<ProbeConfig> {
    let mut builder = config_rs::Config::builder()
        .add_source(config_rs::Config::try_from(&ProbeConfig::default())?);

    if let Some(path) = path {
        if !path.exists() {
            return Err(DataProbeError::Configuration(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        builder = builder.add_source(config_rs::File::from(path));
    }

    builder = builder.add_source(config_rs::Environment::with_prefix("DATAPROBE"));

    let cfg: ProbeConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}
