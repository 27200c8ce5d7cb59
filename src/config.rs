//! Viewer configuration.
//!
//! Layered with the `config` crate, later sources winning:
//!
//! | Source                       | Example                    |
//! |------------------------------|----------------------------|
//! | built-in defaults            | `localhost:3000`           |
//! | optional TOML file           | `webviz.toml`              |
//! | `WEBVIZ_*` environment       | `WEBVIZ_PORT=3001`         |
//!
//! CLI flags are applied on top by the binary.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{endpoint_url, DEFAULT_PORT};
use crate::session::DEFAULT_LOG_CAPACITY;

pub const ENV_PREFIX: &str = "WEBVIZ";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub host: String,
    pub port: u16,
    /// Use `wss://`.
    pub secure: bool,
    pub frame_rate_hz: f32,
    pub status_interval_secs: u64,
    /// Lines kept per log pane.
    pub log_capacity: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            secure: false,
            frame_rate_hz: 30.0,
            status_interval_secs: 5,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl ViewerConfig {
    /// Defaults, then `file` (if given and present), then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let loaded: ViewerConfig = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host is empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".into()));
        }
        if !(self.frame_rate_hz.is_finite() && self.frame_rate_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "frame_rate_hz must be positive, got {}",
                self.frame_rate_hz
            )));
        }
        if self.log_capacity == 0 {
            return Err(ConfigError::Invalid("log_capacity must be non-zero".into()));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> String {
        endpoint_url(&self.host, self.port, self.secure)
    }

    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f32(1.0 / self.frame_rate_hz)
    }
}
