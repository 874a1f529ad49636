//! Configuration file parsing and validation.
//!
//! The capture and forwarder settings live in one TOML file:
//!
//! ```toml
//! [capture]
//! trigger_source = "gpio60"
//! buffer_capacity = 4096
//!
//! [forwarder]
//! endpoint_url = "https://ingest.example.com/v1/pulses"
//! credential = "secret-token"
//! batch_max_records = 100
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PulseConfig {
    pub capture: CaptureConfig,
    pub forwarder: ForwarderConfig,
}

/// Capture-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    /// Identity of the monitored line, e.g. `gpio60`.
    pub trigger_source: String,

    /// Ring size in records. Must be a non-zero power of two.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Capture device exporting 24-byte records, read by `forward` and `dump`.
    #[serde(default)]
    pub device: Option<PathBuf>,
}

/// Forwarder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForwarderConfig {
    /// Ingestion URL. Must be `https`.
    pub endpoint_url: String,

    /// Opaque ingestion credential, sent verbatim in `credential_header`.
    pub credential: String,

    #[serde(default = "default_credential_header")]
    pub credential_header: String,

    /// Maximum records per POST.
    #[serde(default = "default_batch_max_records")]
    pub batch_max_records: usize,

    /// Sleep between polls when the capture channel has nothing to read.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Accept any TLS certificate from the sink. Off unless set explicitly.
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

fn default_buffer_capacity() -> usize {
    4096
}

fn default_credential_header() -> String {
    "Authorization".to_string()
}

fn default_batch_max_records() -> usize {
    100
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl PulseConfig {
    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        let forwarder = &self.forwarder;

        if capture.trigger_source.trim().is_empty() {
            return Err(ConfigError::Validation(
                "capture.trigger_source must not be empty".into(),
            ));
        }
        if !capture.buffer_capacity.is_power_of_two() {
            return Err(ConfigError::Validation(format!(
                "capture.buffer_capacity must be a non-zero power of two, got {}",
                capture.buffer_capacity
            )));
        }

        let url = Url::parse(&forwarder.endpoint_url).map_err(|err| {
            ConfigError::Validation(format!("forwarder.endpoint_url is invalid: {err}"))
        })?;
        if url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "forwarder.endpoint_url must use https, got {}",
                url.scheme()
            )));
        }
        if forwarder.credential.is_empty() {
            return Err(ConfigError::Validation(
                "forwarder.credential must not be empty".into(),
            ));
        }
        let header = forwarder.credential_header.as_bytes();
        if reqwest::header::HeaderName::from_bytes(header).is_err() {
            return Err(ConfigError::Validation(format!(
                "forwarder.credential_header {:?} is not a valid header name",
                forwarder.credential_header
            )));
        }
        if forwarder.batch_max_records == 0
            || forwarder.batch_max_records > capture.buffer_capacity
        {
            return Err(ConfigError::Validation(format!(
                "forwarder.batch_max_records must be between 1 and {}, got {}",
                capture.buffer_capacity, forwarder.batch_max_records
            )));
        }
        if forwarder.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "forwarder.request_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl ForwarderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
