//! Gate configuration
//!
//! Read from the environment; every input is optional and the gate runs on
//! defaults alone.
//!
//! | variable | default |
//! |---|---|
//! | `INTEL_GATE_STATE_DIR` | platform local data dir + `intel-gate` |
//! | `INTEL_INGEST_ENDPOINT` | unset (policy endpoint) |
//! | `INTEL_INGEST_API_KEY` | unset (falls back to the state dir) |
//! | `INTEL_INGEST_BEARER_TOKEN` | unset |
//! | `INTEL_INGEST_TIMEOUT_MS` | `10000` |
//! | `INTEL_GATE_SOURCE` | `field-app` |
//! | `INTEL_REJECTION_LOG_CAPACITY` | `100` |
//! | `INTEL_GOLDEN_RECORD_PATH` | unset |
//! | `INTEL_POWER_MODE` | `normal` |

use crate::policy::PowerMode;
use crate::state::default_state_dir;
use crate::transport::IngestConfig;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

/// Default `meta.source`
pub const DEFAULT_SOURCE: &str = "field-app";

/// Default rejection log size
pub const DEFAULT_REJECTION_LOG_CAPACITY: usize = 100;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Golden record file could not be read
    #[error("Failed to read golden record {path}: {source}")]
    GoldenRecordRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Golden record file is not JSON
    #[error("Failed to parse golden record {path}: {source}")]
    GoldenRecordParse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Gate configuration
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Directory for the queue snapshot and durable identifiers
    pub state_dir: PathBuf,
    /// Endpoint override (wins over state dir, golden record and default)
    pub endpoint: Option<String>,
    /// Ingest client settings
    pub ingest: IngestConfig,
    /// `meta.source` stamped on every envelope
    pub source: String,
    /// Rejection log ring buffer size
    pub rejection_log_capacity: usize,
    /// Optional golden record applied at startup
    pub golden_record_path: Option<PathBuf>,
    /// Power mode at startup
    pub power_mode: PowerMode,
    /// Whether the network is assumed online at startup
    pub start_online: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            endpoint: None,
            ingest: IngestConfig::default(),
            source: DEFAULT_SOURCE.to_string(),
            rejection_log_capacity: DEFAULT_REJECTION_LOG_CAPACITY,
            golden_record_path: None,
            power_mode: PowerMode::Normal,
            start_online: true,
        }
    }
}

impl GateConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            state_dir: std::env::var("INTEL_GATE_STATE_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_state_dir),
            endpoint: std::env::var("INTEL_INGEST_ENDPOINT")
                .ok()
                .filter(|s| !s.is_empty()),
            ingest: IngestConfig::from_env(),
            source: std::env::var("INTEL_GATE_SOURCE")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            rejection_log_capacity: std::env::var("INTEL_REJECTION_LOG_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_REJECTION_LOG_CAPACITY),
            golden_record_path: std::env::var("INTEL_GOLDEN_RECORD_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            power_mode: std::env::var("INTEL_POWER_MODE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            start_online: true,
        }
    }

    /// Use a specific state directory
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Override the ingest endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the ingest client settings
    pub fn with_ingest(mut self, ingest: IngestConfig) -> Self {
        self.ingest = ingest;
        self
    }

    /// Set `meta.source`
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the startup power mode
    pub fn with_power_mode(mut self, mode: PowerMode) -> Self {
        self.power_mode = mode;
        self
    }

    /// Set the golden record file
    pub fn with_golden_record_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.golden_record_path = Some(path.into());
        self
    }

    /// Set the startup connectivity assumption
    pub fn with_start_online(mut self, online: bool) -> Self {
        self.start_online = online;
        self
    }

    /// Set the rejection log size
    pub fn with_rejection_log_capacity(mut self, capacity: usize) -> Self {
        self.rejection_log_capacity = capacity;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::Invalid(
                    "endpoint must start with http:// or https://".to_string(),
                ));
            }
        }

        if self.source.is_empty() {
            return Err(ConfigError::Invalid("source cannot be empty".to_string()));
        }

        if self.rejection_log_capacity == 0 {
            return Err(ConfigError::Invalid(
                "rejection_log_capacity must be greater than 0".to_string(),
            ));
        }

        self.ingest.validate().map_err(ConfigError::Invalid)
    }

    /// Read the configured golden record, if any
    pub fn load_golden_record(&self) -> Result<Option<Value>, ConfigError> {
        let Some(path) = &self.golden_record_path else {
            return Ok(None);
        };

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::GoldenRecordRead {
            path: path.clone(),
            source,
        })?;
        let record = serde_json::from_str(&raw).map_err(|source| ConfigError::GoldenRecordParse {
            path: path.clone(),
            source,
        })?;
        Ok(Some(record))
    }
}
