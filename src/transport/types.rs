//! Ingest wire types and client configuration

use crate::contracts::EventEnvelope;
use serde::{Deserialize, Serialize};

/// Header carrying the ingest API key
pub const INGEST_KEY_HEADER: &str = "x-intel-ingest-key";

/// Default request timeout (10 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Request body
#[derive(Debug, Clone, Serialize)]
pub struct IngestRequest<'a> {
    pub events: &'a [EventEnvelope],
}

/// Response body; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    #[serde(default)]
    pub accepted_count: Option<u64>,
    #[serde(default)]
    pub rejected_count: Option<u64>,
    #[serde(default)]
    pub persisted_count: Option<u64>,
    #[serde(default)]
    pub persistence_warning: Option<String>,
}

/// Outcome of one batch submission, reconciled against what was sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Envelopes submitted
    pub submitted: usize,
    /// Envelopes the backend accepted (≤ submitted)
    pub accepted: usize,
    /// `submitted - accepted`
    pub rejected: usize,
    /// Backend-reported durable writes, if any
    pub persisted: Option<usize>,
    /// Backend persistence warning, if any
    pub persistence_warning: Option<String>,
}

impl BatchOutcome {
    /// Everything accepted
    pub fn all_accepted(submitted: usize) -> Self {
        Self::reconcile(submitted, None)
    }

    /// Reconcile a 2xx response with the submitted count
    ///
    /// Missing `acceptedCount` falls back to `submitted - rejectedCount`, and
    /// to "all accepted" when both are absent. Counts are clamped to
    /// `submitted`.
    pub fn reconcile(submitted: usize, response: Option<IngestResponse>) -> Self {
        let response = response.unwrap_or_default();
        let clamp = |n: u64| usize::try_from(n).unwrap_or(usize::MAX).min(submitted);

        let accepted = match (response.accepted_count, response.rejected_count) {
            (Some(accepted), _) => clamp(accepted),
            (None, Some(rejected)) => submitted - clamp(rejected),
            (None, None) => submitted,
        };

        Self {
            submitted,
            accepted,
            rejected: submitted - accepted,
            persisted: response.persisted_count.map(clamp),
            persistence_warning: response.persistence_warning,
        }
    }
}

/// Configuration for the ingest client
#[derive(Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Value for the `x-intel-ingest-key` header
    pub api_key: Option<String>,
    /// Initial bearer token
    pub bearer_token: Option<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            bearer_token: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl std::fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl IngestConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("INTEL_INGEST_API_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            bearer_token: std::env::var("INTEL_INGEST_BEARER_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            timeout_ms: std::env::var("INTEL_INGEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the initial bearer token
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set the request timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }

        if let Some(key) = &self.api_key {
            if key.chars().any(|c| c.is_control()) {
                return Err("api_key contains control characters".to_string());
            }
        }

        Ok(())
    }
}
