//! Transport errors

use thiserror::Error;

/// Errors from the ingest transport
///
/// Every variant counts as a batch failure for queue bookkeeping.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network/HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Request timeout
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Ingest service returned a non-success status
    #[error("Service error: {status} - {message}")]
    ServiceError { status: u16, message: String },

    /// Rate limited by the ingest service
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// 2xx response whose body could not be interpreted
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Endpoint is not an http(s) URL
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TransportError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_)
            | TransportError::Timeout(_)
            | TransportError::RateLimited { .. }
            | TransportError::MalformedResponse(_) => true,
            TransportError::ServiceError { status, .. } => *status >= 500 || *status == 408,
            TransportError::InvalidEndpoint(_) | TransportError::InvalidConfig(_) => false,
        }
    }

    /// Short label recorded as an item's `last_error`
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Network(_) => "network_error",
            TransportError::Timeout(_) => "timeout",
            TransportError::ServiceError { .. } => "http_error",
            TransportError::RateLimited { .. } => "rate_limited",
            TransportError::MalformedResponse(_) => "malformed_response",
            TransportError::InvalidEndpoint(_) => "invalid_endpoint",
            TransportError::InvalidConfig(_) => "invalid_config",
        }
    }
}
