//! Ingest client implementation
//!
//! One `POST {endpoint}` per batch with body `{"events": [...]}`. The
//! endpoint comes from the effective policy on every call, so policy updates
//! apply without rebuilding the client.

use super::{
    error::TransportError,
    types::{BatchOutcome, IngestConfig, IngestRequest, IngestResponse, INGEST_KEY_HEADER},
};
use crate::contracts::EventEnvelope;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Seam between the queue manager and the network
#[async_trait]
pub trait BatchSender: Send + Sync {
    /// Submit one batch; any `Err` is a failure for every envelope in it
    async fn send_batch(
        &self,
        endpoint: &str,
        events: &[EventEnvelope],
    ) -> Result<BatchOutcome, TransportError>;
}

/// HTTP ingest client
pub struct IngestClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: IngestConfig,
    /// Bearer token, replaceable at runtime
    bearer_token: Arc<RwLock<Option<String>>>,
}

impl IngestClient {
    /// Create a new ingest client with configuration
    pub fn new(config: IngestConfig) -> Result<Self, TransportError> {
        config.validate().map_err(TransportError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        let bearer_token = Arc::new(RwLock::new(config.bearer_token.clone()));
        Ok(Self {
            client,
            config,
            bearer_token,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self, TransportError> {
        Self::new(IngestConfig::from_env())
    }

    /// Replace (or clear) the bearer token used on subsequent requests
    pub async fn set_bearer_token(&self, token: Option<String>) {
        let mut current = self.bearer_token.write().await;
        *current = token.filter(|t| !t.is_empty());
        debug!(present = current.is_some(), "Bearer token updated");
    }

    /// Get configuration
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    async fn post_batch(
        &self,
        endpoint: &str,
        events: &[EventEnvelope],
    ) -> Result<BatchOutcome, TransportError> {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
        }

        let mut request = self
            .client
            .post(endpoint)
            .json(&IngestRequest { events });

        if let Some(ref api_key) = self.config.api_key {
            request = request.header(INGEST_KEY_HEADER, api_key);
        }
        if let Some(ref token) = *self.bearer_token.read().await {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000))
                .unwrap_or(1000);

            return Err(TransportError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            return Err(TransportError::ServiceError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        let parsed = if body.trim().is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<IngestResponse>(&body)
                    .map_err(|e| TransportError::MalformedResponse(e.to_string()))?,
            )
        };

        let outcome = BatchOutcome::reconcile(events.len(), parsed);
        if let Some(ref warning) = outcome.persistence_warning {
            warn!(warning = %warning, "Ingest service reported a persistence warning");
        }
        Ok(outcome)
    }

    fn map_send_error(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.config.timeout_ms)
        } else {
            TransportError::Network(error)
        }
    }
}

#[async_trait]
impl BatchSender for IngestClient {
    async fn send_batch(
        &self,
        endpoint: &str,
        events: &[EventEnvelope],
    ) -> Result<BatchOutcome, TransportError> {
        let result = self.post_batch(endpoint, events).await;
        match &result {
            Ok(outcome) => debug!(
                endpoint = %endpoint,
                submitted = outcome.submitted,
                accepted = outcome.accepted,
                "Batch delivered"
            ),
            Err(e) => warn!(
                endpoint = %endpoint,
                error = %e,
                retryable = e.is_retryable(),
                count = events.len(),
                "Batch delivery failed"
            ),
        }
        result
    }
}

impl Clone for IngestClient {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config.clone(),
            bearer_token: Arc::clone(&self.bearer_token),
        }
    }
}
