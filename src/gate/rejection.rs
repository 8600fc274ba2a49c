//! Admission rejections
//!
//! Rejections are terminal: they are logged, recorded in a bounded ring
//! buffer for diagnostics and never queued or replayed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;

/// Longest preview kept per field, in characters
pub const PREVIEW_CHARS: usize = 160;

/// Why `emit` refused an event, in check order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("unknown_event")]
    UnknownEvent,
    #[error("payload_not_object")]
    PayloadNotObject,
    #[error("schema_validation_failed")]
    SchemaValidationFailed,
    #[error("power_mode_drop_noncritical")]
    PowerModeDropNoncritical,
    #[error("rate_limit_exceeded")]
    RateLimitExceeded,
    #[error("replay_nonce_detected")]
    ReplayNonceDetected,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::UnknownEvent => "unknown_event",
            RejectionReason::PayloadNotObject => "payload_not_object",
            RejectionReason::SchemaValidationFailed => "schema_validation_failed",
            RejectionReason::PowerModeDropNoncritical => "power_mode_drop_noncritical",
            RejectionReason::RateLimitExceeded => "rate_limit_exceeded",
            RejectionReason::ReplayNonceDetected => "replay_nonce_detected",
        }
    }
}

/// One recorded rejection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionEntry {
    pub at: DateTime<Utc>,
    pub reason: RejectionReason,
    pub event_name: String,
    /// Truncated JSON of the payload
    pub payload_preview: String,
    /// Truncated JSON of the caller's meta
    pub meta_preview: String,
    /// Validator detail, when schema validation failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RejectionEntry {
    pub fn new(
        reason: RejectionReason,
        event_name: &str,
        payload: &Value,
        meta: &Map<String, Value>,
    ) -> Self {
        Self {
            at: Utc::now(),
            reason,
            event_name: truncate(event_name),
            payload_preview: preview(payload),
            meta_preview: preview_map(meta),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Bounded ring buffer of rejections, oldest evicted first
#[derive(Debug)]
pub struct RejectionLog {
    capacity: usize,
    entries: VecDeque<RejectionEntry>,
}

impl RejectionLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, entry: RejectionEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Entries, oldest first
    pub fn entries(&self) -> Vec<RejectionEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn preview(value: &Value) -> String {
    truncate(&value.to_string())
}

fn preview_map(map: &Map<String, Value>) -> String {
    truncate(&serde_json::to_string(map).unwrap_or_default())
}

fn truncate(s: &str) -> String {
    match s.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}…", &s[..cut]),
        None => s.to_string(),
    }
}
