//! Event envelope
//!
//! The unit of transmission. An envelope is only ever built from a payload
//! that already passed validation, rate limiting and the nonce guard, and
//! it is signed before it enters the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Signature algorithm tag written into every envelope
pub const SIGNATURE_ALG: &str = "sha256";

/// One validated, signed unit of telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique envelope identifier
    pub id: String,
    /// Canonical event name
    pub event_name: String,
    /// Creation timestamp (UTC, ISO-8601 on the wire)
    pub occurred_at: DateTime<Utc>,
    /// Schema-conformant payload
    pub payload: Value,
    /// Free-form annotations (session_id, source, power_mode, ...)
    #[serde(default)]
    pub meta: Map<String, Value>,
    /// Single-use token fixed at creation time
    pub nonce: String,
    /// Hex digest over the canonical form
    #[serde(default)]
    pub signature: String,
    /// Digest algorithm
    #[serde(default)]
    pub signature_alg: String,
}

/// Field subset covered by the signature, in signing order
#[derive(Serialize)]
struct CanonicalEnvelope<'a> {
    id: &'a str,
    event_name: &'a str,
    occurred_at: &'a DateTime<Utc>,
    payload: &'a Value,
    meta: &'a Map<String, Value>,
    nonce: &'a str,
}

impl EventEnvelope {
    /// Create an unsigned envelope stamped with a fresh id and the current time
    pub fn new(
        event_name: impl Into<String>,
        payload: Value,
        meta: Map<String, Value>,
        nonce: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_name: event_name.into(),
            occurred_at: Utc::now(),
            payload,
            meta,
            nonce: nonce.into(),
            signature: String::new(),
            signature_alg: String::new(),
        }
    }

    /// Stable serialization of the signed fields
    ///
    /// Field order is fixed; keys inside `payload` and `meta` come out sorted
    /// because `serde_json::Map` is ordered by key.
    pub fn canonical_json(&self) -> String {
        let canonical = CanonicalEnvelope {
            id: &self.id,
            event_name: &self.event_name,
            occurred_at: &self.occurred_at,
            payload: &self.payload,
            meta: &self.meta,
            nonce: &self.nonce,
        };
        serde_json::to_string(&canonical).unwrap_or_default()
    }

    /// Whether a signature has been attached
    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }

    /// Session id from `meta`, if any
    pub fn session_id(&self) -> Option<&str> {
        self.meta.get("session_id").and_then(Value::as_str)
    }
}
