//! Diagnostic signals
//!
//! Observations broadcast by the gate and queue manager:
//! - Rejections at admission
//! - Successful enqueues
//! - Flush passes
//! - Dropped items (queue bound or exhausted retries)
//! - Delivery failures the producing layer must surface
//!
//! # Signal Rules
//!
//! Signals are diagnostics only. They are never replayed, never block the
//! emitting path, and carry previews rather than full payloads.

use crate::contracts::PriorityClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Broadcast buffer per subscriber
pub const SIGNAL_CHANNEL_CAPACITY: usize = 256;

/// Why items left the queue without delivery
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Evicted by the `max_queue_entries` bound
    QueueFull,
    /// Retry budget used up on a non-persistent class
    RetryExhausted,
    /// Signature no longer matched on re-hydration
    SignatureMismatch,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::QueueFull => write!(f, "queue_full"),
            DropReason::RetryExhausted => write!(f, "retry_exhausted"),
            DropReason::SignatureMismatch => write!(f, "signature_mismatch"),
        }
    }
}

/// Signal body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "signal_type", rename_all = "snake_case")]
pub enum SignalKind {
    /// Admission refused an event
    Rejected {
        event_name: String,
        reason: String,
    },
    /// A signed envelope entered the queue
    Queued {
        item_id: String,
        event_name: String,
        priority_class: PriorityClass,
        pending: usize,
    },
    /// A flush pass reached the transport
    FlushCompleted {
        attempted: usize,
        accepted: usize,
        failed: usize,
        dropped: usize,
        error: Option<String>,
    },
    /// Items left the queue undelivered
    ItemsDropped {
        count: usize,
        reason: DropReason,
        event_names: Vec<String>,
    },
    /// An item of a notifying class exhausted its retry budget
    DeliveryFailed {
        item_id: String,
        event_name: String,
        priority_class: PriorityClass,
        attempts: u32,
        last_error: Option<String>,
    },
}

/// Signal with metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateSignal {
    /// Unique signal identifier
    pub signal_id: Uuid,
    /// When the signal was generated
    pub timestamp: DateTime<Utc>,
    /// Emitting source (the gate's configured source name)
    pub source: String,
    /// Signal body
    #[serde(flatten)]
    pub kind: SignalKind,
}

/// Broadcasting signal emitter
///
/// Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct SignalEmitter {
    /// Source name stamped on every signal
    source: String,
    /// Whether signal emission is enabled
    enabled: bool,
    sender: broadcast::Sender<GateSignal>,
}

impl SignalEmitter {
    /// Create a new signal emitter
    pub fn new(source: impl Into<String>, enabled: bool) -> Self {
        let (sender, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        Self {
            source: source.into(),
            enabled,
            sender,
        }
    }

    /// Emitter that neither logs nor broadcasts
    pub fn disabled() -> Self {
        Self::new("disabled", false)
    }

    /// Check if emission is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Subscribe to future signals
    pub fn subscribe(&self) -> broadcast::Receiver<GateSignal> {
        self.sender.subscribe()
    }

    /// Log and broadcast a signal
    pub fn emit(&self, kind: SignalKind) {
        if !self.enabled {
            return;
        }

        let signal = GateSignal {
            signal_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: self.source.clone(),
            kind,
        };
        log_signal(&signal);

        // No subscribers is fine
        let _ = self.sender.send(signal);
    }
}

fn log_signal(signal: &GateSignal) {
    match &signal.kind {
        SignalKind::Rejected { event_name, reason } => {
            debug!(
                target: "intel_gate_signals",
                signal_id = %signal.signal_id,
                signal_type = "rejected",
                event = %event_name,
                reason = %reason,
                "Event rejected"
            );
        }
        SignalKind::Queued {
            item_id,
            event_name,
            priority_class,
            pending,
        } => {
            debug!(
                target: "intel_gate_signals",
                signal_id = %signal.signal_id,
                signal_type = "queued",
                item_id = %item_id,
                event = %event_name,
                priority_class = %priority_class,
                pending = pending,
                "Event queued"
            );
        }
        SignalKind::FlushCompleted {
            attempted,
            accepted,
            failed,
            dropped,
            error,
        } => {
            info!(
                target: "intel_gate_signals",
                signal_id = %signal.signal_id,
                signal_type = "flush_completed",
                attempted = attempted,
                accepted = accepted,
                failed = failed,
                dropped = dropped,
                error = error.as_deref().unwrap_or(""),
                "Flush completed"
            );
        }
        SignalKind::ItemsDropped { count, reason, .. } => {
            warn!(
                target: "intel_gate_signals",
                signal_id = %signal.signal_id,
                signal_type = "items_dropped",
                count = count,
                reason = %reason,
                "Queue items dropped"
            );
        }
        SignalKind::DeliveryFailed {
            item_id,
            event_name,
            attempts,
            ..
        } => {
            warn!(
                target: "intel_gate_signals",
                signal_id = %signal.signal_id,
                signal_type = "delivery_failed",
                item_id = %item_id,
                event = %event_name,
                attempts = attempts,
                "Delivery failed after retry budget"
            );
        }
    }
}
