//! Shared fixtures

use async_trait::async_trait;
use intel_gate::queue::MemoryQueueStore;
use intel_gate::transport::{BatchOutcome, BatchSender, TransportError};
use intel_gate::{EventEnvelope, GateConfig, IntelGate};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc;

/// Scripted reply for one batch
pub enum Reply {
    Accept(usize),
    Fail(TransportError),
}

/// Batch sender that records submissions and replays scripted replies
///
/// Batches beyond the script are fully accepted.
pub struct RecordingSender {
    script: Mutex<VecDeque<Reply>>,
    batches: Mutex<Vec<Vec<String>>>,
    notify: mpsc::UnboundedSender<Vec<String>>,
}

impl RecordingSender {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<String>>) {
        Self::scripted(Vec::new())
    }

    pub fn scripted(replies: Vec<Reply>) -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<String>>) {
        let (notify, rx) = mpsc::unbounded_channel();
        let sender = Arc::new(Self {
            script: Mutex::new(replies.into()),
            batches: Mutex::new(Vec::new()),
            notify,
        });
        (sender, rx)
    }

    /// Event names of every batch seen so far
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchSender for RecordingSender {
    async fn send_batch(
        &self,
        _endpoint: &str,
        events: &[EventEnvelope],
    ) -> Result<BatchOutcome, TransportError> {
        let names: Vec<String> = events.iter().map(|e| e.event_name.clone()).collect();
        self.batches.lock().unwrap().push(names.clone());
        let _ = self.notify.send(names);

        match self.script.lock().unwrap().pop_front() {
            None => Ok(BatchOutcome::all_accepted(events.len())),
            Some(Reply::Accept(n)) => Ok(BatchOutcome {
                submitted: events.len(),
                accepted: n,
                rejected: events.len().saturating_sub(n),
                persisted: None,
                persistence_warning: None,
            }),
            Some(Reply::Fail(e)) => Err(e),
        }
    }
}

pub fn config(dir: &TempDir) -> GateConfig {
    GateConfig::default().with_state_dir(dir.path())
}

/// Gate with an in-memory store and the given sender
pub async fn memory_gate(sender: Arc<RecordingSender>) -> (IntelGate, TempDir) {
    let dir = tempdir().unwrap();
    let gate = IntelGate::builder(config(&dir))
        .with_sender(sender)
        .with_store(Arc::new(MemoryQueueStore::new()))
        .build()
        .await
        .unwrap();
    (gate, dir)
}

pub fn meta() -> Map<String, Value> {
    Map::new()
}

pub fn session(id: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("session_id".to_string(), json!(id));
    meta
}

pub fn nonce(value: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("nonce".to_string(), json!(value));
    meta
}

/// A valid payload for every canonical event
pub fn valid_payload(event: &str) -> Value {
    match event {
        "price.quote_seen" => json!({"item": "tea", "quoted_price": 12.5, "currency": "EGP"}),
        "price.anomaly_detected" => {
            json!({"item": "tea", "quoted_price": 90, "expected_price": 12, "severity": "high"})
        }
        "price.crowd_submitted" => json!({"item": "tea", "price_paid": 10, "asking_price": 15}),
        "negotiation.round_recorded" => {
            json!({"item": "rug", "round": 2, "asking_price": 400, "offer_price": 250})
        }
        "hazard.zone_state_changed" => {
            json!({"zone_id": "z-7", "state": "danger", "severity": "high"})
        }
        "sos.armed" => json!({"tier": 1}),
        "sos.triggered" => json!({"tier": 2, "message": "help"}),
        "sos.deactivated" => json!({"reason": "resolved"}),
        "context.update" => json!({"zone_id": "z-1", "risk_score": 40}),
        "threat.report_submitted" => {
            json!({"report_id": "r-1", "category": "scam", "severity": "medium"})
        }
        "threat.report_deduped" => json!({"report_id": "r-2", "duplicate_of": "r-1"}),
        "threat.report_rate_limited" => json!({"report_id": "r-3", "attempts": 4}),
        "threat.node_status_changed" => json!({"node_id": "n-1", "status": "stale"}),
        "nav.state_changed" => json!({"from_state": "idle", "to_state": "guiding"}),
        "nav.guidance_issued" => json!({"guidance_id": "g-1", "instruction": "turn left"}),
        "nav.guidance_marked_false" => json!({"guidance_id": "g-1"}),
        "nav.recovery_started" => json!({"recovery_id": "rc-1", "trigger": "off_route"}),
        "nav.recovery_action_presented" => {
            json!({"recovery_id": "rc-1", "action": "walk north", "step": 1})
        }
        "nav.recovery_completed" => {
            json!({"recovery_id": "rc-1", "outcome": "recovered", "duration_ms": 42000})
        }
        other => panic!("no fixture for {}", other),
    }
}
