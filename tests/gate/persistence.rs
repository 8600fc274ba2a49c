use crate::support::{config, meta, valid_payload, RecordingSender};
use intel_gate::state::{LocalState, QUEUE_FILE};
use intel_gate::{GateConfig, IntelGate, PriorityClass};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

async fn file_gate(dir: &TempDir, sender: Arc<RecordingSender>) -> IntelGate {
    IntelGate::builder(config(dir).with_start_online(false))
        .with_sender(sender)
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let dir = tempdir().unwrap();
    let (sender, _rx) = RecordingSender::new();

    let mut located = meta();
    located.insert("lat".to_string(), json!(30.044419957312874));
    located.insert("lng".to_string(), json!(31.235711653900146));
    located.insert("accuracy_m".to_string(), json!(4.7));

    let (items, session) = {
        let gate = file_gate(&dir, sender.clone()).await;
        gate.emit(
            "context.update",
            json!({"zone_id": "z1", "risk_score": 39.430133835633676}),
            located.clone(),
        )
        .await
        .unwrap();
        gate.emit("sos.triggered", json!({"tier": 2, "message": "help"}), located)
            .await
            .unwrap();
        gate.emit("sos.armed", valid_payload("sos.armed"), meta()).await.unwrap();
        assert!(gate.stats().await.queue.durable);
        (gate.queue().items().await, gate.session_id().to_string())
    };
    assert!(dir.path().join(QUEUE_FILE).exists());
    assert_eq!(items[2].envelope.event_name, "context.update");

    let gate = file_gate(&dir, sender.clone()).await;
    assert_eq!(gate.session_id(), session);
    assert_eq!(gate.queue().items().await, items);
    assert_eq!(gate.stats().await.queue.total_dropped, 0);

    let report = gate.flush(true).await;
    assert_eq!(report.accepted, 3);

    let reopened = file_gate(&dir, sender).await;
    assert_eq!(reopened.queue().pending().await, 0);
}

#[tokio::test]
async fn test_tampered_snapshot_items_are_discarded() {
    let dir = tempdir().unwrap();
    let (sender, _rx) = RecordingSender::new();

    {
        let gate = file_gate(&dir, sender.clone()).await;
        gate.emit("sos.armed", valid_payload("sos.armed"), meta()).await.unwrap();
        gate.emit("context.update", valid_payload("context.update"), meta())
            .await
            .unwrap();
    }

    let path = dir.path().join(QUEUE_FILE);
    let mut snapshot: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    snapshot["items"][0]["envelope"]["payload"]["tier"] = json!(3);
    std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();

    let gate = file_gate(&dir, sender).await;
    let items = gate.queue().items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].envelope.event_name, "context.update");
    assert_eq!(gate.stats().await.queue.total_dropped, 1);
}

#[tokio::test]
async fn test_corrupt_snapshot_starts_empty() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join(QUEUE_FILE), "{not json").unwrap();
    let (sender, _rx) = RecordingSender::new();

    let gate = file_gate(&dir, sender).await;
    let stats = gate.stats().await;
    assert_eq!(stats.queue.pending, 0);
    assert!(stats.queue.last_persist_error.is_some());

    // queue keeps working and rewrites the snapshot
    gate.emit("sos.armed", valid_payload("sos.armed"), meta()).await.unwrap();
    let reopened = file_gate(&dir, RecordingSender::new().0).await;
    assert_eq!(reopened.queue().pending().await, 1);
}

#[tokio::test]
async fn test_endpoint_precedence() {
    let dir = tempdir().unwrap();
    let state = LocalState::open(dir.path()).unwrap();
    state.set_endpoint_override("https://state.example/ingest").unwrap();
    let (sender, _rx) = RecordingSender::new();

    let gate = IntelGate::builder(config(&dir))
        .with_sender(sender.clone())
        .build()
        .await
        .unwrap();
    assert_eq!(gate.policy().endpoint, "https://state.example/ingest");

    // a golden record cannot override a local override
    let policy = gate.apply_golden_record(json!({"endpoint": "https://golden.example/ingest"}));
    assert_eq!(policy.endpoint, "https://state.example/ingest");
    drop(gate);

    let gate = IntelGate::builder(config(&dir).with_endpoint("https://config.example/ingest"))
        .with_sender(sender)
        .build()
        .await
        .unwrap();
    assert_eq!(gate.policy().endpoint, "https://config.example/ingest");
}

#[tokio::test]
async fn test_golden_record_file_applied_at_startup() {
    let dir = tempdir().unwrap();
    let golden = dir.path().join("golden.json");
    std::fs::write(
        &golden,
        r#"{"endpoint": "https://golden.example/v1", "flushIntervalMs": 5000, "batchSize": 40}"#,
    )
    .unwrap();
    let (sender, _rx) = RecordingSender::new();

    let gate = IntelGate::builder(
        GateConfig::default()
            .with_state_dir(dir.path().join("state"))
            .with_golden_record_path(&golden)
            .with_power_mode(intel_gate::PowerMode::PowerSaver),
    )
    .with_sender(sender)
    .build()
    .await
    .unwrap();

    let policy = gate.policy();
    assert_eq!(policy.endpoint, "https://golden.example/v1");
    assert_eq!(policy.flush_interval_ms, 10_000);
    assert_eq!(policy.batch_size, 34);
}

#[tokio::test]
async fn test_unavailable_store_runs_memory_only() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "file").unwrap();
    let (sender, _rx) = RecordingSender::new();

    let gate = IntelGate::builder(GateConfig::default().with_state_dir(blocker.join("state")))
        .with_sender(sender.clone())
        .build()
        .await
        .unwrap();
    assert!(!gate.session_id().is_empty());

    let receipt = gate.emit("sos.armed", valid_payload("sos.armed"), meta()).await.unwrap();
    assert_eq!(receipt.priority_class, PriorityClass::SosEvent);

    let stats = gate.stats().await;
    assert!(!stats.queue.durable);
    assert_eq!(stats.queue.pending, 1);

    assert_eq!(gate.flush(true).await.accepted, 1);
    assert_eq!(sender.batches(), vec![vec!["sos.armed".to_string()]]);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let dir = tempdir().unwrap();
    let result = IntelGate::builder(config(&dir).with_endpoint("ftp://nope")).build().await;
    assert!(result.is_err());
}
