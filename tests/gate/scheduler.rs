use crate::support::{memory_gate, meta, valid_payload, RecordingSender};
use intel_gate::{PolicyInput, PowerMode};
use serde_json::json;
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test(start_paused = true)]
async fn test_interval_tick_flushes() {
    let (sender, mut batches) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;
    let scheduler = gate.start_scheduler().unwrap();

    gate.emit("context.update", valid_payload("context.update"), meta())
        .await
        .unwrap();

    // nothing before the first 30s tick
    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(batches.try_recv().is_err());

    let batch = timeout(WAIT, batches.recv()).await.unwrap().unwrap();
    assert_eq!(batch, vec!["context.update"]);
    assert_eq!(gate.queue().pending().await, 0);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sos_flushes_immediately_even_offline() {
    let (sender, mut batches) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;
    gate.set_online(false);
    let scheduler = gate.start_scheduler().unwrap();

    gate.emit("sos.triggered", valid_payload("sos.triggered"), meta())
        .await
        .unwrap();

    let batch = timeout(Duration::from_millis(10), batches.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch, vec!["sos.triggered"]);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sos_request_buffered_until_scheduler_starts() {
    let (sender, mut batches) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;

    gate.emit("sos.armed", valid_payload("sos.armed"), meta()).await.unwrap();
    assert!(batches.try_recv().is_err());

    let scheduler = gate.start_scheduler().unwrap();
    let batch = timeout(Duration::from_millis(10), batches.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch, vec!["sos.armed"]);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_going_online_forces_flush() {
    let (sender, mut batches) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;
    gate.set_online(false);
    let scheduler = gate.start_scheduler().unwrap();

    gate.emit("hazard.zone_state_changed", valid_payload("hazard.zone_state_changed"), meta())
        .await
        .unwrap();

    // offline ticks skip
    tokio::time::sleep(Duration::from_secs(65)).await;
    assert!(batches.try_recv().is_err());

    gate.set_online(true);
    let batch = timeout(Duration::from_millis(10), batches.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch, vec!["hazard.zone_state_changed"]);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_policy_change_restarts_timer() {
    let (sender, mut batches) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;
    let scheduler = gate.start_scheduler().unwrap();
    // let the loop pick up the initial 30s interval
    tokio::time::sleep(Duration::from_millis(1)).await;

    gate.emit("context.update", valid_payload("context.update"), meta())
        .await
        .unwrap();
    gate.apply_golden_record(json!({"flushIntervalMs": 1000}));

    // the change itself triggers a pass
    let batch = timeout(Duration::from_millis(10), batches.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch, vec!["context.update"]);

    gate.emit("nav.state_changed", valid_payload("nav.state_changed"), meta())
        .await
        .unwrap();
    let batch = timeout(Duration::from_millis(1500), batches.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch, vec!["nav.state_changed"]);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_power_mode_stretches_interval() {
    let (sender, mut batches) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;
    gate.apply_golden_record(json!({"flushIntervalMs": 1000}));
    let scheduler = gate.start_scheduler().unwrap();

    let policy = gate.set_power_mode(PowerMode::Emergency);
    assert_eq!(policy.flush_interval_ms, 4000);

    gate.emit("context.update", valid_payload("context.update"), meta())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert!(batches.try_recv().is_err());

    let batch = timeout(WAIT, batches.recv()).await.unwrap().unwrap();
    assert_eq!(batch, vec!["context.update"]);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_policy_listener_applies_inputs() {
    let (sender, _batches) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;
    let (inputs, listener) = gate.spawn_policy_listener();

    inputs
        .send(PolicyInput::GoldenRecord(json!({"batchSize": 10})))
        .await
        .unwrap();
    inputs.send(PolicyInput::PowerMode(PowerMode::Critical)).await.unwrap();
    drop(inputs);
    listener.await.unwrap();

    let policy = gate.policy();
    assert_eq!(policy.power_mode, PowerMode::Critical);
    assert_eq!(policy.batch_size, 5);
    assert!(policy.drops_noncritical());
}

#[tokio::test]
async fn test_shutdown_stops_loop() {
    let (sender, _batches) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;
    let scheduler = gate.start_scheduler().unwrap();
    assert!(!scheduler.is_finished());
    scheduler.shutdown().await;
}
