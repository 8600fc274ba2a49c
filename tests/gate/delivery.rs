use crate::support::{memory_gate, meta, valid_payload, RecordingSender, Reply};
use chrono::{Duration, Utc};
use intel_gate::queue::{SkipReason, REJECTED_BY_BACKEND};
use intel_gate::signals::DropReason;
use intel_gate::transport::TransportError;
use intel_gate::{GateSignal, PriorityClass, SignalKind};
use serde_json::json;
use tokio::sync::broadcast;

fn drain(signals: &mut broadcast::Receiver<GateSignal>) -> Vec<SignalKind> {
    let mut kinds = Vec::new();
    while let Ok(signal) = signals.try_recv() {
        kinds.push(signal.kind);
    }
    kinds
}

fn timeout() -> Reply {
    Reply::Fail(TransportError::Timeout(10_000))
}

#[tokio::test]
async fn test_batch_follows_priority_order() {
    let (sender, _rx) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender.clone()).await;

    for event in [
        "price.quote_seen",
        "context.update",
        "price.anomaly_detected",
        "hazard.zone_state_changed",
        "sos.armed",
        "nav.state_changed",
    ] {
        gate.emit(event, valid_payload(event), meta()).await.unwrap();
    }

    let report = gate.flush(false).await;
    assert_eq!(report.accepted, 6);
    assert_eq!(report.remaining, 0);
    assert_eq!(
        sender.batches()[0],
        vec![
            "sos.armed",
            "hazard.zone_state_changed",
            "price.anomaly_detected",
            "context.update",
            "nav.state_changed",
            "price.quote_seen",
        ]
    );
}

#[tokio::test]
async fn test_golden_record_tiers_reorder_new_items() {
    let (sender, _rx) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender.clone()).await;

    gate.apply_golden_record(json!({
        "priorityTiers": {"legacy_activity": 0, "sos_event": 5}
    }));
    gate.emit("sos.armed", valid_payload("sos.armed"), meta()).await.unwrap();
    gate.emit("price.quote_seen", valid_payload("price.quote_seen"), meta())
        .await
        .unwrap();

    gate.flush(false).await;
    assert_eq!(sender.batches()[0], vec!["price.quote_seen", "sos.armed"]);
}

#[tokio::test]
async fn test_batches_capped_at_batch_size() {
    let (sender, _rx) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender.clone()).await;
    gate.apply_golden_record(json!({"batch_size": 2}));

    for _ in 0..5 {
        gate.emit("context.update", valid_payload("context.update"), meta())
            .await
            .unwrap();
    }

    assert_eq!(gate.flush(false).await.attempted, 2);
    assert_eq!(gate.flush(true).await.attempted, 2);
    let last = gate.flush(false).await;
    assert_eq!(last.attempted, 1);
    assert_eq!(last.remaining, 0);
    assert_eq!(gate.flush(false).await.skipped, Some(SkipReason::QueueEmpty));
}

#[tokio::test]
async fn test_linear_backoff_then_drop() {
    let (sender, _rx) = RecordingSender::scripted(vec![timeout(), timeout(), timeout()]);
    let (gate, _dir) = memory_gate(sender).await;
    let mut signals = gate.subscribe();

    gate.emit("context.update", valid_payload("context.update"), meta())
        .await
        .unwrap();
    let queue = gate.queue();
    let t0 = Utc::now();

    // context_update: 3 attempts, linear 15s
    let first = queue.flush_at(false, t0).await;
    assert_eq!(first.failed, 1);
    assert_eq!(first.error.as_deref(), Some("Request timeout after 10000ms"));
    let item = queue.items().await.remove(0);
    assert_eq!(item.attempts, 1);
    assert_eq!(item.last_error.as_deref(), Some("timeout"));
    assert_eq!(item.next_attempt_at, t0 + Duration::seconds(15));

    assert_eq!(
        queue.flush_at(false, t0 + Duration::seconds(10)).await.skipped,
        Some(SkipReason::NothingDue)
    );

    let t1 = t0 + Duration::seconds(15);
    queue.flush_at(false, t1).await;
    let item = queue.items().await.remove(0);
    assert_eq!(item.attempts, 2);
    assert_eq!(item.next_attempt_at, t1 + Duration::seconds(30));

    let third = queue.flush_at(false, t1 + Duration::seconds(30)).await;
    assert_eq!(third.dropped, 1);
    assert_eq!(third.remaining, 0);

    let kinds = drain(&mut signals);
    assert!(kinds.contains(&SignalKind::ItemsDropped {
        count: 1,
        reason: DropReason::RetryExhausted,
        event_names: vec!["context.update".to_string()],
    }));
    assert!(!kinds
        .iter()
        .any(|kind| matches!(kind, SignalKind::DeliveryFailed { .. })));
    assert_eq!(gate.stats().await.queue.total_dropped, 1);
}

#[tokio::test]
async fn test_sos_persists_past_budget_and_notifies_once() {
    let (sender, _rx) =
        RecordingSender::scripted(vec![timeout(), timeout(), timeout(), timeout()]);
    let (gate, _dir) = memory_gate(sender).await;
    gate.apply_golden_record(json!({
        "retryStrategy": {"sos_event": {"maxRetryAttempts": 2, "retryBackoffMs": 1000}}
    }));
    let mut signals = gate.subscribe();

    gate.emit("sos.triggered", valid_payload("sos.triggered"), meta())
        .await
        .unwrap();
    let queue = gate.queue();
    let t0 = Utc::now();

    for attempt in 1..=4u32 {
        let report = queue.flush_at(true, t0).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.dropped, 0);
        assert_eq!(queue.items().await[0].attempts, attempt);
    }

    // exponential: 1000 * 2^4
    let item = queue.items().await.remove(0);
    assert_eq!(item.next_attempt_at, t0 + Duration::milliseconds(16_000));

    let notified: Vec<SignalKind> = drain(&mut signals)
        .into_iter()
        .filter(|kind| matches!(kind, SignalKind::DeliveryFailed { .. }))
        .collect();
    assert_eq!(notified.len(), 1);
    match &notified[0] {
        SignalKind::DeliveryFailed {
            attempts,
            priority_class,
            last_error,
            ..
        } => {
            assert_eq!(*attempts, 2);
            assert_eq!(*priority_class, PriorityClass::SosEvent);
            assert_eq!(last_error.as_deref(), Some("timeout"));
        }
        other => panic!("unexpected signal {:?}", other),
    }
}

#[tokio::test]
async fn test_partial_acceptance_keeps_the_tail() {
    let (sender, _rx) = RecordingSender::scripted(vec![Reply::Accept(1)]);
    let (gate, _dir) = memory_gate(sender).await;

    for event in ["hazard.zone_state_changed", "context.update", "price.quote_seen"] {
        gate.emit(event, valid_payload(event), meta()).await.unwrap();
    }

    let report = gate.flush(false).await;
    assert_eq!(report.accepted, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(report.remaining, 2);
    assert_eq!(report.error.as_deref(), Some("2 of 3 rejected by backend"));

    let items = gate.queue().items().await;
    let names: Vec<&str> = items.iter().map(|i| i.envelope.event_name.as_str()).collect();
    assert_eq!(names, vec!["context.update", "price.quote_seen"]);
    assert!(items
        .iter()
        .all(|i| i.attempts == 1 && i.last_error.as_deref() == Some(REJECTED_BY_BACKEND)));
}

#[tokio::test]
async fn test_service_error_reschedules_whole_batch() {
    let (sender, _rx) = RecordingSender::scripted(vec![Reply::Fail(TransportError::ServiceError {
        status: 503,
        message: "unavailable".to_string(),
    })]);
    let (gate, _dir) = memory_gate(sender).await;

    gate.emit("sos.armed", valid_payload("sos.armed"), meta()).await.unwrap();
    gate.emit("hazard.zone_state_changed", valid_payload("hazard.zone_state_changed"), meta())
        .await
        .unwrap();

    let report = gate.flush(false).await;
    assert_eq!(report.accepted, 0);
    assert_eq!(report.failed, 2);
    let stats = gate.stats().await;
    assert_eq!(stats.queue.pending, 2);
    assert_eq!(stats.queue.due, 0);
    assert!(stats.queue.last_flush_error.unwrap().contains("503"));

    // forced pass ignores backoff
    let retry = gate.flush(true).await;
    assert_eq!(retry.accepted, 2);
    assert_eq!(gate.stats().await.queue.total_accepted, 2);
}

#[tokio::test]
async fn test_offline_skips_unless_forced() {
    let (sender, _rx) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender.clone()).await;
    gate.set_online(false);

    gate.emit("context.update", valid_payload("context.update"), meta())
        .await
        .unwrap();
    let skipped = gate.flush(false).await;
    assert_eq!(skipped.skipped, Some(SkipReason::Offline));
    assert_eq!(skipped.remaining, 1);
    assert!(sender.batches().is_empty());

    assert_eq!(gate.flush(true).await.accepted, 1);
}

#[tokio::test]
async fn test_queue_bound_evicts_lowest_priority() {
    let (sender, _rx) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;
    gate.apply_golden_record(json!({"max_queue_entries": 3}));
    let mut signals = gate.subscribe();

    gate.emit("price.quote_seen", valid_payload("price.quote_seen"), meta())
        .await
        .unwrap();
    for _ in 0..2 {
        gate.emit("context.update", valid_payload("context.update"), meta())
            .await
            .unwrap();
    }
    let receipt = gate.emit("sos.armed", valid_payload("sos.armed"), meta()).await.unwrap();
    assert_eq!(receipt.pending, 3);

    let names: Vec<String> = gate
        .queue()
        .items()
        .await
        .into_iter()
        .map(|i| i.envelope.event_name)
        .collect();
    assert_eq!(names, vec!["sos.armed", "context.update", "context.update"]);

    assert!(drain(&mut signals).contains(&SignalKind::ItemsDropped {
        count: 1,
        reason: DropReason::QueueFull,
        event_names: vec!["price.quote_seen".to_string()],
    }));
}
