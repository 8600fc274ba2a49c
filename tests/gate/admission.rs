use crate::support::{memory_gate, meta, nonce, session, valid_payload, RecordingSender};
use intel_gate::contracts::CANONICAL_EVENTS;
use intel_gate::guard::{RateLimiter, PRUNE_INTERVAL};
use intel_gate::{PowerMode, PriorityClass, RejectionReason};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test]
async fn test_every_canonical_event_is_admitted() {
    let (sender, _rx) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;

    for event in CANONICAL_EVENTS {
        let receipt = gate
            .emit(event, valid_payload(event), meta())
            .await
            .unwrap_or_else(|reason| panic!("{} rejected: {}", event, reason));
        assert_eq!(receipt.priority_class, PriorityClass::for_event(event));
    }
    assert_eq!(gate.queue().pending().await, CANONICAL_EVENTS.len());
}

#[tokio::test]
async fn test_whitelist_is_closed() {
    let (sender, _rx) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;

    for name in ["", "sos", "sos.TRIGGERED", "sos.triggered ", "price.quote_seen.v2", "debug.log"] {
        assert_eq!(
            gate.emit(name, json!({}), meta()).await,
            Err(RejectionReason::UnknownEvent),
            "{:?} should be unknown",
            name
        );
    }
    assert_eq!(gate.rejections().len(), 6);
    assert_eq!(gate.queue().pending().await, 0);
}

#[tokio::test]
async fn test_schema_violations() {
    let (sender, _rx) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;

    let cases = [
        ("sos.triggered", json!({"tier": 0})),
        ("sos.triggered", json!({"tier": 2, "message": "x".repeat(281)})),
        ("sos.deactivated", json!({"reason": "bored"})),
        ("context.update", json!({"zone_id": "z", "risk_score": 101})),
        ("price.quote_seen", json!({"item": "tea", "quoted_price": 0, "currency": "EGP"})),
        ("price.quote_seen", json!({"item": "tea", "quoted_price": 3, "currency": "egp"})),
        ("price.crowd_submitted", json!({"item": "tea", "price_paid": 20, "asking_price": 15})),
        ("threat.report_deduped", json!({"report_id": "r", "duplicate_of": "r"})),
        ("nav.state_changed", json!({"from_state": "idle", "to_state": "idle"})),
        ("hazard.zone_state_changed", json!({"zone_id": "z", "state": "danger"})),
    ];

    for (event, payload) in cases {
        assert_eq!(
            gate.emit(event, payload.clone(), meta()).await,
            Err(RejectionReason::SchemaValidationFailed),
            "{} {} should fail validation",
            event,
            payload
        );
    }

    let last = gate.rejections().pop().unwrap();
    assert_eq!(last.reason, RejectionReason::SchemaValidationFailed);
    assert_eq!(last.event_name, "hazard.zone_state_changed");
    assert!(last.detail.unwrap().contains("severity"));
}

#[tokio::test]
async fn test_non_object_payloads() {
    let (sender, _rx) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;

    for payload in [json!(null), json!(1), json!("tier"), json!([{"tier": 1}])] {
        assert_eq!(
            gate.emit("sos.armed", payload, meta()).await,
            Err(RejectionReason::PayloadNotObject)
        );
    }
}

#[test]
fn test_rate_limit_window_slides() {
    let mut limiter = RateLimiter::with_defaults();
    let start = Instant::now();

    for i in 0..5 {
        assert!(limiter.allow_at("threat.report_submitted", "s", start + Duration::from_secs(i)));
    }
    assert!(!limiter.allow_at("threat.report_submitted", "s", start + Duration::from_secs(10)));

    // other sessions and events have their own buckets
    assert!(limiter.allow_at("threat.report_submitted", "t", start + Duration::from_secs(10)));
    assert!(limiter.allow_at("sos.armed", "s", start + Duration::from_secs(10)));

    // only the oldest hit has left the window
    let later = start + Duration::from_millis(60_500);
    assert!(limiter.allow_at("threat.report_submitted", "s", later));
    assert!(!limiter.allow_at("threat.report_submitted", "s", later));
}

#[tokio::test]
async fn test_rate_limit_through_gate() {
    let (sender, _rx) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;
    let payload = valid_payload("threat.report_submitted");

    for _ in 0..5 {
        assert!(gate.emit("threat.report_submitted", payload.clone(), session("a")).await.is_ok());
    }
    assert_eq!(
        gate.emit("threat.report_submitted", payload.clone(), session("a")).await,
        Err(RejectionReason::RateLimitExceeded)
    );
    assert!(gate.emit("threat.report_submitted", payload, session("b")).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_idle_sessions_are_pruned() {
    let (sender, _rx) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;
    let payload = valid_payload("context.update");
    let burst = PRUNE_INTERVAL as usize - 1;

    for i in 0..burst {
        let meta = session(&format!("old-{}", i));
        assert!(gate.emit("context.update", payload.clone(), meta).await.is_ok());
    }
    assert_eq!(gate.stats().await.rate_limit_keys, burst);

    tokio::time::sleep(Duration::from_secs(61)).await;

    // this admission lands on a sweep; every earlier window has expired
    assert!(gate.emit("context.update", payload, session("new")).await.is_ok());
    assert_eq!(gate.stats().await.rate_limit_keys, 1);
}

#[tokio::test]
async fn test_replay_nonce_across_events() {
    let (sender, _rx) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;

    assert!(gate.emit("sos.armed", valid_payload("sos.armed"), nonce("n-42")).await.is_ok());
    assert_eq!(
        gate.emit("context.update", valid_payload("context.update"), nonce("n-42")).await,
        Err(RejectionReason::ReplayNonceDetected)
    );

    // generated nonces never collide
    for _ in 0..5 {
        assert!(gate.emit("context.update", valid_payload("context.update"), meta()).await.is_ok());
    }
}

#[tokio::test]
async fn test_rejected_event_consumes_no_nonce() {
    let (sender, _rx) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;

    assert_eq!(
        gate.emit("sos.armed", json!({"tier": 7}), nonce("n-1")).await,
        Err(RejectionReason::SchemaValidationFailed)
    );
    assert!(gate.emit("sos.armed", json!({"tier": 1}), nonce("n-1")).await.is_ok());
}

#[tokio::test]
async fn test_power_modes() {
    let (sender, _rx) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;

    for mode in [PowerMode::PowerSaver, PowerMode::Emergency] {
        gate.set_power_mode(mode);
        assert!(gate.emit("price.quote_seen", valid_payload("price.quote_seen"), meta()).await.is_ok());
    }

    gate.set_power_mode(PowerMode::Critical);
    for event in ["context.update", "nav.guidance_issued", "price.quote_seen", "negotiation.round_recorded"] {
        assert_eq!(
            gate.emit(event, valid_payload(event), meta()).await,
            Err(RejectionReason::PowerModeDropNoncritical)
        );
    }
    for event in ["sos.armed", "hazard.zone_state_changed", "price.anomaly_detected"] {
        assert!(gate.emit(event, valid_payload(event), meta()).await.is_ok());
    }

    gate.set_power_mode(PowerMode::Normal);
    assert!(gate.emit("context.update", valid_payload("context.update"), meta()).await.is_ok());
}

#[tokio::test]
async fn test_rejection_log_previews() {
    let (sender, _rx) = RecordingSender::new();
    let (gate, _dir) = memory_gate(sender).await;

    let long = "x".repeat(1000);
    let _ = gate.emit("bogus", json!({"blob": long}), session("s-1")).await;

    let entry = gate.rejections().pop().unwrap();
    assert_eq!(entry.reason, RejectionReason::UnknownEvent);
    assert!(entry.payload_preview.chars().count() <= 161);
    assert!(entry.meta_preview.contains("s-1"));
}
