//! Gate orchestrator
//!
//! The single entry point for producers. Each `emit` call ends in exactly
//! one terminal outcome:
//!
//! ```text
//! unknown_event ─► payload_not_object ─► schema_validation_failed
//!   ─► power_mode_drop_noncritical ─► rate_limit_exceeded
//!   ─► replay_nonce_detected ─► sign + enqueue ─► queued
//! ```
//!
//! Rejections are recorded in the rejection log and broadcast as signals.
//! SOS-class enqueues additionally request an immediate forced flush from
//! the scheduler; without a running scheduler the caller owns that flush.
//!
//! An unusable state directory does not stop the gate: it falls back to an
//! in-memory session, secret and queue and reports `durable = false`.

use super::error::GateError;
use super::rejection::{RejectionEntry, RejectionLog, RejectionReason};
use super::scheduler::{FlushScheduler, FlushTrigger, SchedulerHandle};
use crate::config::GateConfig;
use crate::contracts::{is_canonical, validate_detailed, EventEnvelope, PriorityClass};
use crate::guard::{NonceGuard, RateLimitConfig, RateLimiter};
use crate::policy::{Policy, PolicyInput, PolicyResolver, PowerMode};
use crate::queue::{
    FileQueueStore, FlushReport, MemoryQueueStore, QueueManager, QueueStats, QueueStore,
};
use crate::signals::{GateSignal, SignalEmitter, SignalKind};
use crate::signer::EnvelopeSigner;
use crate::state::{generate_secret, LocalState, StateError};
use crate::transport::{BatchSender, IngestClient};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Buffered out-of-band flush requests
const TRIGGER_CAPACITY: usize = 16;

/// Buffered policy inputs for the listener
const POLICY_INPUT_CAPACITY: usize = 16;

/// Successful admission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedReceipt {
    /// Envelope / queue item id
    pub id: String,
    pub event_name: String,
    pub priority_class: PriorityClass,
    /// Queue length after the enqueue
    pub pending: usize,
    pub queued_at: DateTime<Utc>,
}

/// Gate status snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateStats {
    pub queue: QueueStats,
    pub online: bool,
    pub power_mode: PowerMode,
    pub endpoint: String,
    pub session_id: String,
    pub rejections: usize,
    /// `(session, event)` keys held by the rate limiter
    pub rate_limit_keys: usize,
}

struct Admission {
    rate_limiter: RateLimiter,
    nonces: NonceGuard,
}

/// Builder for [`IntelGate`]
pub struct GateBuilder {
    config: GateConfig,
    sender: Option<Arc<dyn BatchSender>>,
    store: Option<Arc<dyn QueueStore>>,
    rate_limits: RateLimitConfig,
    nonce_ttl: Option<Duration>,
    signals_enabled: bool,
}

impl GateBuilder {
    /// Replace the HTTP ingest client
    pub fn with_sender(mut self, sender: Arc<dyn BatchSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Replace the file-backed queue store
    pub fn with_store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use custom rate-limit ceilings
    pub fn with_rate_limits(mut self, rate_limits: RateLimitConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    /// Use a custom nonce TTL
    pub fn with_nonce_ttl(mut self, ttl: Duration) -> Self {
        self.nonce_ttl = Some(ttl);
        self
    }

    /// Enable or disable diagnostic signals
    pub fn with_signals(mut self, enabled: bool) -> Self {
        self.signals_enabled = enabled;
        self
    }

    /// Open local state, resolve the initial policy and re-hydrate the queue
    pub async fn build(self) -> Result<IntelGate, GateError> {
        let config = self.config;
        config.validate()?;

        let (state, session_id, secret) = match open_state(&config.state_dir) {
            Ok((state, session_id, secret)) => (Some(state), session_id, secret),
            Err(e) => {
                warn!(
                    error = %e,
                    state_dir = %config.state_dir.display(),
                    "Local store unavailable, running memory-only"
                );
                (None, Uuid::new_v4().to_string(), generate_secret())
            }
        };
        let signer = EnvelopeSigner::new(secret);

        let endpoint_override = config
            .endpoint
            .clone()
            .or_else(|| state.as_ref().and_then(LocalState::endpoint_override));
        let resolver = Arc::new(PolicyResolver::new(endpoint_override));
        resolver.apply(PolicyInput::PowerMode(config.power_mode));
        match config.load_golden_record() {
            Ok(Some(record)) => {
                resolver.apply(PolicyInput::GoldenRecord(record));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring golden record, using defaults"),
        }

        let (ingest, sender): (Option<IngestClient>, Arc<dyn BatchSender>) = match self.sender {
            Some(sender) => (None, sender),
            None => {
                let mut ingest_config = config.ingest.clone();
                if ingest_config.api_key.is_none() {
                    ingest_config.api_key = state.as_ref().and_then(LocalState::api_key);
                }
                let client = IngestClient::new(ingest_config)?;
                let sender: Arc<dyn BatchSender> = Arc::new(client.clone());
                (Some(client), sender)
            }
        };
        let store: Arc<dyn QueueStore> = match (self.store, &state) {
            (Some(store), _) => store,
            (None, Some(state)) => Arc::new(FileQueueStore::new(state.queue_path())),
            (None, None) => Arc::new(MemoryQueueStore::new()),
        };

        let signals = SignalEmitter::new(config.source.clone(), self.signals_enabled);
        let (online, online_rx) = watch::channel(config.start_online);
        let queue =
            QueueManager::open(store, resolver.subscribe(), online_rx, signals.clone()).with_sender(sender);
        queue.retain_verified(&signer).await;

        let (triggers, trigger_rx) = mpsc::channel(TRIGGER_CAPACITY);
        let nonces = self
            .nonce_ttl
            .map(NonceGuard::new)
            .unwrap_or_else(NonceGuard::with_defaults);

        let pending = queue.pending().await;
        info!(
            state_dir = %config.state_dir.display(),
            durable = state.is_some(),
            endpoint = %resolver.current().endpoint,
            power_mode = %config.power_mode,
            pending = pending,
            "Intel gate ready"
        );

        Ok(IntelGate {
            admission: Mutex::new(Admission {
                rate_limiter: RateLimiter::new(self.rate_limits),
                nonces,
            }),
            rejections: Mutex::new(RejectionLog::new(config.rejection_log_capacity)),
            config,
            session_id,
            signer,
            resolver,
            queue: Arc::new(queue),
            online,
            signals,
            ingest,
            triggers,
            trigger_rx: Mutex::new(Some(trigger_rx)),
        })
    }
}

/// Outbound event gate
pub struct IntelGate {
    config: GateConfig,
    session_id: String,
    signer: EnvelopeSigner,
    admission: Mutex<Admission>,
    rejections: Mutex<RejectionLog>,
    resolver: Arc<PolicyResolver>,
    queue: Arc<QueueManager>,
    online: watch::Sender<bool>,
    signals: SignalEmitter,
    ingest: Option<IngestClient>,
    triggers: mpsc::Sender<FlushTrigger>,
    trigger_rx: Mutex<Option<mpsc::Receiver<FlushTrigger>>>,
}

impl IntelGate {
    /// Start building a gate
    pub fn builder(config: GateConfig) -> GateBuilder {
        GateBuilder {
            config,
            sender: None,
            store: None,
            rate_limits: RateLimitConfig::default(),
            nonce_ttl: None,
            signals_enabled: true,
        }
    }

    /// Build a gate from environment configuration
    pub async fn from_env() -> Result<Self, GateError> {
        Self::builder(GateConfig::from_env()).build().await
    }

    /// Admit, sign and queue an event
    ///
    /// `meta.session_id` selects the rate-limit bucket (the durable session
    /// when absent) and `meta.nonce` supplies the replay nonce (a fresh one
    /// when absent). `source` and `power_mode` are stamped into `meta`.
    pub async fn emit(
        &self,
        event_name: &str,
        payload: Value,
        meta: Map<String, Value>,
    ) -> Result<QueuedReceipt, RejectionReason> {
        let policy = self.resolver.current();
        let session_id = meta
            .get("session_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.session_id.as_str())
            .to_string();
        let nonce = meta
            .get("nonce")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        if let Err((reason, detail)) = self.admit(event_name, &payload, &session_id, &nonce, &policy) {
            self.record_rejection(reason, detail, event_name, &payload, &meta);
            return Err(reason);
        }

        let envelope_meta = self.envelope_meta(meta, &session_id, policy.power_mode);
        let envelope = self
            .signer
            .seal(EventEnvelope::new(event_name, payload, envelope_meta, nonce));
        let enqueued = self.queue.enqueue(envelope).await;
        let item = enqueued.item;

        self.signals.emit(SignalKind::Queued {
            item_id: item.id.clone(),
            event_name: item.envelope.event_name.clone(),
            priority_class: item.priority_class,
            pending: enqueued.pending,
        });

        if item.priority_class == PriorityClass::SosEvent {
            self.request_flush(true);
        }

        Ok(QueuedReceipt {
            id: item.id,
            event_name: item.envelope.event_name,
            priority_class: item.priority_class,
            pending: enqueued.pending,
            queued_at: item.created_at,
        })
    }

    fn admit(
        &self,
        event_name: &str,
        payload: &Value,
        session_id: &str,
        nonce: &str,
        policy: &Policy,
    ) -> Result<(), (RejectionReason, Option<String>)> {
        if !is_canonical(event_name) {
            return Err((RejectionReason::UnknownEvent, None));
        }
        if !payload.is_object() {
            return Err((RejectionReason::PayloadNotObject, None));
        }
        if let Err(e) = validate_detailed(event_name, payload) {
            return Err((RejectionReason::SchemaValidationFailed, Some(e.to_string())));
        }
        if policy.drops_noncritical() && PriorityClass::for_event(event_name).is_noncritical() {
            return Err((RejectionReason::PowerModeDropNoncritical, None));
        }

        let mut admission = lock(&self.admission);
        if !admission.rate_limiter.allow(event_name, session_id) {
            return Err((RejectionReason::RateLimitExceeded, None));
        }
        if !admission.nonces.consume(nonce) {
            return Err((RejectionReason::ReplayNonceDetected, None));
        }
        Ok(())
    }

    fn envelope_meta(
        &self,
        mut meta: Map<String, Value>,
        session_id: &str,
        power_mode: PowerMode,
    ) -> Map<String, Value> {
        meta.remove("nonce");
        meta.insert("session_id".to_string(), Value::from(session_id));
        meta.entry("source")
            .or_insert_with(|| Value::from(self.config.source.as_str()));
        meta.insert("power_mode".to_string(), Value::from(power_mode.as_str()));
        meta
    }

    fn record_rejection(
        &self,
        reason: RejectionReason,
        detail: Option<String>,
        event_name: &str,
        payload: &Value,
        meta: &Map<String, Value>,
    ) {
        debug!(event = %event_name, reason = %reason, detail = detail.as_deref().unwrap_or(""), "Event rejected");

        let mut entry = RejectionEntry::new(reason, event_name, payload, meta);
        if let Some(detail) = detail {
            entry = entry.with_detail(detail);
        }
        let event_name = entry.event_name.clone();
        lock(&self.rejections).push(entry);

        self.signals.emit(SignalKind::Rejected {
            event_name,
            reason: reason.as_str().to_string(),
        });
    }

    /// Ask the scheduler for a flush pass
    ///
    /// Requests are buffered until the scheduler starts; extra requests
    /// beyond the buffer are coalesced. Use [`IntelGate::has_scheduler`] to
    /// decide whether to flush directly instead.
    pub fn request_flush(&self, force: bool) {
        let trigger = if force {
            FlushTrigger::Immediate
        } else {
            FlushTrigger::Nudge
        };
        if self.triggers.try_send(trigger).is_err() {
            debug!(force = force, "Flush request coalesced");
        }
    }

    /// Run one flush pass now
    pub async fn flush(&self, force: bool) -> FlushReport {
        self.queue.flush(force).await
    }

    /// Whether the background scheduler has been started
    pub fn has_scheduler(&self) -> bool {
        lock(&self.trigger_rx).is_none()
    }

    /// Spawn the background flush scheduler
    pub fn start_scheduler(&self) -> Result<SchedulerHandle, GateError> {
        let triggers = lock(&self.trigger_rx)
            .take()
            .ok_or(GateError::SchedulerAlreadyStarted)?;
        Ok(FlushScheduler::new(
            Arc::clone(&self.queue),
            self.resolver.subscribe(),
            self.online.subscribe(),
            triggers,
        )
        .spawn())
    }

    /// Report connectivity; going online wakes the scheduler
    pub fn set_online(&self, online: bool) {
        let changed = self.online.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            info!(online = online, "Connectivity changed");
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Apply a power-mode transition
    pub fn set_power_mode(&self, mode: PowerMode) -> Arc<Policy> {
        self.resolver.apply(PolicyInput::PowerMode(mode))
    }

    /// Apply a remote golden record
    pub fn apply_golden_record(&self, record: Value) -> Arc<Policy> {
        self.resolver.apply(PolicyInput::GoldenRecord(record))
    }

    /// Channel for delivering policy inputs from other tasks
    pub fn spawn_policy_listener(&self) -> (mpsc::Sender<PolicyInput>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(POLICY_INPUT_CAPACITY);
        let handle = Arc::clone(&self.resolver).listen(rx);
        (tx, handle)
    }

    /// Replace the bearer token on the built-in ingest client
    ///
    /// Returns `false` when a custom sender is in use.
    pub async fn set_bearer_token(&self, token: Option<String>) -> bool {
        match &self.ingest {
            Some(client) => {
                client.set_bearer_token(token).await;
                true
            }
            None => false,
        }
    }

    /// Current effective policy
    pub fn policy(&self) -> Arc<Policy> {
        self.resolver.current()
    }

    /// Subscribe to diagnostic signals
    pub fn subscribe(&self) -> broadcast::Receiver<GateSignal> {
        self.signals.subscribe()
    }

    /// Durable session id
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Queue manager
    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.queue
    }

    /// Recorded rejections, oldest first
    pub fn rejections(&self) -> Vec<RejectionEntry> {
        lock(&self.rejections).entries()
    }

    /// Status snapshot
    pub async fn stats(&self) -> GateStats {
        let policy = self.resolver.current();
        GateStats {
            queue: self.queue.stats().await,
            online: self.is_online(),
            power_mode: policy.power_mode,
            endpoint: policy.endpoint.clone(),
            session_id: self.session_id.clone(),
            rejections: lock(&self.rejections).len(),
            rate_limit_keys: lock(&self.admission).rate_limiter.tracked_keys(),
        }
    }
}

fn open_state(root: &Path) -> Result<(LocalState, String, String), StateError> {
    let state = LocalState::open(root)?;
    let session_id = state.session_id()?;
    let secret = state.signing_secret()?;
    Ok((state, session_id, secret))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
