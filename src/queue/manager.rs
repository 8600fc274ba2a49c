//! Priority queue manager
//!
//! Owns the queue of signed envelopes and drives delivery:
//!
//! ```text
//! enqueue ──► sort (priority, created_at) ──► truncate ──► persist
//!
//! flush ──► guard ──► select due ──► BatchSender ──► reconcile
//!                                                      │
//!           persist ◄── drop / reschedule ◄────────────┘
//! ```
//!
//! Queue mutations are short critical sections. The only suspension point
//! inside `flush` is the network call, and the queue lock is not held across
//! it, so `enqueue` keeps working while a batch is in flight.

use super::item::{QueueItem, RetryDecision, REJECTED_BY_BACKEND};
use super::store::QueueStore;
use crate::contracts::{EventEnvelope, PriorityClass};
use crate::policy::Policy;
use crate::signals::{DropReason, SignalEmitter, SignalKind};
use crate::signer::EnvelopeSigner;
use crate::transport::BatchSender;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// Why a flush pass did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another pass is in flight
    AlreadyFlushing,
    /// Offline and not forced
    Offline,
    /// No batch sender configured
    NoSender,
    /// Nothing queued
    QueueEmpty,
    /// Items queued but none due yet
    NothingDue,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyFlushing => write!(f, "already_flushing"),
            SkipReason::Offline => write!(f, "offline"),
            SkipReason::NoSender => write!(f, "no_sender"),
            SkipReason::QueueEmpty => write!(f, "queue_empty"),
            SkipReason::NothingDue => write!(f, "nothing_due"),
        }
    }
}

/// Result of one flush pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlushReport {
    /// Set when the pass never reached the transport
    pub skipped: Option<SkipReason>,
    /// Items handed to the transport
    pub attempted: usize,
    /// Items the backend accepted
    pub accepted: usize,
    /// Items rescheduled or dropped
    pub failed: usize,
    /// Items dropped after exhausting their budget
    pub dropped: usize,
    /// Items left in the queue afterwards
    pub remaining: usize,
    /// Batch-level error, if any
    pub error: Option<String>,
}

impl FlushReport {
    fn skipped(reason: SkipReason, remaining: usize) -> Self {
        Self {
            skipped: Some(reason),
            remaining,
            ..Default::default()
        }
    }

    /// Whether the pass was skipped
    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}

/// Result of an enqueue
#[derive(Debug, Clone, PartialEq)]
pub struct Enqueued {
    /// The queued item
    pub item: QueueItem,
    /// Queue length afterwards
    pub pending: usize,
    /// Items evicted by the queue bound (possibly including this one)
    pub evicted: usize,
}

/// Queue statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStats {
    /// Items queued
    pub pending: usize,
    /// Items due now
    pub due: usize,
    /// Items queued per class
    pub pending_by_class: BTreeMap<PriorityClass, usize>,
    /// Whether a flush is in flight
    pub flushing: bool,
    /// End of the last pass that reached the transport
    pub last_flush_at: Option<DateTime<Utc>>,
    /// Error of that pass, if any
    pub last_flush_error: Option<String>,
    /// Last snapshot write failure, cleared by the next success
    pub last_persist_error: Option<String>,
    /// Items accepted since startup
    pub total_accepted: u64,
    /// Items dropped since startup
    pub total_dropped: u64,
    /// Whether the queue is currently backed by durable storage
    pub durable: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    items: Vec<QueueItem>,
    last_flush_at: Option<DateTime<Utc>>,
    last_flush_error: Option<String>,
    last_persist_error: Option<String>,
    total_accepted: u64,
    total_dropped: u64,
}

/// Resets the `flushing` flag however the pass ends
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Persistent, priority-sorted retry queue
pub struct QueueManager {
    state: Arc<RwLock<QueueState>>,
    flushing: Arc<AtomicBool>,
    store: Arc<dyn QueueStore>,
    policy: watch::Receiver<Arc<Policy>>,
    online: watch::Receiver<bool>,
    sender: Option<Arc<dyn BatchSender>>,
    signals: SignalEmitter,
}

impl QueueManager {
    /// Open a queue, re-hydrating from `store`
    ///
    /// An unreadable snapshot is logged and the queue starts empty.
    pub fn open(
        store: Arc<dyn QueueStore>,
        policy: watch::Receiver<Arc<Policy>>,
        online: watch::Receiver<bool>,
        signals: SignalEmitter,
    ) -> Self {
        let mut state = QueueState::default();
        match store.load() {
            Ok(mut items) => {
                items.sort_by(QueueItem::queue_order);
                if !items.is_empty() {
                    info!(count = items.len(), "Re-hydrated queue snapshot");
                }
                state.items = items;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load queue snapshot, starting empty");
                state.last_persist_error = Some(e.to_string());
            }
        }

        Self {
            state: Arc::new(RwLock::new(state)),
            flushing: Arc::new(AtomicBool::new(false)),
            store,
            policy,
            online,
            sender: None,
            signals,
        }
    }

    /// Attach the batch sender used by `flush`
    pub fn with_sender(mut self, sender: Arc<dyn BatchSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Whether a batch sender is attached
    pub fn has_sender(&self) -> bool {
        self.sender.is_some()
    }

    /// Current effective policy
    pub fn policy(&self) -> Arc<Policy> {
        self.policy.borrow().clone()
    }

    /// Whether the network is currently reported online
    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Discard items whose signature no longer verifies
    ///
    /// Returns the number of discarded items.
    pub async fn retain_verified(&self, signer: &EnvelopeSigner) -> usize {
        let mut state = self.state.write().await;
        let (kept, discarded): (Vec<QueueItem>, Vec<QueueItem>) = std::mem::take(&mut state.items)
            .into_iter()
            .partition(|item| signer.verify(&item.envelope));
        state.items = kept;

        if discarded.is_empty() {
            return 0;
        }

        warn!(count = discarded.len(), "Discarding queue items with invalid signatures");
        state.total_dropped += discarded.len() as u64;
        self.persist(&mut state);
        drop(state);

        self.emit_dropped(&discarded, DropReason::SignatureMismatch);
        discarded.len()
    }

    /// Queue a signed envelope
    pub async fn enqueue(&self, envelope: EventEnvelope) -> Enqueued {
        self.enqueue_at(envelope, Utc::now()).await
    }

    /// Queue a signed envelope with an explicit creation time
    pub async fn enqueue_at(&self, envelope: EventEnvelope, now: DateTime<Utc>) -> Enqueued {
        let policy = self.policy();
        let item = QueueItem::new(envelope, &policy, now);

        let mut state = self.state.write().await;
        state.items.push(item.clone());
        state.items.sort_by(QueueItem::queue_order);

        let max_entries = policy.max_queue_entries.max(1);
        let evicted = if state.items.len() > max_entries {
            state.items.split_off(max_entries)
        } else {
            Vec::new()
        };
        state.total_dropped += evicted.len() as u64;

        self.persist(&mut state);
        let pending = state.items.len();
        drop(state);

        debug!(
            item_id = %item.id,
            event = %item.envelope.event_name,
            priority_class = %item.priority_class,
            pending = pending,
            "Envelope enqueued"
        );
        if !evicted.is_empty() {
            self.emit_dropped(&evicted, DropReason::QueueFull);
        }

        Enqueued {
            item,
            pending,
            evicted: evicted.len(),
        }
    }

    /// Run one flush pass now
    pub async fn flush(&self, force: bool) -> FlushReport {
        self.flush_at(force, Utc::now()).await
    }

    /// Run one flush pass as of `now`
    ///
    /// `force` bypasses the offline check and the due-time filter; the batch
    /// is still capped at `batch_size`.
    pub async fn flush_at(&self, force: bool, now: DateTime<Utc>) -> FlushReport {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return FlushReport::skipped(SkipReason::AlreadyFlushing, self.pending().await);
        }
        let _guard = FlushGuard(&self.flushing);

        if !force && !self.is_online() {
            return FlushReport::skipped(SkipReason::Offline, self.pending().await);
        }
        let sender = match &self.sender {
            Some(sender) => Arc::clone(sender),
            None => return FlushReport::skipped(SkipReason::NoSender, self.pending().await),
        };

        let policy = self.policy();
        let batch: Vec<QueueItem> = {
            let state = self.state.read().await;
            if state.items.is_empty() {
                return FlushReport::skipped(SkipReason::QueueEmpty, 0);
            }
            state
                .items
                .iter()
                .filter(|item| force || item.is_due(now))
                .take(policy.batch_size.max(1))
                .cloned()
                .collect()
        };
        if batch.is_empty() {
            return FlushReport::skipped(SkipReason::NothingDue, self.pending().await);
        }

        let envelopes: Vec<EventEnvelope> = batch.iter().map(|item| item.envelope.clone()).collect();
        debug!(count = envelopes.len(), force = force, endpoint = %policy.endpoint, "Flushing batch");

        // Lock released; enqueue proceeds while the request is in flight
        let result = sender.send_batch(&policy.endpoint, &envelopes).await;

        let (accepted, item_error, batch_error) = match result {
            Ok(outcome) => {
                let error = (outcome.rejected > 0)
                    .then(|| format!("{} of {} rejected by backend", outcome.rejected, outcome.submitted));
                (outcome.accepted, REJECTED_BY_BACKEND.to_string(), error)
            }
            Err(e) => (0, e.kind().to_string(), Some(e.to_string())),
        };
        let accepted = accepted.min(batch.len());

        // Accepted items are the leading ones in submission order
        let accepted_ids: HashSet<&str> = batch[..accepted].iter().map(|i| i.id.as_str()).collect();
        let failed_ids: HashSet<&str> = batch[accepted..].iter().map(|i| i.id.as_str()).collect();

        let mut notify = Vec::new();
        let mut dropped = Vec::new();
        let mut state = self.state.write().await;
        state.items.retain(|item| !accepted_ids.contains(item.id.as_str()));

        for item in state
            .items
            .iter_mut()
            .filter(|item| failed_ids.contains(item.id.as_str()))
        {
            let strategy = policy.strategy_for(item.priority_class);
            let decision = item.record_failure(&strategy, item_error.as_str(), now);

            if strategy.notify_user_on_failure && item.attempts == strategy.max_retry_attempts {
                notify.push(item.clone());
            }
            if decision == RetryDecision::Drop {
                dropped.push(item.clone());
            }
        }

        let dropped_ids: HashSet<&str> = dropped.iter().map(|i| i.id.as_str()).collect();
        state.items.retain(|item| !dropped_ids.contains(item.id.as_str()));

        state.last_flush_at = Some(now);
        state.last_flush_error = batch_error.clone();
        state.total_accepted += accepted as u64;
        state.total_dropped += dropped.len() as u64;
        self.persist(&mut state);
        let remaining = state.items.len();
        drop(state);

        let report = FlushReport {
            skipped: None,
            attempted: batch.len(),
            accepted,
            failed: batch.len() - accepted,
            dropped: dropped.len(),
            remaining,
            error: batch_error,
        };

        for item in &notify {
            self.signals.emit(SignalKind::DeliveryFailed {
                item_id: item.id.clone(),
                event_name: item.envelope.event_name.clone(),
                priority_class: item.priority_class,
                attempts: item.attempts,
                last_error: item.last_error.clone(),
            });
        }
        if !dropped.is_empty() {
            self.emit_dropped(&dropped, DropReason::RetryExhausted);
        }
        self.signals.emit(SignalKind::FlushCompleted {
            attempted: report.attempted,
            accepted: report.accepted,
            failed: report.failed,
            dropped: report.dropped,
            error: report.error.clone(),
        });

        report
    }

    /// Number of queued items
    pub async fn pending(&self) -> usize {
        self.state.read().await.items.len()
    }

    /// Copy of the queue in delivery order
    pub async fn items(&self) -> Vec<QueueItem> {
        self.state.read().await.items.clone()
    }

    /// Queue statistics
    pub async fn stats(&self) -> QueueStats {
        self.stats_at(Utc::now()).await
    }

    /// Queue statistics with `due` evaluated at `now`
    pub async fn stats_at(&self, now: DateTime<Utc>) -> QueueStats {
        let state = self.state.read().await;

        let mut pending_by_class = BTreeMap::new();
        for item in &state.items {
            *pending_by_class.entry(item.priority_class).or_insert(0) += 1;
        }

        QueueStats {
            pending: state.items.len(),
            due: state.items.iter().filter(|item| item.is_due(now)).count(),
            pending_by_class,
            flushing: self.flushing.load(Ordering::Acquire),
            last_flush_at: state.last_flush_at,
            last_flush_error: state.last_flush_error.clone(),
            last_persist_error: state.last_persist_error.clone(),
            total_accepted: state.total_accepted,
            total_dropped: state.total_dropped,
            durable: self.store.is_durable() && state.last_persist_error.is_none(),
        }
    }

    /// Write the snapshot; failures degrade to memory-only operation
    fn persist(&self, state: &mut QueueState) {
        match self.store.save(&state.items) {
            Ok(()) => state.last_persist_error = None,
            Err(e) => {
                warn!(error = %e, pending = state.items.len(), "Queue snapshot write failed, continuing in memory");
                state.last_persist_error = Some(e.to_string());
            }
        }
    }

    fn emit_dropped(&self, items: &[QueueItem], reason: DropReason) {
        self.signals.emit(SignalKind::ItemsDropped {
            count: items.len(),
            reason,
            event_names: items
                .iter()
                .map(|item| item.envelope.event_name.clone())
                .collect(),
        });
    }
}
