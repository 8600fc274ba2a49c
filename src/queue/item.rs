//! Queue items

use crate::contracts::{EventEnvelope, PriorityClass};
use crate::policy::{Policy, RetryStrategy};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// `last_error` for items the backend refused in a partially accepted batch
pub const REJECTED_BY_BACKEND: &str = "rejected_by_backend";

/// A signed envelope awaiting delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Item identifier (the envelope id)
    pub id: String,
    /// Enqueue time
    pub created_at: DateTime<Utc>,
    /// Class derived from the event-name prefix
    pub priority_class: PriorityClass,
    /// Numeric priority from the policy (lower = sooner)
    pub priority: u32,
    /// Failed delivery attempts so far
    pub attempts: u32,
    /// Earliest time of the next scheduled attempt
    pub next_attempt_at: DateTime<Utc>,
    /// Reason for the last failure
    pub last_error: Option<String>,
    /// The signed envelope
    pub envelope: EventEnvelope,
}

/// What a failed attempt did to an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Rescheduled within budget
    Retry,
    /// Budget used up but the class persists; rescheduled anyway
    RetryPastBudget,
    /// Budget used up; remove the item
    Drop,
}

impl QueueItem {
    /// Wrap a signed envelope, due immediately
    pub fn new(envelope: EventEnvelope, policy: &Policy, now: DateTime<Utc>) -> Self {
        let priority_class = PriorityClass::for_event(&envelope.event_name);
        Self {
            id: envelope.id.clone(),
            created_at: now,
            priority_class,
            priority: policy.priority_for(priority_class),
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
            envelope,
        }
    }

    /// Whether the item may be attempted at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at <= now
    }

    /// Queue order: `(priority, created_at)`
    pub fn queue_order(&self, other: &Self) -> Ordering {
        (self.priority, self.created_at).cmp(&(other.priority, other.created_at))
    }

    /// Record a failed attempt and reschedule
    pub fn record_failure(
        &mut self,
        strategy: &RetryStrategy,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.into());

        let delay_ms = i64::try_from(strategy.backoff_ms(self.attempts)).unwrap_or(i64::MAX);
        self.next_attempt_at = now + Duration::milliseconds(delay_ms);

        if !strategy.is_exhausted(self.attempts) {
            RetryDecision::Retry
        } else if strategy.persist_to_local_storage {
            RetryDecision::RetryPastBudget
        } else {
            RetryDecision::Drop
        }
    }
}
