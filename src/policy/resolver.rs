//! Policy resolver
//!
//! Merges three inputs into one effective [`Policy`]:
//!
//! ```text
//!   defaults ──► golden record (per field) ──► power-mode multipliers
//!                                                   │
//!                                                   ▼
//!                                        watch::Sender<Arc<Policy>>
//! ```
//!
//! Inputs arrive as [`PolicyInput`] messages, either through [`PolicyResolver::apply`]
//! or a spawned listener. Every change re-resolves and publishes the result on a
//! watch channel; subscribers (the queue manager and flush scheduler) always see
//! the latest policy.

use super::types::{
    BackoffType, Policy, PowerMode, RetryStrategy, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL_MS,
    DEFAULT_MAX_QUEUE_ENTRIES,
};
use crate::contracts::PriorityClass;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Reconfiguration message
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyInput {
    /// A new remote golden record (raw JSON, validated per field)
    GoldenRecord(Value),
    /// A power-mode transition
    PowerMode(PowerMode),
}

#[derive(Debug, Default)]
struct ResolverInputs {
    golden_record: Option<Value>,
    power_mode: PowerMode,
}

/// Owns policy inputs and publishes the resolved policy
#[derive(Debug)]
pub struct PolicyResolver {
    endpoint_override: Option<String>,
    inputs: Mutex<ResolverInputs>,
    sender: watch::Sender<Arc<Policy>>,
}

impl PolicyResolver {
    /// Create a resolver
    ///
    /// `endpoint_override` wins over any golden-record endpoint.
    pub fn new(endpoint_override: Option<String>) -> Self {
        let initial = resolve_policy(None, PowerMode::Normal, endpoint_override.as_deref());
        let (sender, _) = watch::channel(Arc::new(initial));
        Self {
            endpoint_override,
            inputs: Mutex::new(ResolverInputs::default()),
            sender,
        }
    }

    /// Resolve from the current inputs without publishing
    pub fn resolve(&self) -> Policy {
        let inputs = self.lock_inputs();
        resolve_policy(
            inputs.golden_record.as_ref(),
            inputs.power_mode,
            self.endpoint_override.as_deref(),
        )
    }

    /// Latest published policy
    pub fn current(&self) -> Arc<Policy> {
        self.sender.borrow().clone()
    }

    /// Current power mode
    pub fn power_mode(&self) -> PowerMode {
        self.lock_inputs().power_mode
    }

    /// Subscribe to policy changes
    pub fn subscribe(&self) -> watch::Receiver<Arc<Policy>> {
        self.sender.subscribe()
    }

    /// Apply an input and publish the re-resolved policy
    ///
    /// Subscribers are only notified when the effective policy actually changes.
    pub fn apply(&self, input: PolicyInput) -> Arc<Policy> {
        {
            let mut inputs = self.lock_inputs();
            match input {
                PolicyInput::GoldenRecord(record) => {
                    debug!("Golden record received");
                    inputs.golden_record = Some(record);
                }
                PolicyInput::PowerMode(mode) => {
                    debug!(power_mode = %mode, "Power mode received");
                    inputs.power_mode = mode;
                }
            }
        }

        let policy = self.resolve();
        let changed = self.sender.send_if_modified(|current| {
            if **current == policy {
                false
            } else {
                *current = Arc::new(policy.clone());
                true
            }
        });

        if changed {
            info!(
                endpoint = %policy.endpoint,
                flush_interval_ms = policy.flush_interval_ms,
                batch_size = policy.batch_size,
                max_queue_entries = policy.max_queue_entries,
                power_mode = %policy.power_mode,
                "Policy updated"
            );
        }

        self.current()
    }

    /// Spawn a task applying every input received on `inputs`
    ///
    /// The task ends when all senders are dropped.
    pub fn listen(self: Arc<Self>, mut inputs: mpsc::Receiver<PolicyInput>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(input) = inputs.recv().await {
                self.apply(input);
            }
            debug!("Policy input channel closed");
        })
    }

    fn lock_inputs(&self) -> std::sync::MutexGuard<'_, ResolverInputs> {
        self.inputs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Pure merge of defaults, golden record, power mode and endpoint override
pub fn resolve_policy(
    golden_record: Option<&Value>,
    power_mode: PowerMode,
    endpoint_override: Option<&str>,
) -> Policy {
    let mut policy = Policy::default();

    if let Some(record) = golden_record.and_then(Value::as_object) {
        merge_golden_record(&mut policy, record);
    }

    if let Some(endpoint) = endpoint_override.filter(|url| is_http_url(url)) {
        policy.endpoint = endpoint.to_string();
    }

    apply_power_mode(&mut policy, power_mode);
    policy
}

fn merge_golden_record(policy: &mut Policy, record: &Map<String, Value>) {
    if let Some(endpoint) = lookup(record, &["endpoint", "ingestEndpoint"])
        .and_then(Value::as_str)
        .filter(|url| is_http_url(url))
    {
        policy.endpoint = endpoint.to_string();
    }

    policy.flush_interval_ms = lookup(record, &["flush_interval_ms", "flushIntervalMs"])
        .and_then(positive_int)
        .unwrap_or(DEFAULT_FLUSH_INTERVAL_MS);

    policy.batch_size = lookup(record, &["batch_size", "batchSize"])
        .and_then(positive_int)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(DEFAULT_BATCH_SIZE);

    policy.max_queue_entries = lookup(record, &["max_queue_entries", "maxQueueEntries"])
        .and_then(positive_int)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(DEFAULT_MAX_QUEUE_ENTRIES);

    if let Some(tiers) = lookup(record, &["priority_tiers", "priorityTiers"]).and_then(Value::as_object) {
        for class in PriorityClass::ALL {
            if let Some(tier) = class_entry(tiers, class)
                .and_then(non_negative_int)
                .and_then(|n| u32::try_from(n).ok())
            {
                policy.priority_tiers.insert(class, tier);
            }
        }
    }

    if let Some(strategies) =
        lookup(record, &["retry_strategy", "retryStrategy"]).and_then(Value::as_object)
    {
        for class in PriorityClass::ALL {
            if let Some(entry) = class_entry(strategies, class).and_then(Value::as_object) {
                policy
                    .retry_strategy
                    .insert(class, merge_strategy(RetryStrategy::default_for(class), entry));
            }
        }
    }
}

fn merge_strategy(mut strategy: RetryStrategy, entry: &Map<String, Value>) -> RetryStrategy {
    if let Some(max) = lookup(entry, &["max_retry_attempts", "maxRetryAttempts"])
        .and_then(positive_int)
        .and_then(|n| u32::try_from(n).ok())
    {
        strategy.max_retry_attempts = max;
    }
    if let Some(backoff) =
        lookup(entry, &["retry_backoff_ms", "retryBackoffMs"]).and_then(positive_int)
    {
        strategy.retry_backoff_ms = backoff;
    }
    if let Some(kind) = lookup(entry, &["backoff_type", "backoffType"])
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<BackoffType>().ok())
    {
        strategy.backoff_type = kind;
    }
    if let Some(persist) =
        lookup(entry, &["persist_to_local_storage", "persistToLocalStorage"]).and_then(Value::as_bool)
    {
        strategy.persist_to_local_storage = persist;
    }
    if let Some(notify) =
        lookup(entry, &["notify_user_on_failure", "notifyUserOnFailure"]).and_then(Value::as_bool)
    {
        strategy.notify_user_on_failure = notify;
    }
    strategy
}

fn apply_power_mode(policy: &mut Policy, power_mode: PowerMode) {
    policy.power_mode = power_mode;
    policy.flush_interval_ms = policy
        .flush_interval_ms
        .saturating_mul(power_mode.flush_multiplier());

    let scaled = (policy.batch_size as f64 * power_mode.batch_multiplier()).round();
    policy.batch_size = (scaled as usize).max(1);
}

fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key))
}

fn class_entry(map: &Map<String, Value>, class: PriorityClass) -> Option<&Value> {
    map.get(class.as_str())
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Integer > 0; integral floats are accepted
fn positive_int(value: &Value) -> Option<u64> {
    non_negative_int(value).filter(|n| *n > 0)
}

fn non_negative_int(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
        .map(|f| f as u64)
}
