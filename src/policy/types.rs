//! Policy types
//!
//! The effective runtime policy and its building blocks. Values here are
//! always usable: anything coming from outside has already been defaulted
//! field by field by the resolver.

use crate::contracts::PriorityClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default ingest endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8787/v1/intel/events";

/// Default flush interval (30 seconds)
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 30_000;

/// Default batch size
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Default queue bound
pub const DEFAULT_MAX_QUEUE_ENTRIES: usize = 500;

/// Backoff ceiling (10 minutes)
pub const MAX_BACKOFF_MS: u64 = 600_000;

/// Exponent cap for exponential backoff
pub const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Backoff shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffType {
    /// `base * attempts`
    Linear,
    /// `base * 2^min(6, attempts)`
    Exponential,
}

impl FromStr for BackoffType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(BackoffType::Linear),
            "exponential" => Ok(BackoffType::Exponential),
            other => Err(format!("unknown backoff type: {}", other)),
        }
    }
}

impl fmt::Display for BackoffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffType::Linear => write!(f, "linear"),
            BackoffType::Exponential => write!(f, "exponential"),
        }
    }
}

/// Per-class retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStrategy {
    /// Attempts after which a non-persistent item is dropped
    pub max_retry_attempts: u32,
    /// Base delay in milliseconds
    pub retry_backoff_ms: u64,
    /// Backoff shape
    pub backoff_type: BackoffType,
    /// Keep the item queued past its retry budget
    pub persist_to_local_storage: bool,
    /// Surface exhausted retries to the producing layer
    pub notify_user_on_failure: bool,
}

impl RetryStrategy {
    /// Hard-coded default for a class
    pub fn default_for(class: PriorityClass) -> Self {
        let (max_retry_attempts, retry_backoff_ms, backoff_type, persist, notify) = match class {
            PriorityClass::SosEvent => (12, 2_000, BackoffType::Exponential, true, true),
            PriorityClass::HazardAlert => (8, 5_000, BackoffType::Exponential, false, false),
            PriorityClass::PriceAnomaly => (5, 10_000, BackoffType::Linear, false, false),
            PriorityClass::ContextUpdate => (3, 15_000, BackoffType::Linear, false, false),
            PriorityClass::LegacyActivity => (3, 30_000, BackoffType::Linear, false, false),
        };
        Self {
            max_retry_attempts,
            retry_backoff_ms,
            backoff_type,
            persist_to_local_storage: persist,
            notify_user_on_failure: notify,
        }
    }

    /// Delay before the next attempt, given attempts made so far
    pub fn backoff_ms(&self, attempts: u32) -> u64 {
        compute_backoff_ms(self.backoff_type, self.retry_backoff_ms, attempts)
    }

    /// Whether an item with `attempts` failures has used up its budget
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_retry_attempts
    }
}

/// Backoff delay capped at [`MAX_BACKOFF_MS`]
pub fn compute_backoff_ms(backoff_type: BackoffType, base_ms: u64, attempts: u32) -> u64 {
    let delay = match backoff_type {
        BackoffType::Exponential => {
            base_ms.saturating_mul(1u64 << attempts.min(MAX_BACKOFF_EXPONENT))
        }
        BackoffType::Linear => base_ms.saturating_mul(u64::from(attempts)),
    };
    delay.min(MAX_BACKOFF_MS)
}

/// Device energy state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    #[default]
    Normal,
    PowerSaver,
    Emergency,
    Critical,
}

impl PowerMode {
    /// Flush interval multiplier
    pub fn flush_multiplier(&self) -> u64 {
        match self {
            PowerMode::Normal => 1,
            PowerMode::PowerSaver => 2,
            PowerMode::Emergency => 4,
            PowerMode::Critical => 8,
        }
    }

    /// Batch size multiplier
    pub fn batch_multiplier(&self) -> f64 {
        match self {
            PowerMode::Normal => 1.0,
            PowerMode::PowerSaver => 0.85,
            PowerMode::Emergency => 0.7,
            PowerMode::Critical => 0.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerMode::Normal => "normal",
            PowerMode::PowerSaver => "power_saver",
            PowerMode::Emergency => "emergency",
            PowerMode::Critical => "critical",
        }
    }
}

impl fmt::Display for PowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "normal" => Ok(PowerMode::Normal),
            "power_saver" | "powersaver" => Ok(PowerMode::PowerSaver),
            "emergency" => Ok(PowerMode::Emergency),
            "critical" => Ok(PowerMode::Critical),
            other => Err(format!("unknown power mode: {}", other)),
        }
    }
}

/// Effective runtime policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Ingest endpoint
    pub endpoint: String,
    /// Scheduled flush cadence
    pub flush_interval_ms: u64,
    /// Maximum envelopes per request
    pub batch_size: usize,
    /// Queue order per class (lower = sooner)
    pub priority_tiers: BTreeMap<PriorityClass, u32>,
    /// Retry behavior per class
    pub retry_strategy: BTreeMap<PriorityClass, RetryStrategy>,
    /// Queue bound
    pub max_queue_entries: usize,
    /// Power mode the policy was resolved under
    pub power_mode: PowerMode,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            priority_tiers: PriorityClass::ALL
                .into_iter()
                .map(|class| (class, default_tier(class)))
                .collect(),
            retry_strategy: PriorityClass::ALL
                .into_iter()
                .map(|class| (class, RetryStrategy::default_for(class)))
                .collect(),
            max_queue_entries: DEFAULT_MAX_QUEUE_ENTRIES,
            power_mode: PowerMode::Normal,
        }
    }
}

impl Policy {
    /// Numeric priority for a class
    pub fn priority_for(&self, class: PriorityClass) -> u32 {
        self.priority_tiers
            .get(&class)
            .copied()
            .unwrap_or_else(|| default_tier(class))
    }

    /// Retry strategy for a class
    pub fn strategy_for(&self, class: PriorityClass) -> RetryStrategy {
        self.retry_strategy
            .get(&class)
            .copied()
            .unwrap_or_else(|| RetryStrategy::default_for(class))
    }

    /// Flush cadence as a duration
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Whether non-critical classes are dropped at emission time
    pub fn drops_noncritical(&self) -> bool {
        self.power_mode == PowerMode::Critical
    }
}

/// Default tier: class declaration order
pub fn default_tier(class: PriorityClass) -> u32 {
    match class {
        PriorityClass::SosEvent => 0,
        PriorityClass::HazardAlert => 1,
        PriorityClass::PriceAnomaly => 2,
        PriorityClass::ContextUpdate => 3,
        PriorityClass::LegacyActivity => 4,
    }
}
