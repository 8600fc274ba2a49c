//! Per-session rate limiter
//!
//! Sliding 60-second window keyed by `(session_id, event_name)`. Each key
//! keeps the timestamps of its admitted calls; a call is denied once the
//! pruned window already holds `ceiling` entries. Denied calls are not
//! recorded, so a burst does not extend its own penalty. Idle keys are
//! swept every [`PRUNE_INTERVAL`] calls.
//!
//! This is a local, best-effort throttle against a single misbehaving
//! session. It does nothing against distributed abuse.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Window length in seconds
pub const WINDOW_SECS: u64 = 60;

/// Ceiling for events without an explicit entry
pub const DEFAULT_CEILING: u32 = 20;

/// Session key used when the caller supplies none
pub const ANONYMOUS_SESSION: &str = "anonymous";

/// Calls between sweeps of idle keys
pub const PRUNE_INTERVAL: u64 = 128;

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in seconds
    pub window_secs: u64,
    /// Ceiling for unlisted events
    pub default_ceiling: u32,
    /// Per-event ceilings (calls per window)
    pub ceilings: HashMap<String, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let ceilings = [
            ("sos.armed", 10),
            ("sos.triggered", 10),
            ("sos.deactivated", 10),
            ("context.update", 30),
            ("threat.report_submitted", 5),
            ("price.crowd_submitted", 10),
        ]
        .into_iter()
        .map(|(name, ceiling)| (name.to_string(), ceiling))
        .collect();

        Self {
            window_secs: WINDOW_SECS,
            default_ceiling: DEFAULT_CEILING,
            ceilings,
        }
    }
}

impl RateLimitConfig {
    /// Ceiling for one event name
    pub fn ceiling_for(&self, event_name: &str) -> u32 {
        self.ceilings
            .get(event_name)
            .copied()
            .unwrap_or(self.default_ceiling)
    }

    /// Set a per-event ceiling
    pub fn with_ceiling(mut self, event_name: impl Into<String>, ceiling: u32) -> Self {
        self.ceilings.insert(event_name.into(), ceiling);
        self
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Sliding-window limiter
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: HashMap<(String, String), Vec<Instant>>,
    calls: u64,
}

impl RateLimiter {
    /// Create a limiter with configuration
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
            calls: 0,
        }
    }

    /// Create with default ceilings
    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Get configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit or deny one call at the current instant
    pub fn allow(&mut self, event_name: &str, session_id: &str) -> bool {
        self.allow_at(event_name, session_id, Instant::now())
    }

    /// Admit or deny one call observed at `now`
    pub fn allow_at(&mut self, event_name: &str, session_id: &str, now: Instant) -> bool {
        let session = if session_id.is_empty() {
            ANONYMOUS_SESSION
        } else {
            session_id
        };
        let ceiling = self.config.ceiling_for(event_name) as usize;
        let window = self.config.window();

        self.calls = self.calls.wrapping_add(1);
        if self.calls % PRUNE_INTERVAL == 0 {
            self.prune(now);
        }

        let stamps = self
            .windows
            .entry((session.to_string(), event_name.to_string()))
            .or_default();
        stamps.retain(|stamp| now.saturating_duration_since(*stamp) < window);

        if stamps.len() >= ceiling {
            debug!(
                event_name = %event_name,
                session_id = %session,
                in_window = stamps.len(),
                ceiling,
                "Rate limit ceiling reached"
            );
            return false;
        }

        stamps.push(now);
        true
    }

    /// Drop keys whose windows are empty as of `now`
    pub fn prune(&mut self, now: Instant) {
        let window = self.config.window();
        let before = self.windows.len();
        self.windows.retain(|_, stamps| {
            stamps.retain(|stamp| now.saturating_duration_since(*stamp) < window);
            !stamps.is_empty()
        });
        debug!(removed = before - self.windows.len(), kept = self.windows.len(), "Pruned rate-limit keys");
    }

    /// Number of tracked `(session, event)` keys
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
