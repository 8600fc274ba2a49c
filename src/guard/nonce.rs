//! Replay nonce guard
//!
//! TTL-bounded set of consumed nonces. A nonce is accepted the first time
//! it is seen inside the TTL and refused afterwards. Expired entries are
//! swept on every call.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// How long a consumed nonce is remembered
pub const DEFAULT_NONCE_TTL_SECS: u64 = 600;

/// Consumed-nonce cache
#[derive(Debug)]
pub struct NonceGuard {
    ttl: Duration,
    seen: HashMap<String, Instant>,
}

impl NonceGuard {
    /// Create a guard with a custom TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: HashMap::new(),
        }
    }

    /// Create a guard with the 10-minute default TTL
    pub fn with_defaults() -> Self {
        Self::new(Duration::from_secs(DEFAULT_NONCE_TTL_SECS))
    }

    /// Consume a nonce at the current instant
    pub fn consume(&mut self, nonce: &str) -> bool {
        self.consume_at(nonce, Instant::now())
    }

    /// Consume a nonce observed at `now`
    ///
    /// Returns `false` for empty nonces and for nonces already consumed
    /// within the TTL.
    pub fn consume_at(&mut self, nonce: &str, now: Instant) -> bool {
        self.sweep(now);

        if nonce.is_empty() {
            return false;
        }
        if self.seen.contains_key(nonce) {
            debug!(nonce = %nonce, "Replay nonce refused");
            return false;
        }

        self.seen.insert(nonce.to_string(), now + self.ttl);
        true
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no nonces are tracked
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn sweep(&mut self, now: Instant) {
        self.seen.retain(|_, expires_at| *expires_at > now);
    }
}
