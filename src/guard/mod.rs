//! Admission guards
//!
//! Process-local, in-memory throttles applied before an envelope is built:
//!
//! - [`rate_limit`]: sliding-window ceiling per `(session, event)`
//! - [`nonce`]: single-use nonce cache with a 10-minute TTL

pub mod nonce;
pub mod rate_limit;

pub use nonce::{NonceGuard, DEFAULT_NONCE_TTL_SECS};
pub use rate_limit::{RateLimitConfig, RateLimiter, ANONYMOUS_SESSION, PRUNE_INTERVAL};
