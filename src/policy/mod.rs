//! Runtime policy
//!
//! - [`types`]: `Policy`, retry strategies, power modes, backoff math
//! - [`resolver`]: merge of defaults, golden record and power mode, published
//!   over a watch channel

pub mod resolver;
pub mod types;

pub use resolver::{resolve_policy, PolicyInput, PolicyResolver};
pub use types::{
    compute_backoff_ms, BackoffType, Policy, PowerMode, RetryStrategy, DEFAULT_ENDPOINT,
    MAX_BACKOFF_MS,
};
