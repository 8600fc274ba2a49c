//! Persistent priority retry queue
//!
//! - [`item`]: queue entries and retry bookkeeping
//! - [`store`]: snapshot persistence (file or memory)
//! - [`manager`]: enqueue, flush and stats

pub mod item;
pub mod manager;
pub mod store;

pub use item::{QueueItem, RetryDecision, REJECTED_BY_BACKEND};
pub use manager::{Enqueued, FlushReport, QueueManager, QueueStats, SkipReason};
pub use store::{FileQueueStore, MemoryQueueStore, QueueStore, StoreError};
