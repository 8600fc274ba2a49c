//! Gate orchestration
//!
//! - [`orchestrator`]: `IntelGate` and its builder
//! - [`rejection`]: rejection reasons and the diagnostic ring buffer
//! - [`scheduler`]: background flush loop
//! - [`error`]: construction errors

pub mod error;
pub mod orchestrator;
pub mod rejection;
pub mod scheduler;

pub use error::GateError;
pub use orchestrator::{GateBuilder, GateStats, IntelGate, QueuedReceipt};
pub use rejection::{RejectionEntry, RejectionLog, RejectionReason};
pub use scheduler::{FlushScheduler, FlushTrigger, SchedulerHandle};
