//! Intel Gate
//!
//! Outbound event gate for a field application. Producers hand events to
//! [`IntelGate::emit`]; the gate validates, throttles, de-duplicates and
//! signs them, then queues them for batched delivery to a remote ingest
//! service over an unreliable network.
//!
//! # Architecture
//!
//! ```text
//! emit ──► schema ──► power mode ──► rate limit ──► nonce ──► sign
//!                                                              │
//!                                                              ▼
//!   ingest service ◄── IngestClient ◄── flush ◄── QueueManager (persistent)
//!                                          ▲
//!                          FlushScheduler ─┘ (timer, online, SOS, policy)
//! ```
//!
//! Policy (endpoint, cadence, batch size, per-class retry) is resolved from
//! defaults, an optional remote golden record and the device power mode, and
//! published over a watch channel.

pub mod config;
pub mod contracts;
pub mod gate;
pub mod guard;
pub mod logging;
pub mod policy;
pub mod queue;
pub mod signals;
pub mod signer;
pub mod state;
pub mod transport;

pub use config::{ConfigError, GateConfig};
pub use contracts::{EventEnvelope, PriorityClass};
pub use gate::{GateError, IntelGate, QueuedReceipt, RejectionReason};
pub use policy::{Policy, PolicyInput, PowerMode};
pub use queue::{FlushReport, QueueStats};
pub use signals::{GateSignal, SignalKind};
pub use transport::{BatchSender, IngestClient, IngestConfig};
