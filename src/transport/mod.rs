//! Flush transport
//!
//! Delivers batches of signed envelopes to the remote ingest service.
//!
//! # Architecture
//!
//! ```text
//! QueueManager ──► dyn BatchSender ──► IngestClient ──► POST {endpoint}
//!                                                         │
//!                        BatchOutcome ◄── reconcile ◄─────┘
//! ```
//!
//! The queue manager only sees the [`BatchSender`] trait, so tests and
//! embedders can swap the network for an in-memory sender.

mod client;
mod error;
mod types;

pub use client::{BatchSender, IngestClient};
pub use error::TransportError;
pub use types::*;
