//! Event contracts
//!
//! The static side of the gate: which events exist, what their payloads
//! must look like, and the envelope they travel in.
//!
//! - [`catalog`]: canonical whitelist and priority classes
//! - [`schemas`]: per-event payload validators
//! - [`envelope`]: the signed unit of transmission

pub mod catalog;
pub mod envelope;
pub mod schemas;

pub use catalog::{is_canonical, PriorityClass, CANONICAL_EVENTS};
pub use envelope::{EventEnvelope, SIGNATURE_ALG};
pub use schemas::{validate, validate_detailed, SchemaError};
