//! Gate construction errors

use crate::config::ConfigError;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors building or starting a gate
///
/// Admission outcomes are [`RejectionReason`](super::RejectionReason) values,
/// not errors.
#[derive(Debug, Error)]
pub enum GateError {
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Ingest client could not be built
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `start_scheduler` called twice
    #[error("Flush scheduler already started")]
    SchedulerAlreadyStarted,
}
