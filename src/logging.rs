//! Logging setup
//!
//! Human-readable output on stderr, filtered by `RUST_LOG`. Diagnostic
//! signals log under the `intel_gate_signals` target.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,intel_gate=debug";

/// Filter used when `RUST_LOG` is unset and `--quiet` is given
pub const QUIET_FILTER: &str = "warn";

/// Install the global subscriber
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(quiet: bool) {
    let fallback = if quiet { QUIET_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init();
}
