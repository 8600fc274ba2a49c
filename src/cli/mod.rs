//! Command-line interface
//!
//! ```bash
//! intel-gate emit sos.triggered --payload '{"tier":2}' --flush
//! intel-gate flush --force
//! intel-gate stats --json
//! intel-gate policy --power-mode critical --golden-record ./golden.json
//! intel-gate run < events.jsonl
//! ```

pub mod commands;

use clap::{Args, Parser, Subcommand};
use intel_gate::{GateConfig, PowerMode};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "intel-gate", version, about = "Validated, signed, queued event delivery")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// State directory (queue snapshot, session id, signing secret)
    #[arg(long, global = true, env = "INTEL_GATE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Ingest endpoint override
    #[arg(long, global = true, env = "INTEL_INGEST_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Golden record JSON file
    #[arg(long, global = true, env = "INTEL_GOLDEN_RECORD_PATH")]
    pub golden_record: Option<PathBuf>,

    /// Power mode (normal, power_saver, emergency, critical)
    #[arg(long, global = true)]
    pub power_mode: Option<PowerMode>,

    /// Start with the network marked offline
    #[arg(long, global = true)]
    pub offline: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl GlobalArgs {
    /// Environment configuration with command-line overrides applied
    pub fn gate_config(&self) -> GateConfig {
        let mut config = GateConfig::from_env().with_start_online(!self.offline);
        if let Some(dir) = &self.state_dir {
            config = config.with_state_dir(dir);
        }
        if let Some(endpoint) = &self.endpoint {
            config = config.with_endpoint(endpoint.clone());
        }
        if let Some(path) = &self.golden_record {
            config = config.with_golden_record_path(path);
        }
        if let Some(mode) = self.power_mode {
            config = config.with_power_mode(mode);
        }
        config
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Admit and queue a single event
    Emit(EmitArgs),
    /// Run one flush pass over the persisted queue
    Flush(FlushArgs),
    /// Show queue and gate status
    Stats,
    /// Show the effective delivery policy
    Policy,
    /// Read JSON-lines events from stdin with the scheduler running
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct EmitArgs {
    /// Canonical event name
    pub event: String,

    /// Payload JSON object
    #[arg(long, default_value = "{}")]
    pub payload: String,

    /// Meta JSON object
    #[arg(long)]
    pub meta: Option<String>,

    /// Replay nonce (generated when absent)
    #[arg(long)]
    pub nonce: Option<String>,

    /// Flush right after queueing
    #[arg(long)]
    pub flush: bool,
}

#[derive(Debug, Args)]
pub struct FlushArgs {
    /// Ignore backoff and connectivity
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Skip the final forced flush on shutdown
    #[arg(long)]
    pub no_final_flush: bool,

    /// Print every admission outcome
    #[arg(long)]
    pub verbose_outcomes: bool,
}
