//! Subcommand implementations

pub mod emit;
pub mod flush;
pub mod policy;
pub mod run;
pub mod stats;

use anyhow::{Context, Result};
use colored::Colorize;
use intel_gate::queue::FlushReport;
use intel_gate::{GateConfig, IntelGate};
use serde_json::{Map, Value};

/// Build a gate with the default HTTP sender and file store
pub(crate) async fn open_gate(config: GateConfig) -> Result<IntelGate> {
    let state_dir = config.state_dir.clone();
    IntelGate::builder(config)
        .build()
        .await
        .with_context(|| format!("Failed to open gate at {}", state_dir.display()))
}

/// Parse an optional JSON object argument
pub(crate) fn parse_object(raw: Option<&str>, what: &str) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw).with_context(|| format!("Invalid {} JSON", what))? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("{} must be a JSON object, got {}", what, other),
    }
}

pub(crate) fn print_flush_report(report: &FlushReport) {
    if let Some(reason) = report.skipped {
        println!("{} Flush skipped: {}", "=>".bright_yellow(), reason);
        return;
    }

    let status = if report.error.is_some() {
        "=>".bright_red()
    } else {
        "=>".bright_green()
    };
    println!(
        "{} Flushed {} item(s): {} accepted, {} failed, {} dropped, {} remaining",
        status,
        report.attempted,
        report.accepted.to_string().green(),
        report.failed,
        report.dropped,
        report.remaining
    );
    if let Some(error) = &report.error {
        println!("   Error: {}", error.red());
    }
}
