//! Run command
//!
//! Long-running mode: reads one JSON object per line from stdin,
//!
//! ```json
//! {"event": "context.update", "payload": {"zone_id": "z1", "risk_score": 40}, "meta": {}}
//! ```
//!
//! admits each through the gate and lets the flush scheduler deliver in the
//! background. Stops at end of input or Ctrl-C, then runs a final forced
//! flush.

use super::{open_gate, print_flush_report};
use crate::cli::{GlobalArgs, RunArgs};
use anyhow::{Context, Result};
use colored::Colorize;
use intel_gate::IntelGate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct InputLine {
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    meta: Map<String, Value>,
}

/// Totals printed when the run ends
#[derive(Debug, Default, Serialize)]
struct RunSummary {
    lines: usize,
    queued: usize,
    malformed: usize,
    rejected: BTreeMap<String, usize>,
}

pub async fn execute(args: &RunArgs, global: &GlobalArgs) -> Result<()> {
    let gate = open_gate(global.gate_config()).await?;
    let scheduler = gate
        .start_scheduler()
        .context("Failed to start flush scheduler")?;
    info!(session = %gate.session_id(), "Reading events from stdin");

    let mut summary = RunSummary::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => handle_line(&gate, &line, args, global, &mut summary).await,
                    None => break,
                }
            }
        }
    }

    scheduler.shutdown().await;

    let report = if args.no_final_flush {
        None
    } else {
        Some(gate.flush(true).await)
    };
    let stats = gate.stats().await;

    if global.json {
        let body = serde_json::json!({
            "summary": summary,
            "final_flush": report,
            "stats": stats,
            "rejections": gate.rejections(),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("\n=== Run Summary ===\n");
        println!("  Lines:     {}", summary.lines);
        println!("  Queued:    {}", summary.queued.to_string().green());
        println!("  Malformed: {}", summary.malformed);
        for (reason, count) in &summary.rejected {
            println!("  Rejected ({}): {}", reason, count.to_string().red());
        }
        println!("  Pending:   {}", stats.queue.pending);
        if let Some(report) = &report {
            println!();
            print_flush_report(report);
        }
    }
    Ok(())
}

async fn handle_line(
    gate: &IntelGate,
    line: &str,
    args: &RunArgs,
    global: &GlobalArgs,
    summary: &mut RunSummary,
) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    summary.lines += 1;

    let input: InputLine = match serde_json::from_str(line) {
        Ok(input) => input,
        Err(e) => {
            warn!(error = %e, "Skipping malformed input line");
            summary.malformed += 1;
            return;
        }
    };

    match gate.emit(&input.event, input.payload, input.meta).await {
        Ok(receipt) => {
            summary.queued += 1;
            if args.verbose_outcomes && !global.json {
                println!(
                    "{} {} queued as {} ({} pending)",
                    "+".green(),
                    receipt.event_name,
                    receipt.priority_class,
                    receipt.pending
                );
            }
        }
        Err(reason) => {
            *summary.rejected.entry(reason.as_str().to_string()).or_default() += 1;
            if args.verbose_outcomes && !global.json {
                println!("{} {} rejected: {}", "-".red(), input.event, reason);
            }
        }
    }
}
