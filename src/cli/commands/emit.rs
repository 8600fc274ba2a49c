//! Emit command
//!
//! Admits one event, queues it and optionally flushes. SOS-class events are
//! always flushed: the process exits right after, so no scheduler would pick
//! up the immediate-flush request.

use super::{open_gate, parse_object, print_flush_report};
use crate::cli::{EmitArgs, GlobalArgs};
use anyhow::{Context, Result};
use colored::Colorize;
use intel_gate::queue::FlushReport;
use intel_gate::{IntelGate, PriorityClass, QueuedReceipt, RejectionReason};
use serde_json::{json, Map, Value};
use tracing::info;

pub async fn execute(args: &EmitArgs, global: &GlobalArgs) -> Result<()> {
    let payload: Value = serde_json::from_str(&args.payload).context("Invalid payload JSON")?;
    let mut meta = parse_object(args.meta.as_deref(), "meta")?;
    if let Some(nonce) = &args.nonce {
        meta.insert("nonce".to_string(), Value::from(nonce.as_str()));
    }

    let gate = open_gate(global.gate_config()).await?;
    info!(event = %args.event, "Emitting event");

    let (outcome, report) = emit_and_deliver(&gate, &args.event, payload, meta, args.flush).await;

    if global.json {
        let body = match &outcome {
            Ok(receipt) => json!({ "status": "queued", "receipt": receipt, "flush": report }),
            Err(reason) => json!({ "status": "rejected", "reason": reason }),
        };
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        match &outcome {
            Ok(receipt) => {
                println!(
                    "{} Queued {} ({}) as {}",
                    "=>".bright_green(),
                    receipt.event_name.cyan(),
                    receipt.id,
                    receipt.priority_class.to_string().bold()
                );
                println!("   Pending: {}", receipt.pending);
            }
            Err(reason) => {
                println!("{} Rejected {}: {}", "=>".bright_red(), args.event.cyan(), reason);
            }
        }
        if let Some(report) = &report {
            print_flush_report(report);
        }
    }

    if let Err(reason) = outcome {
        anyhow::bail!("Event rejected: {}", reason.as_str());
    }
    Ok(())
}

/// Emit one event and run the forced pass it calls for
async fn emit_and_deliver(
    gate: &IntelGate,
    event: &str,
    payload: Value,
    meta: Map<String, Value>,
    flush: bool,
) -> (Result<QueuedReceipt, RejectionReason>, Option<FlushReport>) {
    let outcome = gate.emit(event, payload, meta).await;
    let deliver = match &outcome {
        Ok(receipt) => {
            flush || (receipt.priority_class == PriorityClass::SosEvent && !gate.has_scheduler())
        }
        Err(_) => false,
    };

    let report = if deliver {
        Some(gate.flush(true).await)
    } else {
        None
    };
    (outcome, report)
}
