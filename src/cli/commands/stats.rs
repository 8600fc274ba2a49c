//! Stats command
//!
//! Prints the persisted queue and the effective gate state.

use super::open_gate;
use crate::cli::GlobalArgs;
use anyhow::Result;
use colored::Colorize;
use intel_gate::gate::GateStats;

pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let gate = open_gate(global.gate_config()).await?;
    let stats = gate.stats().await;

    if global.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats);
    }
    Ok(())
}

fn print_stats(stats: &GateStats) {
    println!("\n=== Intel Gate ===\n");
    println!("  Session:     {}", stats.session_id.cyan());
    println!("  Endpoint:    {}", stats.endpoint);
    println!("  Power mode:  {}", stats.power_mode.to_string().bold());
    println!(
        "  Online:      {}",
        if stats.online { "yes".green() } else { "no".yellow() }
    );
    println!("  Rejections:  {}", stats.rejections);
    println!("  Rate-limit keys: {}", stats.rate_limit_keys);

    let queue = &stats.queue;
    println!("\n  Queue");
    println!("    Pending:   {} ({} due)", queue.pending, queue.due);
    for (class, count) in &queue.pending_by_class {
        println!("      {:<22} {}", class.to_string(), count);
    }
    println!("    Accepted:  {}", queue.total_accepted);
    println!("    Dropped:   {}", queue.total_dropped);
    println!(
        "    Durable:   {}",
        if queue.durable { "yes".green() } else { "no".red() }
    );
    if let Some(at) = queue.last_flush_at {
        println!("    Last flush: {}", at.to_rfc3339());
    }
    if let Some(error) = &queue.last_flush_error {
        println!("    Last flush error:   {}", error.red());
    }
    if let Some(error) = &queue.last_persist_error {
        println!("    Last persist error: {}", error.red());
    }
    println!();
}
