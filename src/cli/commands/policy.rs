//! Policy command
//!
//! Resolves the effective policy from the golden record, power mode and
//! endpoint override without touching the state directory.

use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use colored::Colorize;
use intel_gate::policy::{resolve_policy, Policy};

pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let config = global.gate_config();
    let golden = config
        .load_golden_record()
        .context("Failed to load golden record")?;
    let policy = resolve_policy(golden.as_ref(), config.power_mode, config.endpoint.as_deref());

    if global.json {
        println!("{}", serde_json::to_string_pretty(&policy)?);
    } else {
        print_policy(&policy);
    }
    Ok(())
}

fn print_policy(policy: &Policy) {
    println!("\n=== Effective Policy ===\n");
    println!("  Endpoint:        {}", policy.endpoint.cyan());
    println!("  Power mode:      {}", policy.power_mode.to_string().bold());
    println!("  Flush interval:  {} ms", policy.flush_interval_ms);
    println!("  Batch size:      {}", policy.batch_size);
    println!("  Max queue:       {}", policy.max_queue_entries);
    if policy.drops_noncritical() {
        println!("  {}", "Non-critical events are dropped".yellow());
    }

    println!(
        "\n  {:<22} {:>4} {:>6} {:>8} {:<12} {:>7} {:>6}",
        "class", "tier", "tries", "base ms", "backoff", "persist", "notify"
    );
    for (class, tier) in &policy.priority_tiers {
        let strategy = policy.strategy_for(*class);
        println!(
            "  {:<22} {:>4} {:>6} {:>8} {:<12} {:>7} {:>6}",
            class.to_string(),
            tier,
            strategy.max_retry_attempts,
            strategy.retry_backoff_ms,
            strategy.backoff_type.to_string(),
            strategy.persist_to_local_storage,
            strategy.notify_user_on_failure
        );
    }
    println!();
}
