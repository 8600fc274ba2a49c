//! Flush command

use super::{open_gate, print_flush_report};
use crate::cli::{FlushArgs, GlobalArgs};
use anyhow::Result;

pub async fn execute(args: &FlushArgs, global: &GlobalArgs) -> Result<()> {
    let gate = open_gate(global.gate_config()).await?;
    let report = gate.flush(args.force).await;

    if global.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_flush_report(&report);
    }
    Ok(())
}
