//! intel-gate command-line entry point

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{commands, Cli, Commands};
use intel_gate::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.quiet || cli.global.json);

    match &cli.command {
        Commands::Emit(args) => commands::emit::execute(args, &cli.global).await,
        Commands::Flush(args) => commands::flush::execute(args, &cli.global).await,
        Commands::Stats => commands::stats::execute(&cli.global).await,
        Commands::Policy => commands::policy::execute(&cli.global).await,
        Commands::Run(args) => commands::run::execute(args, &cli.global).await,
    }
}
