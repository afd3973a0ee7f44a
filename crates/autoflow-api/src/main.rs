//! Autoflow CLI entry point.
//!
//! Binary name: `aflow`
//!
//! Parses CLI arguments, sets up tracing, loads configuration and dispatches
//! to the command handlers.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use autoflow_observe::tracing_setup::{init_tracing, shutdown_tracing, verbosity_filter};
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(verbosity_filter(cli.verbose, cli.quiet), cli.otel) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let succeeded = match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "aflow", &mut std::io::stdout());
            true
        }

        Commands::Run { file } => {
            let state = AppState::init().await?;
            cli::run::run_workflow(&state, &file, cli.json, !cli.quiet).await?
        }

        Commands::Config => {
            let state = AppState::init().await?;
            cli::config::show_config(&state, cli.json)?;
            true
        }
    };

    shutdown_tracing();

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
