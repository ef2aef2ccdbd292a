//! peerchat terminal client entry point.
//!
//! Binary name: `pchat`
//!
//! Parses CLI arguments, loads configuration and the roster, then dispatches
//! to the roster listing or the interactive chat loop.

mod cli;
mod state;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,peerchat=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let state = AppState::init(!cli.offline).await?;

    match cli.command {
        Commands::Roster(args) => {
            cli::roster::list_roster(&state, args, cli.json)?;
        }

        Commands::Chat {
            persona,
            nickname,
            ephemeral,
        } => {
            let options = cli::chat::ChatOptions {
                nickname,
                persona,
                vip: cli.vip,
                ephemeral,
            };
            cli::chat::run(&state, options).await?;
        }

        Commands::Config => {
            cli::config::show_config(&state, cli.json)?;
        }
    }

    Ok(())
}
