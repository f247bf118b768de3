// ABOUTME: Entry point for the flotilla CLI application.
// ABOUTME: Parses arguments and dispatches to the command handlers.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use flotilla::commands;
use flotilla::config;
use flotilla::error::Result;
use flotilla::output::{Output, OutputMode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = output_mode(&cli.command);
    if let Err(e) = run(cli).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

fn output_mode(command: &Commands) -> OutputMode {
    match command {
        Commands::Install { json: true, .. } | Commands::Environments { json: true, .. } => {
            OutputMode::Json
        }
        Commands::Install { quiet: true, .. } => OutputMode::Quiet,
        _ => OutputMode::Normal,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mode = output_mode(&cli.command);
    match cli.command {
        Commands::Init { target, force } => {
            let cwd = std::env::current_dir()?;
            config::init_config(&cwd, target.as_deref(), force)?;
            Output::new(mode).success(&format!("Wrote {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Install { config, .. } => commands::install(config.as_deref(), mode).await,
        Commands::Environments { config, .. } => {
            commands::list_environments(config.as_deref(), &Output::new(mode))
        }
        Commands::Forget { name, config } => {
            commands::forget(&name, config.as_deref(), &Output::new(mode))
        }
    }
}
