// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flotilla")]
#[command(about = "Provision machines, form a swarm cluster and install the platform")]
#[command(version)]
pub struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a flotilla.yml template in the current directory
    Init {
        /// Target name to put in the template
        #[arg(short, long)]
        target: Option<String>,

        /// Overwrite an existing flotilla.yml
        #[arg(long)]
        force: bool,
    },

    /// Provision machines, form the cluster and install the platform
    Install {
        /// Config file (default: discovered in the current directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Emit JSON lines instead of text
        #[arg(long, conflicts_with = "quiet")]
        json: bool,

        /// Print only the final result
        #[arg(short, long)]
        quiet: bool,
    },

    /// List registered environments
    Environments {
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Remove an environment from the registry so its name can be installed again
    Forget {
        name: String,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
