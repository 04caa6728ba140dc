//! Porchlight CLI - headless doorbell monitor
//!
//! Features:
//! - Local ffmpeg-backed cameras declared in a JSON config
//! - Doorbell and motion triggers read from stdin
//! - Display notifications written to stdout as JSON lines
//! - Config validation without starting a monitor

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod local;
mod output;

/// Porchlight CLI - doorbell live-session monitor
#[derive(Parser)]
#[command(name = "porchlight")]
#[command(version)]
#[command(about = "Start bounded live video sessions on doorbell presses and motion", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Base directory for video output and the credential file
    #[arg(short, long, global = true, default_value = ".")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor cameras and stream on triggers
    Run {
        /// Path to the JSON config file
        config: PathBuf,

        /// Start sessions on new motion too
        #[arg(long)]
        motion: bool,

        /// Override ringMinutesToStreamVideo
        #[arg(short, long)]
        minutes: Option<f64>,
    },

    /// Validate a config file and show the effective settings
    Check {
        /// Path to the JSON config file
        config: PathBuf,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Run { config, motion, minutes } => {
            let overrides = commands::Overrides {
                motion: motion.then_some(true),
                minutes,
            };
            commands::run(&config, cli.base_dir, &overrides).await?;
        }
        Commands::Check { config } => {
            commands::check(&config, &cli.base_dir, &commands::Overrides::default())?;
        }
    }

    Ok(())
}
