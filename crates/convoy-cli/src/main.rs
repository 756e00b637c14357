use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use convoy_core::{ConvoyConfig, LogConfig};

use crate::commands::OutputFormat;

mod commands;

#[derive(Parser)]
#[command(
    name = "convoy",
    about = "Convoy — deployment reconciliation and placement",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Process configuration (convoy.toml). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan one reconciliation pass of a deployment manifest.
    ///
    /// Prints the instance plans of every job in rollout order, the
    /// update batches, and the instances to delete. Stored state is read
    /// but never written.
    Plan {
        /// Deployment manifest (TOML)
        #[arg(short, long)]
        manifest: PathBuf,
        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Plan a deployment manifest and commit the result to the state store.
    Apply {
        /// Deployment manifest (TOML)
        #[arg(short, long)]
        manifest: PathBuf,
        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConvoyConfig::from_file(path)?,
        None => ConvoyConfig::default(),
    };
    init_tracing(&config.log)?;

    match cli.command {
        Commands::Plan { manifest, format } => {
            commands::plan::plan(&manifest, config, format).await
        }
        Commands::Apply { manifest, format } => {
            commands::apply::apply(&manifest, config, format).await
        }
    }
}

fn init_tracing(log: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log.filter))?;
    if log.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}
