//! kubescaled — the KubeScale daemon.
//!
//! Single binary that assembles the control plane:
//! - Platform (state, reconciler, cluster link)
//! - Reconcile timer
//! - Optional prediction feed timer
//! - REST API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! kubescaled run --config kubescale.toml --port 8080
//! kubescaled check-config kubescale.toml
//! ```

mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use daemon::RunArgs;

const DEFAULT_LOG_FILTER: &str = "info,kubescale=debug";

#[derive(Parser)]
#[command(name = "kubescaled", about = "KubeScale autoscaling daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane and serve the API.
    Run(RunArgs),

    /// Validate a config file and print the effective values.
    CheckConfig {
        /// Path to kubescale.toml.
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run(args) => daemon::run(args).await,
        Command::CheckConfig { path } => {
            let config = kubescale_core::ScaleConfig::from_file(&path)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
