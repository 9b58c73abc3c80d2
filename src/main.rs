//! infra-harness - apply/validate/destroy test runner for Terraform modules
//!
//! Scenarios are declared in YAML; each one is applied with terraform, its
//! outputs are checked, and it is always destroyed afterwards.

use std::path::PathBuf;

use clap::Parser;
use infra_harness::common::{config::Config, logging};
use infra_harness::{cli, commands::Commands};

#[derive(Parser)]
#[command(name = "infra-harness", about = "Terraform module test harness")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: platform config dir / config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Also write logs to the harness log file
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(path) = logging::init(cli.verbose, cli.log_file) {
        tracing::debug!(path = %path.display(), "Logging to file");
    }

    let result = match Config::load(cli.config.as_deref()) {
        Ok(config) => cli::dispatch(cli.command, &config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
