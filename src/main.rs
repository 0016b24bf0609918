//! ITSM Harness - end-to-end verification for hosted ITSM instances
//!
//! Runs YAML scenario suites against an instance through its REST API and a
//! WebDriver-controlled browser.

use std::path::PathBuf;

use clap::Parser;
use commands::Commands;
use itsm_harness::{cli, commands, common::logging};

/// Exit code when a scenario failed or was skipped
const EXIT_FAILED: i32 = 1;
/// Exit code when the run could not start
const EXIT_CONFIG: i32 = 2;

#[derive(Parser)]
#[command(name = "itsm-harness", about = "End-to-end verification for hosted ITSM instances")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Environment file to load before reading SERVICENOW_* variables
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init_cli(cli.verbose, cli.log_file.as_deref());

    let options = cli::GlobalOptions {
        config: cli.config,
        env_file: cli.env_file,
        verbose: cli.verbose,
    };

    match cli::dispatch(cli.command, &options).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_FAILED),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(if e.is_run_fatal() { EXIT_CONFIG } else { EXIT_FAILED });
        }
    }
}
