//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run scenario suites against the instance
    Run {
        /// Paths to YAML suite files, run in the order given
        #[arg(required = true)]
        suites: Vec<PathBuf>,

        /// Only run scenarios whose name contains this text
        #[arg(long)]
        filter: Option<String>,

        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List the scenarios in suite files without running them
    List {
        /// Paths to YAML suite files
        #[arg(required = true)]
        suites: Vec<PathBuf>,
    },

    /// Validate environment and settings without touching the network
    Check,
}
