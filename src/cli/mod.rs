//! CLI command handling
//!
//! Loads configuration, dispatches commands to the harness and formats output.

use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::commands::Commands;
use crate::common::config::load_env_file;
use crate::common::paths::DEFAULT_ENV_FILE;
use crate::common::{Result, RunConfig, Settings};
use crate::testing::{validate_inputs, Harness, Suite};

/// Options shared by every command
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub verbose: bool,
}

/// Dispatch a CLI command
///
/// Returns whether the command succeeded; configuration problems come back as
/// errors so the caller can tell them apart from failed scenarios.
pub async fn dispatch(command: Commands, options: &GlobalOptions) -> Result<bool> {
    match command {
        Commands::Run {
            suites,
            filter,
            report,
        } => {
            // Everything that can be checked offline is checked before the first request
            let suites = load_suites(&suites)?;
            let config = load_run_config(options)?;
            let settings = Settings::load(options.config.as_deref())?;

            let mut harness = Harness::open(config, settings, options.verbose)?;
            let outcome = harness.run(&suites, filter.as_deref()).await;
            harness.close().await;
            let run_report = outcome?;

            run_report.print_summary();
            if let Some(path) = report {
                run_report.write_json(&path)?;
            }
            Ok(run_report.success())
        }

        Commands::List { suites } => {
            let suites = load_suites(&suites)?;
            for suite in &suites {
                println!("{}", suite.suite.white().bold());
                for scenario in &suite.scenarios {
                    let ui = if scenario.needs_browser() { " [ui]" } else { "" };
                    match &scenario.description {
                        Some(desc) => println!("  {}{} - {}", scenario.name, ui.dimmed(), desc.dimmed()),
                        None => println!("  {}{}", scenario.name, ui.dimmed()),
                    }
                }
            }
            Ok(true)
        }

        Commands::Check => {
            let config = load_run_config(options)?;
            let settings = Settings::load(options.config.as_deref())?;
            settings.validate()?;
            let driver = settings.webdriver.resolve_driver()?;

            println!("{} {}", "Instance:".cyan(), config.base_url());
            println!("{} {}", "User:".cyan(), config.username());
            println!(
                "{} {} ({}{})",
                "WebDriver:".cyan(),
                settings.webdriver.url,
                settings.webdriver.browser.name(),
                if settings.webdriver.headless { ", headless" } else { "" }
            );
            if let Some(path) = driver {
                println!("{} {}", "Driver:".cyan(), path.display());
            }
            println!("{}", "Configuration OK".green().bold());
            Ok(true)
        }
    }
}

/// Load the environment file, then read the run config from the environment
fn load_run_config(options: &GlobalOptions) -> Result<RunConfig> {
    match &options.env_file {
        Some(path) => load_env_file(path, true)?,
        None => load_env_file(Path::new(DEFAULT_ENV_FILE), false)?,
    }
    RunConfig::from_env()
}

/// Load every suite and check cross-suite input wiring
fn load_suites(paths: &[PathBuf]) -> Result<Vec<Suite>> {
    let suites = paths
        .iter()
        .map(|p| Suite::load(p))
        .collect::<Result<Vec<_>>>()?;
    validate_inputs(&suites)?;
    Ok(suites)
}
