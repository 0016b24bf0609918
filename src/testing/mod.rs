//! Scenario harness
//!
//! Reads YAML scenario suites and runs them against the instance, through the
//! REST API and through a browser, asserting on structured data (JSON records,
//! element attributes, page URL) rather than scraped page text where possible.

pub mod assert;
mod config;
mod report;
mod runner;
mod vars;

pub use config::*;
pub use report::{RunReport, ScenarioResult, Verdict};
pub use runner::{Harness, Outputs};
pub use vars::Vars;
