//! ITSM Harness - end-to-end verification for hosted ITSM instances
//!
//! This library runs declarative scenarios against a live instance, through
//! its REST table API and through a real browser driven over WebDriver, and
//! reports a pass/fail verdict per scenario.

pub mod api;
pub mod cli;
pub mod commands;
pub mod common;
pub mod testing;
pub mod webdriver;

// Re-export commonly used types for tests
pub use common::{Error, Result, RunConfig, Settings};
pub use testing::{Harness, RunReport, Suite, Verdict};
