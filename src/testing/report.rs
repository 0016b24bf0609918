//! Per-scenario verdicts and the aggregated run report

use std::collections::BTreeMap;
use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::common::{Error, Result};

/// Verdict of one scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
    /// Not run because an input it depends on was never produced
    Skipped,
}

/// Result of a scenario run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub suite: String,
    pub name: String,
    pub verdict: Verdict,
    pub steps_run: usize,
    pub steps_total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Values captured for later scenarios
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub captures: BTreeMap<String, String>,
    pub duration_ms: u64,
}

impl ScenarioResult {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }

    /// Attach a failure to the result
    pub fn fail(&mut self, error: &Error) {
        self.verdict = Verdict::Failed;
        self.error_kind = Some(error.kind());
        self.error = Some(error.to_string());
    }
}

/// Aggregated results of a run
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub scenarios: Vec<ScenarioResult>,
}

impl RunReport {
    pub fn push(&mut self, result: ScenarioResult) {
        match result.verdict {
            Verdict::Passed => self.passed += 1,
            Verdict::Failed => self.failed += 1,
            Verdict::Skipped => self.skipped += 1,
        }
        self.scenarios.push(result);
    }

    /// Whether every scenario that ran passed and nothing was skipped
    pub fn success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    /// Print the end-of-run summary
    pub fn print_summary(&self) {
        println!("\n{}", "Summary:".cyan().bold());
        for result in &self.scenarios {
            let marker = match result.verdict {
                Verdict::Passed => "✓".green(),
                Verdict::Failed => "✗".red(),
                Verdict::Skipped => "-".yellow(),
            };
            println!("  {} {} {}", marker, result.suite.dimmed(), result.name);
            if let Some(error) = &result.error {
                println!("      {}", error.dimmed());
            }
        }

        let line = format!(
            "{} passed, {} failed, {} skipped ({:.1}s)",
            self.passed,
            self.failed,
            self.skipped,
            self.duration_ms as f64 / 1000.0
        );
        if self.success() {
            println!("\n{}\n", line.green().bold());
        } else {
            println!("\n{}\n", line.red().bold());
        }
    }

    /// Write the report as JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Run report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, verdict: Verdict) -> ScenarioResult {
        ScenarioResult {
            suite: "suite".to_string(),
            name: name.to_string(),
            verdict,
            steps_run: 1,
            steps_total: 1,
            error_kind: None,
            error: None,
            captures: BTreeMap::new(),
            duration_ms: 5,
        }
    }

    #[test]
    fn test_counts_and_success() {
        let mut report = RunReport::default();
        report.push(result("a", Verdict::Passed));
        assert!(report.success());

        let mut failed = result("b", Verdict::Passed);
        failed.fail(&Error::timeout(5, "heading"));
        report.push(failed);
        report.push(result("c", Verdict::Skipped));

        assert_eq!((report.passed, report.failed, report.skipped), (1, 1, 1));
        assert!(!report.success());
        assert_eq!(report.scenarios[1].error_kind, Some("timeout"));
    }

    #[test]
    fn test_write_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut report = RunReport::default();
        report.push(result("a", Verdict::Passed));
        report.write_json(&path).unwrap();

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["passed"], 1);
        assert_eq!(written["scenarios"][0]["verdict"], "passed");
        assert!(written["scenarios"][0].get("error").is_none());
    }
}
