//! Scenario runner
//!
//! Executes scenarios against the instance: API steps through the shared
//! [`ApiSession`], UI steps through a per-scenario [`BrowserSession`]. A failing
//! scenario records its verdict and the run moves on; the browser session is
//! released on every exit path.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use colored::Colorize;

use crate::api::result::{display_value, field};
use crate::api::ApiSession;
use crate::common::{Error, Result, RunConfig, Settings};
use crate::webdriver::{is_stale, BrowserSession, DriverProcess, ElementRef, Found, Locator};

use super::assert::{check_response, check_text};
use super::config::{validate_inputs, Action, Pattern, RequestStep, Scenario, Step, Suite};
use super::report::{RunReport, ScenarioResult, Verdict};
use super::vars::Vars;

/// Slack on top of a step's own deadline before the hard timeout fires
const STEP_GRACE: Duration = Duration::from_secs(1);

/// Values captured by finished scenarios, keyed by scenario name
#[derive(Debug, Default)]
pub struct Outputs {
    by_scenario: BTreeMap<String, BTreeMap<String, String>>,
}

impl Outputs {
    pub fn get(&self, scenario: &str, value: &str) -> Option<&String> {
        self.by_scenario.get(scenario).and_then(|values| values.get(value))
    }

    pub fn record(&mut self, scenario: &str, values: BTreeMap<String, String>) {
        self.by_scenario.insert(scenario.to_string(), values);
    }
}

/// Values a scenario sees while it runs
#[derive(Default)]
struct ScenarioValues {
    inputs: BTreeMap<String, String>,
    captures: BTreeMap<String, String>,
}

/// Executes scenarios and aggregates verdicts
pub struct Harness {
    config: RunConfig,
    settings: Settings,
    api: ApiSession,
    driver: Option<DriverProcess>,
    verbose: bool,
}

impl Harness {
    /// Open the run's API session; the browser side is opened on demand
    pub fn open(config: RunConfig, settings: Settings, verbose: bool) -> Result<Self> {
        settings.validate()?;
        let api = ApiSession::new(&config, Duration::from_secs(settings.timeouts.request_secs))?;
        tracing::info!(base_url = %config.base_url(), user = config.username(), "Harness session opened");
        Ok(Self {
            config,
            settings,
            api,
            driver: None,
            verbose,
        })
    }

    /// Run suites in order
    ///
    /// Only configuration problems (bad input wiring, a filter that selects
    /// nothing) are returned as errors; scenario failures are recorded in the
    /// report.
    pub async fn run(&mut self, suites: &[Suite], filter: Option<&str>) -> Result<RunReport> {
        validate_inputs(suites)?;
        if let Some(f) = filter {
            if !suites.iter().flat_map(|s| &s.scenarios).any(|s| s.name.contains(f)) {
                return Err(Error::Config(format!("No scenario name contains '{}'", f)));
            }
        }

        let started = Instant::now();
        let mut report = RunReport::default();
        let mut outputs = Outputs::default();

        for suite in suites {
            let selected: Vec<&Scenario> = suite
                .scenarios
                .iter()
                .filter(|s| filter.map_or(true, |f| s.name.contains(f)))
                .collect();
            if selected.is_empty() {
                continue;
            }

            println!(
                "\n{} {}",
                "Running Suite:".blue().bold(),
                suite.suite.white().bold()
            );
            if let Some(desc) = &suite.description {
                println!("  {}", desc.dimmed());
            }

            for scenario in selected {
                let result = self.run_scenario(&suite.suite, scenario, &outputs).await;
                if result.passed() {
                    outputs.record(&scenario.name, result.captures.clone());
                }
                report.push(result);
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Run one scenario to a verdict
    pub async fn run_scenario(&mut self, suite: &str, scenario: &Scenario, outputs: &Outputs) -> ScenarioResult {
        let started = Instant::now();
        let steps_total = scenario.setup.len() + scenario.steps.len();
        let mut result = ScenarioResult {
            suite: suite.to_string(),
            name: scenario.name.clone(),
            verdict: Verdict::Passed,
            steps_run: 0,
            steps_total,
            error_kind: None,
            error: None,
            captures: BTreeMap::new(),
            duration_ms: 0,
        };

        println!("\n{} {}", "Scenario:".cyan(), scenario.name.white().bold());
        if let Some(desc) = &scenario.description {
            println!("  {}", desc.dimmed());
        }

        let mut values = ScenarioValues::default();
        for input in &scenario.inputs {
            match outputs.get(&input.from, &input.value) {
                Some(value) => {
                    values.inputs.insert(input.local_name().to_string(), value.clone());
                }
                None => {
                    let reason = format!("input '{}' from '{}' was not produced", input.value, input.from);
                    println!("  {} skipped: {}", "-".yellow(), reason);
                    tracing::warn!(scenario = %scenario.name, %reason, "Scenario skipped");
                    result.verdict = Verdict::Skipped;
                    result.error = Some(reason);
                    return result;
                }
            }
        }

        let mut browser: Option<BrowserSession> = None;
        let phases = [("Setup", &scenario.setup), ("Steps", &scenario.steps)];
        let mut step_num = 0;

        'phases: for (phase, steps) in phases {
            if steps.is_empty() {
                continue;
            }
            if self.verbose || phase == "Setup" {
                println!("  {}", format!("{}:", phase).cyan());
            }
            for step in steps {
                step_num += 1;
                result.steps_run = step_num;
                let label = step.action.label();

                match self.run_step(&mut browser, &mut values, step).await {
                    Ok(detail) => {
                        println!("  {} Step {}: {}", "✓".green(), step_num, detail.dimmed());
                    }
                    Err(e) if step.best_effort => {
                        tracing::warn!(scenario = %scenario.name, step = step_num, error = %e, "Best-effort step failed");
                        println!(
                            "  {} Step {}: {} {}",
                            "~".yellow(),
                            step_num,
                            label.dimmed(),
                            format!("(ignored: {})", e).yellow()
                        );
                    }
                    Err(e) => {
                        println!("  {} Step {}: {}", "✗".red(), step_num, e);
                        tracing::debug!(scenario = %scenario.name, step = step_num, kind = e.kind(), "Step failed");
                        result.fail(&e);
                        break 'phases;
                    }
                }
            }
        }

        // Cleanup: release the browser whatever the verdict
        if let Some(session) = browser.take() {
            if let Err(e) = session.close().await {
                tracing::warn!(scenario = %scenario.name, error = %e, "Failed to close browser session");
            }
        }

        result.captures = values.captures;
        result.duration_ms = started.elapsed().as_millis() as u64;

        if result.passed() {
            println!("  {} {}", "✓".green().bold(), "Passed".green().bold());
        } else {
            println!("  {} {}", "✗".red().bold(), "Failed".red().bold());
        }
        result
    }

    /// Run a step under its time bound
    ///
    /// A UI step's browser session is opened outside the step's time bound,
    /// bounded by the request timeout instead.
    async fn run_step(
        &mut self,
        browser: &mut Option<BrowserSession>,
        values: &mut ScenarioValues,
        step: &Step,
    ) -> Result<String> {
        if step.action.is_ui() {
            self.ensure_browser(browser).await?;
        }
        let browser = browser.as_ref();

        let secs = step.timeout.unwrap_or(self.settings.timeouts.step_secs);
        let deadline = Instant::now() + Duration::from_secs(secs);

        match tokio::time::timeout(
            Duration::from_secs(secs) + STEP_GRACE,
            self.execute_step(browser, values, &step.action, deadline, secs),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::timeout(secs, step.action.label())),
        }
    }

    /// Execute a single step
    async fn execute_step(
        &self,
        browser: Option<&BrowserSession>,
        values: &mut ScenarioValues,
        action: &Action,
        deadline: Instant,
        secs: u64,
    ) -> Result<String> {
        if let Action::Request(request) = action {
            return self.execute_request_step(values, request).await;
        }

        let browser = browser.ok_or_else(|| Error::Internal("browser session not available".to_string()))?;
        let vars = Vars {
            config: &self.config,
            inputs: &values.inputs,
            captures: &values.captures,
        };
        let poll = Poll {
            browser,
            deadline,
            secs,
            interval: Duration::from_millis(self.settings.timeouts.poll_interval_ms),
        };

        match action {
            Action::Navigate { url } => {
                let target = match url {
                    Some(url) => self.config.resolve(&vars.interpolate(url)?)?,
                    None => self.config.base_url().clone(),
                };
                browser.navigate(&target).await?;
                Ok(format!("navigate {}", target))
            }
            Action::Fill { locator, value } => {
                let element = poll.element(locator).await?;
                browser.clear(&element).await?;
                browser.send_keys(&element, &vars.interpolate(value)?).await?;
                Ok(action.label())
            }
            Action::Click { locator } => {
                let element = poll.element(locator).await?;
                browser.click(&element).await?;
                Ok(action.label())
            }
            Action::SwitchFrame { locator } => {
                match locator {
                    Some(locator) => {
                        let frame = poll.element(locator).await?;
                        browser.switch_to_frame(Some(&frame)).await?;
                    }
                    None => browser.switch_to_frame(None).await?,
                }
                Ok(action.label())
            }
            Action::ExpectTitle(_)
            | Action::ExpectUrl(_)
            | Action::ExpectVisible { .. }
            | Action::ExpectAttribute { .. } => {
                poll.expectation(action, &vars).await?;
                Ok(action.label())
            }
            Action::ExpectRejected { error, not_url } => {
                poll.rejection(error, not_url).await?;
                Ok(action.label())
            }
            Action::Request(_) => Err(Error::Internal("request step routed to browser".to_string())),
        }
    }

    /// Execute a REST step, capturing values on success
    async fn execute_request_step(&self, values: &mut ScenarioValues, request: &RequestStep) -> Result<String> {
        let vars = Vars {
            config: &self.config,
            inputs: &values.inputs,
            captures: &values.captures,
        };

        let path = vars.interpolate(&request.path)?;
        let query = request
            .query
            .iter()
            .map(|(k, v)| Ok((k.clone(), vars.interpolate(&display_value(v))?)))
            .collect::<Result<Vec<_>>>()?;
        let body = request.body.as_ref().map(|b| vars.interpolate_json(b)).transpose()?;

        let response = self
            .api
            .send(request.method.to_reqwest(), &path, &query, body.as_ref())
            .await?;
        check_response(&response, &request.expect, &vars)?;

        let records = response.records();
        let mut captured = Vec::new();
        if !request.capture.is_empty() {
            let first = records.first().ok_or_else(|| {
                Error::assertion(
                    format!("{} {} capture", response.method, response.url),
                    "at least one record",
                    "none",
                )
            })?;
            for (name, path) in &request.capture {
                let value = field(first, path).ok_or_else(|| {
                    Error::assertion(format!("capture '{}'", name), format!("field '{}'", path), "missing")
                })?;
                captured.push((name.clone(), display_value(value)));
            }
        }

        for (name, value) in captured {
            tracing::debug!(name = %name, value = %value, "Captured value");
            values.captures.insert(name, value);
        }

        Ok(format!(
            "{} {} → {} ({} records)",
            response.method,
            response.url,
            response.status,
            records.len()
        ))
    }

    /// Open the scenario's browser session (and start the driver) on first use
    async fn ensure_browser(&mut self, slot: &mut Option<BrowserSession>) -> Result<()> {
        if slot.is_some() {
            return Ok(());
        }
        if self.driver.is_none() {
            if let Some(path) = self.settings.webdriver.resolve_driver()? {
                self.driver = Some(DriverProcess::spawn(&path, &self.settings.webdriver.url).await?);
            }
        }
        let session = BrowserSession::open(
            &self.settings.webdriver,
            Duration::from_secs(self.settings.timeouts.request_secs),
        )
        .await?;
        *slot = Some(session);
        Ok(())
    }

    /// Release run-level resources
    pub async fn close(self) {
        if let Some(driver) = self.driver {
            if let Err(e) = driver.shutdown().await {
                tracing::warn!(error = %e, "Failed to stop WebDriver server");
            }
        }
        tracing::debug!("Harness session closed");
    }
}

/// Bounded polling of UI state
struct Poll<'a> {
    browser: &'a BrowserSession,
    deadline: Instant,
    secs: u64,
    interval: Duration,
}

impl Poll<'_> {
    /// Wait until `deadline` for an element to exist
    async fn element(&self, locator: &Locator) -> Result<ElementRef> {
        loop {
            if let Found::Element(element) = self.browser.find(locator).await? {
                return Ok(element);
            }
            if Instant::now() + self.interval >= self.deadline {
                return Err(Error::timeout(self.secs, format!("{} to appear", locator)));
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Retry an expectation until it holds or the deadline passes
    ///
    /// At the deadline a value mismatch is reported as an assertion failure
    /// with both values; an element that never showed up is a timeout.
    async fn expectation(&self, action: &Action, vars: &Vars<'_>) -> Result<()> {
        loop {
            let last = match self.observe(action, vars).await {
                Ok(()) => return Ok(()),
                Err(e) if is_retryable(&e) => e,
                Err(e) => return Err(e),
            };
            if Instant::now() + self.interval >= self.deadline {
                return Err(match (action, last) {
                    (Action::ExpectVisible { .. }, last) => {
                        Error::timeout(self.secs, format!("{} ({})", action.label(), last))
                    }
                    (_, last @ Error::Assertion { .. }) => last,
                    (_, last) => Error::timeout(self.secs, format!("{} ({})", action.label(), last)),
                });
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Wait for the UI to turn an action down
    ///
    /// Reaching a URL that matches `not_url` means the action was accepted,
    /// which is reported as soon as it's seen.
    async fn rejection(&self, error: &Locator, not_url: &Pattern) -> Result<()> {
        loop {
            let url = self.browser.current_url().await?;
            if not_url.0.is_match(&url) {
                return Err(Error::ExpectedFailureMismatch {
                    subject: format!("rejection ({})", error),
                    expected: format!("the error shown and the URL not matching /{}/", not_url.0.as_str()),
                    observed: format!("accepted, now at '{}'", url),
                });
            }
            if let Found::Element(element) = self.browser.find(error).await? {
                match self.browser.is_displayed(&element).await {
                    Ok(true) => return Ok(()),
                    Ok(false) => {}
                    Err(e) if is_stale(&e) => {}
                    Err(e) => return Err(e),
                }
            }
            if Instant::now() + self.interval >= self.deadline {
                return Err(Error::timeout(self.secs, format!("rejection message {}", error)));
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One attempt at an expectation
    async fn observe(&self, action: &Action, vars: &Vars<'_>) -> Result<()> {
        match action {
            Action::ExpectTitle(expect) => {
                let title = self.browser.title().await?;
                check_text("title", expect, &title, vars)
            }
            Action::ExpectUrl(expect) => {
                let url = self.browser.current_url().await?;
                check_text("url", expect, &url, vars)
            }
            Action::ExpectVisible { locator } => match self.browser.find(locator).await? {
                Found::Element(element) => {
                    if self.browser.is_displayed(&element).await? {
                        Ok(())
                    } else {
                        Err(Error::assertion(locator.to_string(), "visible", "hidden"))
                    }
                }
                Found::Missing => Err(Error::assertion(locator.to_string(), "visible", "missing")),
            },
            Action::ExpectAttribute { locator, name, equals } => {
                let element = match self.browser.find(locator).await? {
                    Found::Element(element) => element,
                    Found::Missing => {
                        return Err(Error::webdriver("find element", format!("no element matches {}", locator)))
                    }
                };
                let expected = vars.interpolate(equals)?;
                let observed = self.browser.attribute(&element, name).await?;
                if observed.as_deref() == Some(expected.as_str()) {
                    Ok(())
                } else {
                    Err(Error::assertion(
                        format!("{} attribute '{}'", locator, name),
                        format!("'{}'", expected),
                        observed.map_or_else(|| "no attribute".to_string(), |v| format!("'{}'", v)),
                    ))
                }
            }
            _ => Err(Error::Internal(format!("'{}' is not an expectation", action.label()))),
        }
    }
}

/// Errors worth another poll: mismatches, missing or stale elements
fn is_retryable(error: &Error) -> bool {
    match error {
        Error::Assertion { .. } => true,
        Error::WebDriver { command, .. } if command == "find element" => true,
        other => is_stale(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outputs_lookup() {
        let mut outputs = Outputs::default();
        assert!(outputs.get("create incident", "number").is_none());
        outputs.record(
            "create incident",
            BTreeMap::from([("number".to_string(), "INC0010001".to_string())]),
        );
        assert_eq!(outputs.get("create incident", "number").map(String::as_str), Some("INC0010001"));
        assert!(outputs.get("create incident", "sys_id").is_none());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable(&Error::assertion("url", "a", "b")));
        assert!(is_retryable(&Error::webdriver("find element", "no element matches text 'x'")));
        assert!(is_retryable(&Error::webdriver("get element text", "stale element reference: gone")));
        assert!(!is_retryable(&Error::webdriver("navigate", "unknown error: net::ERR_NAME_NOT_RESOLVED")));
        assert!(!is_retryable(&Error::Config("x".to_string())));
    }
}
