//! Scenario suite configuration types
//!
//! Defines the data structures for deserializing YAML scenario suites, and the
//! load-time checks that keep broken suites from reaching the network.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::common::{Error, Result};
use crate::webdriver::locator::parse_slash_regex;
use crate::webdriver::Locator;

use super::vars::references;

/// A suite of scenarios loaded from one YAML file
#[derive(Deserialize, Debug)]
pub struct Suite {
    /// Name of the suite
    pub suite: String,
    /// Optional description of what the suite covers
    pub description: Option<String>,
    /// Scenarios, run in file order
    pub scenarios: Vec<Scenario>,
}

/// One independently reported test case
#[derive(Deserialize, Debug)]
pub struct Scenario {
    /// Name of the scenario, unique within a run
    pub name: String,
    /// Optional description of what the scenario verifies
    pub description: Option<String>,
    /// Values produced by earlier scenarios that this one consumes
    #[serde(default)]
    pub inputs: Vec<InputRef>,
    /// API phase run before `steps`, typically creating records
    #[serde(default)]
    pub setup: Vec<Step>,
    /// The sequence of steps to execute
    pub steps: Vec<Step>,
}

/// Reference to a value captured by another scenario
#[derive(Deserialize, Debug, Clone)]
pub struct InputRef {
    /// Name of the producing scenario
    pub from: String,
    /// Name of the captured value in the producer
    pub value: String,
    /// Local name, defaults to `value`
    #[serde(rename = "as")]
    pub alias: Option<String>,
}

impl InputRef {
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.value)
    }
}

/// A single step with its per-step options
#[derive(Deserialize, Debug)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    /// Bound for this step in seconds, defaults to `timeouts.step_secs`
    pub timeout: Option<u64>,
    /// Log and ignore a failure of this step
    #[serde(default)]
    pub best_effort: bool,
}

/// What a step does
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Load a page; relative URLs resolve against the base URL
    Navigate {
        #[serde(default)]
        url: Option<String>,
    },
    /// Clear an input and type a value into it
    Fill { locator: Locator, value: String },
    /// Click an element
    Click { locator: Locator },
    /// Enter an iframe, or go back to the top-level page without a locator
    SwitchFrame {
        #[serde(default)]
        locator: Option<Locator>,
    },
    /// Check the page title
    ExpectTitle(TextExpectation),
    /// Check the current URL
    ExpectUrl(TextExpectation),
    /// Wait for an element to be displayed
    ExpectVisible { locator: Locator },
    /// Check an attribute of an element
    ExpectAttribute {
        locator: Locator,
        name: String,
        equals: String,
    },
    /// The UI turned the last action down: the `error` element shows up while
    /// the URL never matches `not_url`
    ExpectRejected { error: Locator, not_url: Pattern },
    /// Call the REST API
    Request(RequestStep),
}

impl Action {
    /// Whether the step needs a browser session
    pub fn is_ui(&self) -> bool {
        !matches!(self, Action::Request(_))
    }

    /// Element locators the step uses
    pub fn locators(&self) -> Vec<&Locator> {
        match self {
            Action::Fill { locator, .. }
            | Action::Click { locator }
            | Action::ExpectVisible { locator }
            | Action::ExpectAttribute { locator, .. } => vec![locator],
            Action::SwitchFrame { locator } => locator.iter().collect(),
            Action::ExpectRejected { error, .. } => vec![error],
            Action::Navigate { .. } | Action::ExpectTitle(_) | Action::ExpectUrl(_) | Action::Request(_) => Vec::new(),
        }
    }

    /// Short label for progress output
    pub fn label(&self) -> String {
        match self {
            Action::Navigate { url } => format!("navigate {}", url.as_deref().unwrap_or("<base url>")),
            Action::Fill { locator, .. } => format!("fill {}", locator),
            Action::Click { locator } => format!("click {}", locator),
            Action::SwitchFrame { locator: Some(l) } => format!("switch to frame {}", l),
            Action::SwitchFrame { locator: None } => "switch to top-level page".to_string(),
            Action::ExpectTitle(e) => format!("expect title {}", e),
            Action::ExpectUrl(e) => format!("expect url {}", e),
            Action::ExpectVisible { locator } => format!("expect visible {}", locator),
            Action::ExpectAttribute { locator, name, equals } => {
                format!("expect {} [{}='{}']", locator, name, equals)
            }
            Action::ExpectRejected { error, not_url } => {
                format!("expect rejection: {}, url !~ /{}/", error, not_url.0.as_str())
            }
            Action::Request(r) => format!("{} {}", r.method.as_str(), r.path),
        }
    }
}

/// Regular expression written either raw or as `/body/flags`
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct Pattern(pub Regex);

impl TryFrom<String> for Pattern {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match parse_slash_regex(&s) {
            Some(result) => result.map(Pattern),
            None => Regex::new(&s)
                .map(Pattern)
                .map_err(|e| format!("Invalid regex '{}': {}", s, e)),
        }
    }
}

/// Expectations on a piece of text; every field given must hold
#[derive(Deserialize, Debug, Default)]
pub struct TextExpectation {
    /// Exact match
    pub equals: Option<String>,
    /// Substring match
    pub contains: Option<String>,
    /// Regex that must match
    pub matches: Option<Pattern>,
    /// Regex that must not match
    pub not_matches: Option<Pattern>,
}

impl TextExpectation {
    pub fn is_empty(&self) -> bool {
        self.equals.is_none() && self.contains.is_none() && self.matches.is_none() && self.not_matches.is_none()
    }
}

impl std::fmt::Display for TextExpectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(s) = &self.equals {
            parts.push(format!("= '{}'", s));
        }
        if let Some(s) = &self.contains {
            parts.push(format!("contains '{}'", s));
        }
        if let Some(p) = &self.matches {
            parts.push(format!("~ /{}/", p.0.as_str()));
        }
        if let Some(p) = &self.not_matches {
            parts.push(format!("!~ /{}/", p.0.as_str()));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// HTTP method of a request step
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A REST call and what its response must look like
#[derive(Deserialize, Debug)]
pub struct RequestStep {
    #[serde(default)]
    pub method: HttpMethod,
    /// Path (or absolute URL) resolved against the base URL
    pub path: String,
    /// Query parameters; numbers and booleans are sent as written
    #[serde(default)]
    pub query: BTreeMap<String, Value>,
    /// JSON body
    pub body: Option<Value>,
    #[serde(default)]
    pub expect: ResponseExpectation,
    /// Values to capture from the first record: local name → field path
    #[serde(default)]
    pub capture: BTreeMap<String, String>,
}

/// Whether the request is supposed to succeed
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A 2xx response
    #[default]
    Success,
    /// A non-2xx response (negative-path scenarios)
    Failure,
}

/// Shape of the top-level `result` field
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    Array,
    Object,
}

/// Expectations for a response
#[derive(Deserialize, Debug, Default)]
pub struct ResponseExpectation {
    #[serde(default)]
    pub outcome: Outcome,
    /// Exact status code
    pub status: Option<u16>,
    /// Required shape of `result`
    pub result: Option<ResultShape>,
    /// Minimum number of records after normalization
    pub min_records: Option<usize>,
    /// Every record must have these field values
    #[serde(default)]
    pub each: BTreeMap<String, Value>,
    /// At least one record must have all of these field values
    #[serde(default)]
    pub contains: BTreeMap<String, Value>,
}

impl Suite {
    /// Load and validate a suite file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let suite: Suite = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse suite '{}': {}", path.display(), e)))?;
        suite.validate()?;
        Ok(suite)
    }

    /// Check every scenario on its own; cross-suite input wiring is checked by
    /// [`validate_inputs`] once all suites are loaded
    pub fn validate(&self) -> Result<()> {
        if self.scenarios.is_empty() {
            return Err(Error::Config(format!("Suite '{}' has no scenarios", self.suite)));
        }
        for scenario in &self.scenarios {
            scenario.validate()?;
        }
        Ok(())
    }
}

impl Scenario {
    /// Whether any step needs a browser
    pub fn needs_browser(&self) -> bool {
        self.setup.iter().chain(&self.steps).any(|s| s.action.is_ui())
    }

    /// Static checks: setup is API-only, expectations aren't empty, and every
    /// `${...}` reference names something known by the time the step runs
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Config(format!("Scenario '{}': {}", self.name, msg)));

        if self.steps.is_empty() && self.setup.is_empty() {
            return fail("no steps".to_string());
        }
        if let Some(step) = self.setup.iter().find(|s| s.action.is_ui()) {
            return fail(format!("setup steps must be API requests, found '{}'", step.action.label()));
        }

        let mut known: BTreeSet<String> = ["username", "password", "base_url"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for input in &self.inputs {
            known.insert(format!("input.{}", input.local_name()));
        }

        for (i, step) in self.setup.iter().chain(&self.steps).enumerate() {
            if step.timeout == Some(0) {
                return fail(format!("step {} has a zero timeout", i + 1));
            }
            if let Action::ExpectTitle(e) | Action::ExpectUrl(e) = &step.action {
                if e.is_empty() {
                    return fail(format!("step {} has no expectation", i + 1));
                }
            }
            for locator in step.action.locators() {
                locator.validate().or_else(|e| fail(format!("step {}: {}", i + 1, e)))?;
            }
            for reference in step_references(&step.action) {
                if !known.contains(&reference) {
                    return fail(format!("step {} references unknown value '${{{}}}'", i + 1, reference));
                }
            }
            if let Action::Request(r) = &step.action {
                for name in r.capture.keys() {
                    known.insert(format!("capture.{}", name));
                }
            }
        }
        Ok(())
    }
}

/// Check that every scenario input names an earlier scenario that captures it
pub fn validate_inputs(suites: &[Suite]) -> Result<()> {
    let mut seen: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for scenario in suites.iter().flat_map(|s| &s.scenarios) {
        for input in &scenario.inputs {
            let produced = seen.get(input.from.as_str()).ok_or_else(|| {
                Error::Config(format!(
                    "Scenario '{}': input '{}' comes from '{}', which is not an earlier scenario",
                    scenario.name, input.value, input.from
                ))
            })?;
            if !produced.contains(input.value.as_str()) {
                return Err(Error::Config(format!(
                    "Scenario '{}': '{}' does not capture '{}'",
                    scenario.name, input.from, input.value
                )));
            }
        }

        let captures = scenario
            .setup
            .iter()
            .chain(&scenario.steps)
            .filter_map(|s| match &s.action {
                Action::Request(r) => Some(r.capture.keys().map(String::as_str)),
                _ => None,
            })
            .flatten()
            .collect();
        if seen.insert(scenario.name.as_str(), captures).is_some() {
            return Err(Error::Config(format!("Duplicate scenario name '{}'", scenario.name)));
        }
    }
    Ok(())
}

/// Every `${...}` reference in a step's interpolated strings
fn step_references(action: &Action) -> Vec<String> {
    let mut strings: Vec<&str> = Vec::new();
    match action {
        Action::Navigate { url } => strings.extend(url.as_deref()),
        Action::Fill { value, .. } => strings.push(value.as_str()),
        Action::ExpectTitle(e) | Action::ExpectUrl(e) => {
            strings.extend(e.equals.as_deref());
            strings.extend(e.contains.as_deref());
        }
        Action::ExpectAttribute { equals, .. } => strings.push(equals.as_str()),
        Action::Request(r) => {
            strings.push(r.path.as_str());
            for value in r
                .query
                .values()
                .chain(r.expect.each.values())
                .chain(r.expect.contains.values())
                .chain(&r.body)
            {
                collect_json_strings(value, &mut strings);
            }
        }
        Action::Click { .. }
        | Action::SwitchFrame { .. }
        | Action::ExpectVisible { .. }
        | Action::ExpectRejected { .. } => {}
    }
    strings.into_iter().flat_map(references).collect()
}

fn collect_json_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_json_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_json_strings(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_SUITE: &str = r#"
suite: Login
scenarios:
  - name: invalid login
    steps:
      - action: navigate
      - action: fill
        locator: { css: 'input[name="user_name"]' }
        value: invalid_user
      - action: click
        locator: { role: button, name: Log in }
      - action: expect_visible
        locator: { text: User name or password invalid }
        timeout: 15
      - action: expect_url
        not_matches: '/now/nav/ui/home'
  - name: valid login
    steps:
      - action: navigate
      - action: fill
        locator: { css: 'input[name="user_password"]' }
        value: "${password}"
      - action: click
        locator: { role: button, name: Log out }
        best_effort: true
"#;

    #[test]
    fn test_parse_ui_suite() {
        let suite: Suite = serde_yaml::from_str(LOGIN_SUITE).unwrap();
        suite.validate().unwrap();
        assert_eq!(suite.scenarios.len(), 2);

        let invalid = &suite.scenarios[0];
        assert!(invalid.needs_browser());
        assert!(matches!(invalid.steps[0].action, Action::Navigate { url: None }));
        assert_eq!(invalid.steps[3].timeout, Some(15));
        match &invalid.steps[4].action {
            Action::ExpectUrl(e) => {
                assert!(e.not_matches.as_ref().unwrap().0.is_match("https://x/now/nav/ui/home"));
            }
            other => panic!("unexpected action {other:?}"),
        }

        assert!(suite.scenarios[1].steps[2].best_effort);
    }

    #[test]
    fn test_parse_request_step() {
        let yaml = r#"
action: request
path: /api/now/table/incident
query: { sysparm_query: priority=1 }
expect:
  result: array
  each: { priority: "1" }
"#;
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        match step.action {
            Action::Request(r) => {
                assert_eq!(r.method, HttpMethod::Get);
                assert_eq!(r.query["sysparm_query"], "priority=1");
                assert_eq!(r.expect.outcome, Outcome::Success);
                assert_eq!(r.expect.result, Some(ResultShape::Array));
                assert_eq!(r.expect.each["priority"], Value::String("1".into()));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_query_accepts_unquoted_scalars() {
        let yaml = r#"
action: request
path: /api/now/table/incident
query: { sysparm_limit: 50, sysparm_display_value: true, sysparm_query: "number=${capture.number}" }
"#;
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        match &step.action {
            Action::Request(r) => {
                assert_eq!(r.query["sysparm_limit"], Value::from(50));
                assert_eq!(r.query["sysparm_display_value"], Value::Bool(true));
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(step_references(&step.action), vec!["capture.number".to_string()]);
    }

    #[test]
    fn test_parse_ui_rejection_expectation() {
        let yaml = r#"
action: expect_rejected
error: { text: User name or password invalid }
not_url: '/now/nav/ui/home'
"#;
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        assert!(step.action.is_ui());
        match &step.action {
            Action::ExpectRejected { error, not_url } => {
                assert!(matches!(error, Locator::Text { .. }));
                assert!(not_url.0.is_match("https://x/now/nav/ui/home"));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_xpath_inside_shadow_root_is_rejected() {
        let yaml = r#"
name: shadow xpath
steps:
  - action: click
    locator:
      shadow: [macroponent-shell]
      find: { xpath: "//button" }
"#;
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        let err = scenario.validate().unwrap_err();
        assert!(err.is_run_fatal());
        assert!(err.to_string().contains("xpath is not supported inside shadow roots"));
    }

    #[test]
    fn test_parse_negative_path_expectation() {
        let yaml = "action: request\nmethod: POST\npath: /x\nexpect: { outcome: failure, status: 401 }\n";
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        match step.action {
            Action::Request(r) => {
                assert_eq!(r.method, HttpMethod::Post);
                assert_eq!(r.expect.outcome, Outcome::Failure);
                assert_eq!(r.expect.status, Some(401));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_setup_must_be_api_only() {
        let yaml = r#"
name: bad
setup:
  - action: navigate
steps:
  - action: expect_title
    equals: x
"#;
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(scenario.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_reference_to_later_capture_is_rejected() {
        let yaml = r#"
name: out of order
steps:
  - action: navigate
    url: "/incident.do?sys_id=${capture.sys_id}"
  - action: request
    method: POST
    path: /api/now/table/incident
    capture: { sys_id: sys_id }
"#;
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        let err = scenario.validate().unwrap_err();
        assert!(err.to_string().contains("capture.sys_id"));
    }

    #[test]
    fn test_capture_then_reference_is_accepted() {
        let yaml = r#"
name: two phase
setup:
  - action: request
    method: POST
    path: /api/now/table/incident
    body: { short_description: "harness check" }
    capture: { number: number }
steps:
  - action: navigate
    url: "/incident_list.do?sysparm_query=number=${capture.number}"
"#;
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        scenario.validate().unwrap();
    }

    #[test]
    fn test_validate_inputs_across_scenarios() {
        let yaml = r#"
suite: Incidents
scenarios:
  - name: create incident
    steps:
      - action: request
        method: POST
        path: /api/now/table/incident
        capture: { number: number }
  - name: incident visible in list
    inputs:
      - { from: create incident, value: number }
    steps:
      - action: navigate
        url: "/incident_list.do?sysparm_query=number=${input.number}"
"#;
        let suite: Suite = serde_yaml::from_str(yaml).unwrap();
        suite.validate().unwrap();
        validate_inputs(std::slice::from_ref(&suite)).unwrap();
    }

    #[test]
    fn test_validate_inputs_rejects_unknown_producer_and_value() {
        let yaml = r#"
suite: Broken
scenarios:
  - name: consumer
    inputs:
      - { from: producer, value: number }
    steps:
      - action: navigate
  - name: producer
    steps:
      - action: request
        path: /x
        capture: { number: number }
"#;
        let suite: Suite = serde_yaml::from_str(yaml).unwrap();
        let err = validate_inputs(std::slice::from_ref(&suite)).unwrap_err();
        assert!(err.is_run_fatal());
        assert!(err.to_string().contains("not an earlier scenario"));
    }

    #[test]
    fn test_duplicate_scenario_names_rejected() {
        let yaml = r#"
suite: Dupes
scenarios:
  - name: same
    steps: [ { action: navigate } ]
  - name: same
    steps: [ { action: navigate } ]
"#;
        let suite: Suite = serde_yaml::from_str(yaml).unwrap();
        assert!(validate_inputs(std::slice::from_ref(&suite)).is_err());
    }

    #[test]
    fn test_invalid_regex_fails_to_parse() {
        let yaml = "action: expect_url\nmatches: '/(unclosed/'\n";
        assert!(serde_yaml::from_str::<Step>(yaml).is_err());
    }
}
