//! Element locators
//!
//! Scenarios describe elements the way a user sees them (role and accessible
//! name, visible text) or with raw selectors. Role and text locators compile to
//! an XPath candidate set; the accessible name filter runs in the harness
//! because XPath 1.0 has no regex support.
//!
//! Drivers only accept CSS inside shadow roots, so a [`Locator::Shadow`] walks
//! its host chain and runs a CSS form of the inner locator in the last root.

use std::fmt;

use regex::Regex;
use serde::Deserialize;

use super::types::Strategy;

/// How to find an element
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Locator {
    /// Element inside open shadow roots: each `shadow` entry selects the next
    /// host (CSS, searched in the previous root), `find` runs in the last root
    Shadow {
        shadow: Vec<String>,
        find: Box<Locator>,
    },
    /// CSS selector
    Css { css: String },
    /// Raw XPath expression
    XPath { xpath: String },
    /// Innermost element whose visible text contains the string, ignoring
    /// ASCII case
    Text { text: String },
    /// Element with an ARIA role, optionally filtered by accessible name
    Role {
        role: String,
        #[serde(default)]
        name: Option<NamePattern>,
    },
}

impl Locator {
    /// Strategy and selector sent to the driver
    ///
    /// For a shadow locator this is the query run inside the innermost root.
    pub fn query(&self) -> (Strategy, String) {
        match self {
            Locator::Css { css } => (Strategy::Css, css.clone()),
            Locator::XPath { xpath } => (Strategy::XPath, xpath.clone()),
            Locator::Text { text } => {
                let lit = xpath_literal(&text.to_lowercase());
                let hay = format!("translate(normalize-space(.), '{}', '{}')", UPPER, LOWER);
                (
                    Strategy::XPath,
                    format!("//body//*[contains({hay}, {lit})][not(.//*[contains({hay}, {lit})])]"),
                )
            }
            Locator::Role { role, .. } => (Strategy::XPath, role_xpath(role)),
            Locator::Shadow { find, .. } => find.shadow_query(),
        }
    }

    /// CSS form of the locator for use inside a shadow root
    ///
    /// Text has no CSS form: every element is a candidate and
    /// [`Locator::text_filter`] narrows them down.
    fn shadow_query(&self) -> (Strategy, String) {
        match self {
            Locator::Css { css } => (Strategy::Css, css.clone()),
            Locator::Role { role, .. } => (Strategy::Css, role_css(role)),
            _ => (Strategy::Css, "*".to_string()),
        }
    }

    /// Host selectors to walk before querying, empty for document lookups
    pub fn shadow_hosts(&self) -> &[String] {
        match self {
            Locator::Shadow { shadow, .. } => shadow,
            _ => &[],
        }
    }

    /// Accessible name filter applied to the driver's candidates
    pub fn name_filter(&self) -> Option<&NamePattern> {
        match self {
            Locator::Role { name, .. } => name.as_ref(),
            Locator::Shadow { find, .. } => find.name_filter(),
            _ => None,
        }
    }

    /// Visible text filter the harness applies itself (text inside shadow roots)
    pub fn text_filter(&self) -> Option<&str> {
        match self {
            Locator::Shadow { find, .. } => match find.as_ref() {
                Locator::Text { text } => Some(text),
                _ => None,
            },
            _ => None,
        }
    }

    /// Load-time checks for locators the driver could never run
    pub fn validate(&self) -> std::result::Result<(), String> {
        let Locator::Shadow { shadow, find } = self else {
            return Ok(());
        };
        if shadow.is_empty() {
            return Err(format!("{} needs at least one shadow host", self));
        }
        match find.as_ref() {
            Locator::XPath { .. } => Err(format!("{}: xpath is not supported inside shadow roots", self)),
            Locator::Shadow { .. } => Err(format!("{}: list every host in one 'shadow' chain", self)),
            _ => Ok(()),
        }
    }
}

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css { css } => write!(f, "css '{}'", css),
            Locator::XPath { xpath } => write!(f, "xpath '{}'", xpath),
            Locator::Text { text } => write!(f, "text '{}'", text),
            Locator::Role { role, name: None } => write!(f, "role {}", role),
            Locator::Role {
                role,
                name: Some(name),
            } => write!(f, "role {} named {}", role, name),
            Locator::Shadow { shadow, find } => write!(f, "{} in shadow root of '{}'", find, shadow.join(" > ")),
        }
    }
}

/// Elements carrying a role implicitly, as (XPath, CSS)
fn implicit_role(role: &str) -> Option<(&'static str, &'static str)> {
    let selectors = match role {
        "button" => (
            "//button | //input[@type='submit' or @type='button' or @type='reset']",
            "button, input[type='submit'], input[type='button'], input[type='reset']",
        ),
        "heading" => ("//h1 | //h2 | //h3 | //h4 | //h5 | //h6", "h1, h2, h3, h4, h5, h6"),
        "link" => ("//a[@href]", "a[href]"),
        "textbox" => (
            "//textarea | //input[not(@type) or @type='text' or @type='email' or @type='password' or @type='search' or @type='tel' or @type='url']",
            "textarea, input:not([type]), input[type='text'], input[type='email'], input[type='password'], input[type='search'], input[type='tel'], input[type='url']",
        ),
        "checkbox" => ("//input[@type='checkbox']", "input[type='checkbox']"),
        "combobox" => ("//select", "select"),
        _ => return None,
    };
    Some(selectors)
}

/// XPath matching elements that carry a role, implicitly or explicitly
fn role_xpath(role: &str) -> String {
    let explicit = format!("//*[@role={}]", xpath_literal(role));
    match implicit_role(role) {
        Some((xpath, _)) => format!("{} | {}", xpath, explicit),
        None => explicit,
    }
}

/// CSS counterpart of [`role_xpath`]
fn role_css(role: &str) -> String {
    let explicit = format!("[role=\"{}\"]", role.replace('\\', "\\\\").replace('"', "\\\""));
    match implicit_role(role) {
        Some((_, css)) => format!("{}, {}", css, explicit),
        None => explicit,
    }
}

/// Quote a string as an XPath 1.0 literal
///
/// XPath has no escape sequences, so strings containing both quote kinds
/// are split and rebuilt with `concat()`.
fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{}'", s)
    } else if !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// Accessible-name pattern
///
/// A plain string matches case-insensitively as a substring. A string written
/// as `/regex/` or `/regex/i` is a regular expression.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub enum NamePattern {
    Substring(String),
    Regex(Regex),
}

impl NamePattern {
    /// Whether an element's accessible name satisfies the pattern
    pub fn matches(&self, name: &str) -> bool {
        let name = normalize_whitespace(name);
        match self {
            NamePattern::Substring(s) => name.to_lowercase().contains(&s.to_lowercase()),
            NamePattern::Regex(re) => re.is_match(&name),
        }
    }
}

impl TryFrom<String> for NamePattern {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match parse_slash_regex(&s) {
            Some(result) => result.map(NamePattern::Regex),
            None => Ok(NamePattern::Substring(normalize_whitespace(&s))),
        }
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamePattern::Substring(s) => write!(f, "'{}'", s),
            NamePattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// Parse `/body/flags` into a regex; `None` when the string isn't slash-delimited
///
/// Supported flags: `i` (case-insensitive), `m` (multi-line), `s` (dot matches newline).
pub(crate) fn parse_slash_regex(s: &str) -> Option<std::result::Result<Regex, String>> {
    let rest = s.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    let (body, flags) = (&rest[..end], &rest[end + 1..]);
    if body.is_empty() {
        return None;
    }

    let mut prefix = String::new();
    for flag in flags.chars() {
        match flag {
            'i' | 'm' | 's' => prefix.push(flag),
            other => return Some(Err(format!("Unsupported regex flag '{}' in {}", other, s))),
        }
    }
    let pattern = if prefix.is_empty() {
        body.to_string()
    } else {
        format!("(?{}){}", prefix, body)
    };
    Some(Regex::new(&pattern).map_err(|e| format!("Invalid regex {}: {}", s, e)))
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Locator {
        fn text(text: &str) -> Self {
            Self::Text {
                text: text.to_string(),
            }
        }

        fn role(role: &str, name: Option<NamePattern>) -> Self {
            Self::Role {
                role: role.to_string(),
                name,
            }
        }
    }

    #[test]
    fn test_deserialize_locator_shapes() {
        let css: Locator = serde_yaml::from_str("css: 'input[name=\"user_name\"]'").unwrap();
        assert!(matches!(css, Locator::Css { .. }));

        let role: Locator = serde_yaml::from_str("role: button\nname: Log in").unwrap();
        match role {
            Locator::Role { role, name } => {
                assert_eq!(role, "button");
                assert!(name.unwrap().matches("Log in"));
            }
            other => panic!("unexpected locator {other:?}"),
        }

        let text: Locator = serde_yaml::from_str("text: User name or password invalid").unwrap();
        assert!(matches!(text, Locator::Text { .. }));
    }

    #[test]
    fn test_name_pattern_substring_is_case_insensitive() {
        let pattern = NamePattern::try_from("log in".to_string()).unwrap();
        assert!(pattern.matches("Log in"));
        assert!(pattern.matches("  Log\n   in  "));
        assert!(!pattern.matches("Log out"));
    }

    #[test]
    fn test_name_pattern_regex_with_flags() {
        let pattern = NamePattern::try_from("/Shared admin dashboard/i".to_string()).unwrap();
        assert!(matches!(pattern, NamePattern::Regex(_)));
        assert!(pattern.matches("SHARED ADMIN DASHBOARD"));
        assert!(!pattern.matches("Personal dashboard"));
    }

    #[test]
    fn test_name_pattern_rejects_bad_regex() {
        assert!(NamePattern::try_from("/(unclosed/".to_string()).is_err());
        assert!(NamePattern::try_from("/x/g".to_string()).is_err());
    }

    #[test]
    fn test_xpath_literal_quoting() {
        assert_eq!(xpath_literal("Log in"), "'Log in'");
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert_eq!(
            xpath_literal("a'b\"c"),
            "concat('a', \"'\", 'b\"c')"
        );
    }

    #[test]
    fn test_role_query_includes_implicit_and_explicit_roles() {
        let (strategy, xpath) = Locator::role("button", None).query();
        assert_eq!(strategy, Strategy::XPath);
        assert!(xpath.contains("//button"));
        assert!(xpath.contains("@role='button'"));

        let (_, xpath) = Locator::role("tab", None).query();
        assert_eq!(xpath, "//*[@role='tab']");
    }

    #[test]
    fn test_text_query_targets_innermost_match() {
        let (strategy, xpath) = Locator::text("User name or password invalid").query();
        assert_eq!(strategy, Strategy::XPath);
        assert!(xpath.contains("translate(normalize-space(.), 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz')"));
        assert!(xpath.contains(", 'user name or password invalid')"));
        assert!(xpath.contains("not(.//*"));
    }

    #[test]
    fn test_shadow_locator_uses_css_inside_the_root() {
        let locator: Locator = serde_yaml::from_str(
            "shadow: [macroponent-shell, sn-polaris-header]\nfind: { role: button, name: Available }",
        )
        .unwrap();
        assert_eq!(locator.shadow_hosts(), ["macroponent-shell", "sn-polaris-header"]);
        let (strategy, css) = locator.query();
        assert_eq!(strategy, Strategy::Css);
        assert!(css.starts_with("button, input[type='submit']"));
        assert!(css.ends_with("[role=\"button\"]"));
        assert!(locator.name_filter().unwrap().matches("wpt.admin: Available"));
        assert!(locator.validate().is_ok());
        assert_eq!(
            locator.to_string(),
            "role button named 'Available' in shadow root of 'macroponent-shell > sn-polaris-header'"
        );
    }

    #[test]
    fn test_shadow_text_is_filtered_by_the_harness() {
        let locator: Locator = serde_yaml::from_str("shadow: [app-shell]\nfind: { text: Saved }").unwrap();
        assert_eq!(locator.query(), (Strategy::Css, "*".to_string()));
        assert_eq!(locator.text_filter(), Some("Saved"));
        assert!(Locator::text("Saved").text_filter().is_none());
    }

    #[test]
    fn test_shadow_locator_validation() {
        let xpath: Locator = serde_yaml::from_str("shadow: [app-shell]\nfind: { xpath: '//h1' }").unwrap();
        assert!(xpath.validate().unwrap_err().contains("xpath"));

        let empty: Locator = serde_yaml::from_str("shadow: []\nfind: { css: h1 }").unwrap();
        assert!(empty.validate().is_err());
    }
}
