//! WebDriver wire types
//!
//! Subset of the W3C WebDriver protocol the harness needs.
//! See: https://www.w3.org/TR/webdriver2/

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::common::config::{Browser, WebDriverConfig};

/// Key under which W3C drivers return element references
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Key under which W3C drivers return shadow root references
pub const SHADOW_KEY: &str = "shadow-6066-11e4-a52e-4f735466cecf";

/// Opaque reference to an element in the current browsing context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(pub String);

impl ElementRef {
    /// Extract an element reference from a wire value
    pub fn from_value(value: &Value) -> Option<Self> {
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| Self(id.to_string()))
    }

    /// Wire representation, as accepted by frame switching
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(ELEMENT_KEY.to_string(), Value::String(self.0.clone()));
        Value::Object(map)
    }
}

/// Opaque reference to an open shadow root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowRef(pub String);

impl ShadowRef {
    pub fn from_value(value: &Value) -> Option<Self> {
        value
            .get(SHADOW_KEY)
            .and_then(Value::as_str)
            .map(|id| Self(id.to_string()))
    }
}

/// Element location strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Strategy {
    #[serde(rename = "css selector")]
    Css,
    #[serde(rename = "xpath")]
    XPath,
}

/// Body of a find element(s) request
#[derive(Debug, Clone, Serialize)]
pub struct FindRequest<'a> {
    pub using: Strategy,
    pub value: &'a str,
}

/// Every WebDriver response wraps its payload in `value`
#[derive(Debug, Deserialize)]
pub struct WireResponse {
    #[serde(default)]
    pub value: Value,
}

/// Error payload returned with non-200 statuses
#[derive(Debug, Deserialize)]
pub struct WireError {
    pub error: String,
    #[serde(default)]
    pub message: String,
}

impl WireError {
    /// Error code for an element that hosts no open shadow root
    pub const NO_SUCH_SHADOW_ROOT: &'static str = "no such shadow root";
    /// Error code for a reference to an element that left the DOM
    pub const STALE_ELEMENT: &'static str = "stale element reference";

    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Build the new-session capabilities for the configured browser
pub fn capabilities(config: &WebDriverConfig) -> Value {
    let mut args: Vec<String> = Vec::new();
    let (options_key, options) = match config.browser {
        Browser::Chrome => {
            if config.headless {
                args.push("--headless=new".to_string());
            }
            if let Some([w, h]) = config.window_size {
                args.push(format!("--window-size={},{}", w, h));
            }
            ("goog:chromeOptions", json!({ "args": args }))
        }
        Browser::Firefox => {
            if config.headless {
                args.push("-headless".to_string());
            }
            if let Some([w, h]) = config.window_size {
                args.push(format!("--width={}", w));
                args.push(format!("--height={}", h));
            }
            ("moz:firefoxOptions", json!({ "args": args }))
        }
    };

    let mut always_match = Map::new();
    always_match.insert("browserName".to_string(), json!(config.browser.name()));
    always_match.insert(options_key.to_string(), options);

    json!({ "capabilities": { "alwaysMatch": always_match } })
}
