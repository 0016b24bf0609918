//! Run configuration and harness settings
//!
//! Two layers:
//! - [`RunConfig`]: target instance and credentials, read once from the
//!   environment (optionally seeded from a `.env` file) and immutable for
//!   the rest of the run.
//! - [`Settings`]: timeouts and WebDriver options from an optional TOML file.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

use super::paths::config_path;
use super::{Error, Result};

/// Environment variable holding the instance base URL
pub const ENV_BASE_URL: &str = "SERVICENOW_BASE_URL";
/// Environment variable holding the login user name
pub const ENV_USERNAME: &str = "SERVICENOW_USERNAME";
/// Environment variable holding the login password
pub const ENV_PASSWORD: &str = "SERVICENOW_PASSWORD";

/// Per-run target and credentials
#[derive(Clone, PartialEq, Eq)]
pub struct RunConfig {
    base_url: Url,
    username: String,
    password: String,
}

impl RunConfig {
    /// Build a config from explicit values, validating the URL
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("{} is not a valid URL '{}': {}", ENV_BASE_URL, base_url, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "{} must be an http(s) URL, got scheme '{}'",
                ENV_BASE_URL,
                base_url.scheme()
            )));
        }
        Ok(Self {
            base_url,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Read the config from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the config through an arbitrary variable lookup
    ///
    /// Every variable is checked before any value is used, so the error names
    /// the first missing one in declaration order. Blank values count as missing.
    /// The password is kept exactly as given, surrounding whitespace included.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::MissingEnv(key.to_string()))
        };

        let base_url = get(ENV_BASE_URL)?;
        let username = get(ENV_USERNAME)?;
        let password = get(ENV_PASSWORD)?;
        Self::new(base_url.trim(), username.trim(), &password)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Resolve a path or absolute URL against the base URL
    pub fn resolve(&self, target: &str) -> Result<Url> {
        self.base_url
            .join(target)
            .map_err(|e| Error::Config(format!("Cannot resolve '{}' against base URL: {}", target, e)))
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Load a dotenv file into the process environment
///
/// Variables already present in the environment win. A missing default file is
/// not an error, a missing explicitly requested file is.
pub fn load_env_file(path: &Path, explicit: bool) -> Result<()> {
    match dotenvy::from_path(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Loaded environment file");
            Ok(())
        }
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Ok(()),
        Err(e) => Err(Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        }),
    }
}

/// Harness settings
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Settings {
    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Browser automation settings
    #[serde(default)]
    pub webdriver: WebDriverConfig,
}

/// Timeout settings
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Default bound for a single step, in seconds
    #[serde(default = "default_step")]
    pub step_secs: u64,

    /// Bound for a single HTTP round-trip, in seconds
    #[serde(default = "default_request")]
    pub request_secs: u64,

    /// Interval between UI state polls, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            step_secs: default_step(),
            request_secs: default_request(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_step() -> u64 {
    30
}
fn default_request() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    250
}

/// Browser to request from the WebDriver server
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    /// Chrome / Chromium through chromedriver
    #[default]
    Chrome,
    /// Firefox through geckodriver
    Firefox,
}

impl Browser {
    /// W3C `browserName` capability value
    pub fn name(&self) -> &'static str {
        match self {
            Browser::Chrome => "chrome",
            Browser::Firefox => "firefox",
        }
    }
}

/// WebDriver server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WebDriverConfig {
    /// URL of a running WebDriver server
    #[serde(default = "default_webdriver_url")]
    pub url: String,

    /// Browser to drive
    #[serde(default)]
    pub browser: Browser,

    /// Run the browser without a window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Driver executable (path or name on PATH) to spawn for the run.
    /// When unset the harness expects a server already listening at `url`.
    #[serde(default)]
    pub driver_path: Option<PathBuf>,

    /// Window size as `[width, height]`
    #[serde(default)]
    pub window_size: Option<[u32; 2]>,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: default_webdriver_url(),
            browser: Browser::default(),
            headless: default_headless(),
            driver_path: None,
            window_size: None,
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}
fn default_headless() -> bool {
    true
}

impl WebDriverConfig {
    /// Resolve the driver executable, searching PATH for bare names
    pub fn resolve_driver(&self) -> Result<Option<PathBuf>> {
        let Some(path) = &self.driver_path else {
            return Ok(None);
        };
        if path.components().count() > 1 || path.is_absolute() {
            return Ok(Some(path.clone()));
        }
        which::which(path).map(Some).map_err(|e| {
            Error::Config(format!("WebDriver executable '{}' not found on PATH: {}", path.display(), e))
        })
    }
}

impl Settings {
    /// Load settings from an explicit file, or the default location
    ///
    /// Returns default settings if no file is given and the default file doesn't exist
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let settings: Self = toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that would make every step fail
    pub fn validate(&self) -> Result<()> {
        if self.timeouts.step_secs == 0 {
            return Err(Error::Config("timeouts.step_secs must be greater than zero".to_string()));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(Error::Config(
                "timeouts.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Url::parse(&self.webdriver.url)
            .map_err(|e| Error::Config(format!("webdriver.url '{}' is invalid: {}", self.webdriver.url, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_run_config_from_complete_environment() {
        let config = RunConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://dev1234.service-now.com/"),
            (ENV_USERNAME, "admin"),
            (ENV_PASSWORD, "secret"),
        ]))
        .unwrap();

        assert_eq!(config.base_url().as_str(), "https://dev1234.service-now.com/");
        assert_eq!(config.username(), "admin");
        assert_eq!(config.password(), "secret");
    }

    #[test]
    fn test_run_config_missing_each_variable() {
        let all = [
            (ENV_BASE_URL, "https://dev1234.service-now.com/"),
            (ENV_USERNAME, "admin"),
            (ENV_PASSWORD, "secret"),
        ];
        for skip in 0..all.len() {
            let partial: Vec<_> = all
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, p)| *p)
                .collect();
            match RunConfig::from_lookup(lookup(&partial)) {
                Err(Error::MissingEnv(name)) => assert_eq!(name, all[skip].0),
                other => panic!("expected MissingEnv, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_run_config_empty_value_is_missing() {
        let err = RunConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://dev1234.service-now.com/"),
            (ENV_USERNAME, "   "),
            (ENV_PASSWORD, "secret"),
        ]))
        .unwrap_err();
        assert!(err.is_run_fatal());
        assert!(matches!(err, Error::MissingEnv(name) if name == ENV_USERNAME));
    }

    #[test]
    fn test_run_config_keeps_password_whitespace() {
        let config = RunConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, " https://dev1234.service-now.com/ "),
            (ENV_USERNAME, "admin\n"),
            (ENV_PASSWORD, "  pass phrase "),
        ]))
        .unwrap();
        assert_eq!(config.base_url().as_str(), "https://dev1234.service-now.com/");
        assert_eq!(config.username(), "admin");
        assert_eq!(config.password(), "  pass phrase ");
    }

    #[test]
    fn test_run_config_rejects_malformed_url() {
        let err = RunConfig::new("not a url", "admin", "secret").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = RunConfig::new("ftp://instance.example", "admin", "secret").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_run_config_debug_redacts_password() {
        let config = RunConfig::new("https://dev1234.service-now.com/", "admin", "hunter2").unwrap();
        let printed = format!("{config:?}");
        assert!(printed.contains("admin"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_resolve_relative_paths() {
        let config = RunConfig::new("https://dev1234.service-now.com/", "admin", "secret").unwrap();
        assert_eq!(
            config.resolve("/api/now/table/incident").unwrap().as_str(),
            "https://dev1234.service-now.com/api/now/table/incident"
        );
    }

    #[test]
    fn test_settings_defaults_from_empty_toml() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.timeouts.step_secs, 30);
        assert_eq!(settings.timeouts.poll_interval_ms, 250);
        assert_eq!(settings.webdriver.browser, Browser::Chrome);
        assert!(settings.webdriver.headless);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_from_toml() {
        let settings: Settings = toml::from_str(
            r#"
            [timeouts]
            step_secs = 10

            [webdriver]
            url = "http://127.0.0.1:4444"
            browser = "firefox"
            headless = false
            window_size = [1280, 800]
            "#,
        )
        .unwrap();
        assert_eq!(settings.timeouts.step_secs, 10);
        assert_eq!(settings.timeouts.request_secs, 30);
        assert_eq!(settings.webdriver.browser, Browser::Firefox);
        assert_eq!(settings.webdriver.window_size, Some([1280, 800]));
    }

    #[test]
    fn test_settings_reject_zero_step_timeout() {
        let settings: Settings = toml::from_str("[timeouts]\nstep_secs = 0\n").unwrap();
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_default_env_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        assert!(load_env_file(&path, false).is_ok());
        assert!(load_env_file(&path, true).is_err());
    }
}
