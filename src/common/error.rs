//! Error types for the verification harness
//!
//! Only configuration errors abort a run. Everything else is local to the
//! scenario that raised it and ends up in that scenario's verdict.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of response body characters kept in a request error
pub const BODY_EXCERPT_CHARS: usize = 200;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors (run-fatal) ===
    #[error("Environment variable {0} must be set. Export it or add it to the .env file")]
    MissingEnv(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Remote API Errors ===
    #[error("{method} {url} returned {status}: {body}")]
    Request {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // === Browser Errors ===
    #[error("WebDriver '{command}' failed: {message}")]
    WebDriver { command: String, message: String },

    #[error("WebDriver server failed to start: {0}")]
    DriverStartFailed(String),

    // === Timeout Errors ===
    #[error("Timed out after {secs} seconds waiting for {waiting_for}")]
    Timeout { secs: u64, waiting_for: String },

    // === Verdict Errors ===
    #[error("{subject}: expected {expected}, got {observed}")]
    Assertion {
        subject: String,
        expected: String,
        observed: String,
    },

    #[error("{subject}: expected {expected} but observed {observed}")]
    ExpectedFailureMismatch {
        subject: String,
        expected: String,
        observed: String,
    },

    // === IO / Serialization Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error must abort the whole run rather than one scenario
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Error::MissingEnv(_)
                | Error::Config(_)
                | Error::ConfigParse(_)
                | Error::FileRead { .. }
        )
    }

    /// Create a request error, truncating the body for diagnostics
    pub fn request(method: &str, url: &str, status: u16, body: &str) -> Self {
        Self::Request {
            method: method.to_string(),
            url: url.to_string(),
            status,
            body: excerpt(body),
        }
    }

    /// Create an assertion failure carrying both sides of the comparison
    pub fn assertion(
        subject: impl Into<String>,
        expected: impl Into<String>,
        observed: impl Into<String>,
    ) -> Self {
        Self::Assertion {
            subject: subject.into(),
            expected: expected.into(),
            observed: observed.into(),
        }
    }

    /// Create a WebDriver command error
    pub fn webdriver(command: &str, message: impl Into<String>) -> Self {
        Self::WebDriver {
            command: command.to_string(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(secs: u64, waiting_for: impl Into<String>) -> Self {
        Self::Timeout {
            secs,
            waiting_for: waiting_for.into(),
        }
    }

    /// Short machine-readable kind, used in run reports
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MissingEnv(_) | Error::Config(_) | Error::ConfigParse(_) | Error::FileRead { .. } => {
                "configuration"
            }
            Error::Request { .. } | Error::Http(_) => "request",
            Error::WebDriver { .. } | Error::DriverStartFailed(_) => "webdriver",
            Error::Timeout { .. } => "timeout",
            Error::Assertion { .. } => "assertion",
            Error::ExpectedFailureMismatch { .. } => "expected_failure_mismatch",
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => "internal",
        }
    }
}

/// Cut a response body down to something that fits in a log line
pub fn excerpt(body: &str) -> String {
    if body.chars().count() > BODY_EXCERPT_CHARS {
        let cut: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
        format!("{}...", cut)
    } else {
        body.to_string()
    }
}
