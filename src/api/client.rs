//! Authenticated REST client for the instance
//!
//! One [`ApiSession`] is opened per run and shared by every scenario. The
//! underlying `reqwest::Client` pools connections and is safe to use
//! concurrently; the credentials are fixed at construction.

use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::common::{Result, RunConfig};

use super::result::normalize_result;

/// Response captured from the remote API
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub method: String,
    pub url: String,
    pub status: u16,
    /// Parsed JSON body, `Null` when the body isn't JSON
    pub body: Value,
    /// Raw body text, kept for diagnostics
    pub text: String,
}

impl ApiResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Records in the body, normalized to a list
    pub fn records(&self) -> Vec<Value> {
        normalize_result(&self.body)
    }
}

/// HTTP context with the run's credentials attached
#[derive(Clone)]
pub struct ApiSession {
    client: reqwest::Client,
    config: RunConfig,
}

impl ApiSession {
    /// Build the session; no request is sent until the first call
    pub fn new(config: &RunConfig, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("itsm-harness/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Send a request to `path` (resolved against the base URL)
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let url = self.config.resolve(path)?;

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .basic_auth(self.config.username(), Some(self.config.password()))
            .header(reqwest::header::ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(%method, url = %url, "API request");
        let response = request.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        tracing::debug!(%method, url = %final_url, status, "API response");

        Ok(ApiResponse {
            method: method.to_string(),
            url: final_url,
            status,
            body,
            text,
        })
    }
}
