//! WebDriver server process management
//!
//! When `webdriver.driver_path` is configured the harness starts the driver
//! (chromedriver, geckodriver) itself for the duration of the run.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use url::Url;

use crate::common::{Error, Result};

/// Timeout for the driver to start accepting connections
const SPAWN_TIMEOUT_SECS: u64 = 10;

/// A driver process owned by the run
pub struct DriverProcess {
    child: Child,
}

impl DriverProcess {
    /// Start the driver listening on the port of `server_url` and wait until it reports ready
    pub async fn spawn(driver: &Path, server_url: &str) -> Result<Self> {
        let url = Url::parse(server_url)
            .map_err(|e| Error::Config(format!("webdriver.url '{}' is invalid: {}", server_url, e)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::Config(format!("webdriver.url '{}' has no port", server_url)))?;

        tracing::debug!(driver = %driver.display(), port, "Spawning WebDriver server");

        let child = Command::new(driver)
            .arg(format!("--port={}", port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::DriverStartFailed(format!("{}: {}", driver.display(), e)))?;

        let mut process = Self { child };
        process.wait_ready(&url).await?;
        Ok(process)
    }

    /// Poll the `/status` endpoint until the driver is ready
    async fn wait_ready(&mut self, url: &Url) -> Result<()> {
        let status_url = url
            .join("status")
            .map_err(|e| Error::Internal(format!("Bad WebDriver status URL: {}", e)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()?;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(SPAWN_TIMEOUT_SECS);

        loop {
            if let Some(status) = self.child.try_wait()? {
                return Err(Error::DriverStartFailed(format!("driver exited early with {}", status)));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::DriverStartFailed(format!(
                    "not ready after {} seconds",
                    SPAWN_TIMEOUT_SECS
                )));
            }

            tokio::time::sleep(Duration::from_millis(100)).await;

            let Ok(response) = http.get(status_url.clone()).send().await else {
                continue;
            };
            let Ok(body) = response.json::<serde_json::Value>().await else {
                continue;
            };
            if body["value"]["ready"].as_bool().unwrap_or(false) {
                tracing::debug!("WebDriver server ready");
                return Ok(());
            }
        }
    }

    /// Stop the driver
    pub async fn shutdown(mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}
