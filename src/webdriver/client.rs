//! WebDriver client
//!
//! A [`BrowserSession`] is one browser window driven over the W3C WebDriver
//! HTTP protocol. It is owned by a single scenario and must be released with
//! [`BrowserSession::close`].

use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};
use url::Url;

use crate::common::config::WebDriverConfig;
use crate::common::{Error, Result};

use super::locator::Locator;
use super::types::{capabilities, ElementRef, FindRequest, ShadowRef, Strategy, WireError, WireResponse};

/// Lookup outcome that distinguishes "nothing there yet" from a broken driver
#[derive(Debug)]
pub enum Found {
    Element(ElementRef),
    Missing,
}

/// A live WebDriver session
pub struct BrowserSession {
    http: reqwest::Client,
    server: Url,
    session_id: String,
}

impl BrowserSession {
    /// Create a new browser session on the configured server
    pub async fn open(config: &WebDriverConfig, request_timeout: Duration) -> Result<Self> {
        let server = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("webdriver.url '{}' is invalid: {}", config.url, e)))?;
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;

        let value = send(
            &http,
            Method::POST,
            join(&server, "session")?,
            "new session",
            Some(capabilities(config)),
        )
        .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::webdriver("new session", format!("no sessionId in {}", value)))?
            .to_string();

        tracing::debug!(session_id = %session_id, browser = config.browser.name(), "Browser session opened");

        Ok(Self {
            http,
            server,
            session_id,
        })
    }

    /// Send a command scoped to this session
    async fn command(&self, method: Method, path: &str, name: &str, body: Option<Value>) -> Result<Value> {
        let endpoint = if path.is_empty() {
            format!("session/{}", self.session_id)
        } else {
            format!("session/{}/{}", self.session_id, path)
        };
        send(&self.http, method, join(&self.server, &endpoint)?, name, body).await
    }

    pub async fn navigate(&self, url: &Url) -> Result<()> {
        self.command(Method::POST, "url", "navigate", Some(json!({ "url": url.as_str() })))
            .await?;
        Ok(())
    }

    pub async fn title(&self) -> Result<String> {
        let value = self.command(Method::GET, "title", "title", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn current_url(&self) -> Result<String> {
        let value = self.command(Method::GET, "url", "current url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Elements matching a selector in the document or in a shadow root
    async fn find_elements(&self, root: Option<&ShadowRef>, using: Strategy, selector: &str) -> Result<Vec<ElementRef>> {
        let path = match root {
            Some(root) => format!("shadow/{}/elements", root.0),
            None => "elements".to_string(),
        };
        let value = self
            .command(
                Method::POST,
                &path,
                "find elements",
                Some(serde_json::to_value(FindRequest {
                    using,
                    value: selector,
                })?),
            )
            .await?;

        Ok(value
            .as_array()
            .map(|items| items.iter().filter_map(ElementRef::from_value).collect())
            .unwrap_or_default())
    }

    /// Open shadow root of an element, `None` when it hosts none
    async fn shadow_root(&self, element: &ElementRef) -> Result<Option<ShadowRef>> {
        match self
            .command(Method::GET, &format!("element/{}/shadow", element.0), "get shadow root", None)
            .await
        {
            Ok(value) => Ok(ShadowRef::from_value(&value)),
            Err(Error::WebDriver { message, .. }) if message.starts_with(WireError::NO_SUCH_SHADOW_ROOT) => Ok(None),
            Err(e) if is_stale(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// All elements matching the locator's selector, before name filtering
    ///
    /// Shadow locators walk their host chain first; a host that is missing or
    /// has no open root yet yields no candidates.
    async fn candidates(&self, locator: &Locator) -> Result<Vec<ElementRef>> {
        let mut root: Option<ShadowRef> = None;
        for host in locator.shadow_hosts() {
            let hosts = self.find_elements(root.as_ref(), Strategy::Css, host).await?;
            let Some(element) = hosts.into_iter().next() else {
                return Ok(Vec::new());
            };
            match self.shadow_root(&element).await? {
                Some(next) => root = Some(next),
                None => return Ok(Vec::new()),
            }
        }

        let (using, selector) = locator.query();
        self.find_elements(root.as_ref(), using, &selector).await
    }

    /// Find the first element matching a locator
    ///
    /// An element that goes stale between lookup and name check counts as
    /// missing, the caller's poll loop will look again.
    pub async fn find(&self, locator: &Locator) -> Result<Found> {
        let candidates = self.candidates(locator).await?;

        if let Some(text) = locator.text_filter() {
            // Descendants follow their ancestors, so the last match is innermost
            let needle = text.to_lowercase();
            for element in candidates.into_iter().rev() {
                match self.text(&element).await {
                    Ok(t) if t.to_lowercase().contains(&needle) => return Ok(Found::Element(element)),
                    Ok(_) => {}
                    Err(e) if is_stale(&e) => {}
                    Err(e) => return Err(e),
                }
            }
            return Ok(Found::Missing);
        }

        let Some(pattern) = locator.name_filter() else {
            return Ok(candidates.into_iter().next().map_or(Found::Missing, Found::Element));
        };

        for element in candidates {
            match self.accessible_name(&element).await {
                Ok(name) if pattern.matches(&name) => return Ok(Found::Element(element)),
                Ok(_) => {}
                Err(e) if is_stale(&e) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(Found::Missing)
    }

    /// Name an element the way assistive tech would, roughly:
    /// `aria-label`, then visible text, then the `value` attribute
    async fn accessible_name(&self, element: &ElementRef) -> Result<String> {
        if let Some(label) = self.attribute(element, "aria-label").await? {
            if !label.trim().is_empty() {
                return Ok(label);
            }
        }
        let text = self.text(element).await?;
        if !text.trim().is_empty() {
            return Ok(text);
        }
        Ok(self.attribute(element, "value").await?.unwrap_or_default())
    }

    pub async fn click(&self, element: &ElementRef) -> Result<()> {
        self.command(Method::POST, &format!("element/{}/click", element.0), "element click", Some(json!({})))
            .await?;
        Ok(())
    }

    pub async fn clear(&self, element: &ElementRef) -> Result<()> {
        self.command(Method::POST, &format!("element/{}/clear", element.0), "element clear", Some(json!({})))
            .await?;
        Ok(())
    }

    pub async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()> {
        self.command(
            Method::POST,
            &format!("element/{}/value", element.0),
            "element send keys",
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    pub async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        let value = self
            .command(
                Method::GET,
                &format!("element/{}/attribute/{}", element.0, name),
                "get element attribute",
                None,
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    pub async fn text(&self, element: &ElementRef) -> Result<String> {
        let value = self
            .command(Method::GET, &format!("element/{}/text", element.0), "get element text", None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn is_displayed(&self, element: &ElementRef) -> Result<bool> {
        let value = self
            .command(
                Method::GET,
                &format!("element/{}/displayed", element.0),
                "is element displayed",
                None,
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Enter an iframe, or return to the top-level context with `None`
    pub async fn switch_to_frame(&self, frame: Option<&ElementRef>) -> Result<()> {
        let id = frame.map_or(Value::Null, ElementRef::to_value);
        self.command(Method::POST, "frame", "switch to frame", Some(json!({ "id": id })))
            .await?;
        Ok(())
    }

    /// End the session and close the browser window
    pub async fn close(self) -> Result<()> {
        self.command(Method::DELETE, "", "delete session", None).await?;
        tracing::debug!(session_id = %self.session_id, "Browser session closed");
        Ok(())
    }
}

/// Whether an error came from touching an element that left the DOM
pub fn is_stale(error: &Error) -> bool {
    matches!(error, Error::WebDriver { message, .. } if message.starts_with(WireError::STALE_ELEMENT))
}

fn join(server: &Url, path: &str) -> Result<Url> {
    let base = if server.path().ends_with('/') {
        server.clone()
    } else {
        let mut with_slash = server.clone();
        with_slash.set_path(&format!("{}/", server.path()));
        with_slash
    };
    base.join(path)
        .map_err(|e| Error::Internal(format!("Bad WebDriver endpoint '{}': {}", path, e)))
}

/// Send a WebDriver command and unwrap the `value` envelope
async fn send(
    http: &reqwest::Client,
    method: Method,
    url: Url,
    name: &str,
    body: Option<Value>,
) -> Result<Value> {
    tracing::trace!(command = name, url = %url, "WebDriver >>>");

    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await.map_err(|e| Error::webdriver(name, e.to_string()))?;
    let status = response.status();
    let text = response.text().await.map_err(|e| Error::webdriver(name, e.to_string()))?;

    let envelope: WireResponse = if text.trim().is_empty() {
        WireResponse { value: Value::Null }
    } else {
        serde_json::from_str(&text)
            .map_err(|e| Error::webdriver(name, format!("unreadable response ({}): {}", e, text)))?
    };

    if !status.is_success() {
        let message = match WireError::from_value(&envelope.value) {
            Some(wire) => format!("{}: {}", wire.error, wire.message),
            None => format!("HTTP {}: {}", status.as_u16(), text),
        };
        return Err(Error::webdriver(name, message));
    }

    tracing::trace!(command = name, value = %envelope.value, "WebDriver <<<");
    Ok(envelope.value)
}
