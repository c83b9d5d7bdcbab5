//! Navigation, history, reload, screenshots, page source, window bounds.

use std::time::Duration;

use base64::Engine;
use bmcps_core::{Error, Result};
use serde_json::{json, Value};
use tracing::debug;

use crate::driver::BrowserDriver;
use crate::util::{js_escape, sanitize_text};

const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(30);
/// Decoded screenshot ceiling. Larger captures fail loudly instead of being
/// truncated into a corrupt image.
const SCREENSHOT_MAX_BYTES: usize = 8 * 1024 * 1024;

const NAVIGATION_WAIT_DEFAULT: Duration = Duration::from_secs(10);
const NAVIGATION_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: i64,
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationHistory {
    pub current_index: i64,
    pub entries: Vec<HistoryEntry>,
}

#[derive(Debug, Clone)]
pub struct Screenshot {
    pub image_base64: String,
    pub mime_type: String,
    pub byte_len: usize,
}

impl BrowserDriver {
    /// Navigate the current tab. Success iff the reply carries neither a
    /// protocol error nor a `result.errorText`; the console ring is cleared
    /// because its entries belong to the page being left.
    pub async fn navigate(&self, url: &str) -> Result<String> {
        let reply = self
            .send_session("Page.navigate", json!({"url": url}))
            .await?;
        let result = Self::expect_result(reply, "Page.navigate")?;

        if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
            if !error_text.is_empty() {
                return Err(Error::Protocol(format!("Navigation failed: {error_text}")));
            }
        }

        self.state().clear_console();
        Ok(result
            .get("frameId")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string())
    }

    pub async fn get_navigation_history(&self) -> Result<NavigationHistory> {
        let reply = self
            .send_session("Page.getNavigationHistory", json!({}))
            .await?;
        let result = Self::expect_result(reply, "Page.getNavigationHistory")?;

        let current_index = result
            .get("currentIndex")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let entries = result
            .get("entries")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| HistoryEntry {
                        id: entry.get("id").and_then(Value::as_i64).unwrap_or(0),
                        url: entry
                            .get("url")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                        title: entry
                            .get("title")
                            .and_then(Value::as_str)
                            .map(sanitize_text)
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(NavigationHistory {
            current_index,
            entries,
        })
    }

    pub async fn navigate_back(&self) -> Result<String> {
        self.navigate_history(-1, "No back history.").await
    }

    pub async fn navigate_forward(&self) -> Result<String> {
        self.navigate_history(1, "No forward history.").await
    }

    async fn navigate_history(&self, delta: i64, boundary_error: &str) -> Result<String> {
        let history = self.get_navigation_history().await?;
        let target_index = history.current_index + delta;
        if target_index < 0 || target_index as usize >= history.entries.len() {
            return Err(Error::NotFound(boundary_error.to_string()));
        }
        let entry = &history.entries[target_index as usize];

        let reply = self
            .send_session(
                "Page.navigateToHistoryEntry",
                json!({"entryId": entry.id}),
            )
            .await?;
        Self::expect_result(reply, "Page.navigateToHistoryEntry")?;

        self.state().clear_console();
        Ok(entry.url.clone())
    }

    pub async fn refresh(&self) -> Result<()> {
        let reply = self.send_session("Page.reload", json!({})).await?;
        Self::expect_result(reply, "Page.reload")?;
        self.state().clear_console();
        Ok(())
    }

    /// Poll the document until it reports `complete`, up to `timeout`
    /// (default 10 s).
    pub async fn wait_for_navigation(&self, timeout: Option<Duration>) -> Result<u64> {
        let timeout = timeout.unwrap_or(NAVIGATION_WAIT_DEFAULT);
        let started = tokio::time::Instant::now();

        loop {
            let state = self
                .evaluate_value("document.readyState", false, self.command_timeout())
                .await?;
            if state.as_str() == Some("complete") {
                return Ok(started.elapsed().as_millis() as u64);
            }
            if started.elapsed() >= timeout {
                return Err(Error::Timeout(format!(
                    "Navigation did not complete within {} ms",
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(NAVIGATION_POLL_INTERVAL).await;
        }
    }

    /// Capture the current tab. `format` is jpeg (default, quality 1-100,
    /// default 70) or png.
    pub async fn capture_screenshot(
        &self,
        format: Option<&str>,
        quality: Option<i64>,
    ) -> Result<Screenshot> {
        let format = match format.unwrap_or("jpeg") {
            "png" => "png",
            "jpeg" | "jpg" => "jpeg",
            other => {
                return Err(Error::Tool(format!(
                    "Unsupported screenshot format: {other} (use jpeg or png)"
                )))
            }
        };

        let mut params = json!({"format": format});
        if format == "jpeg" {
            let quality = quality.unwrap_or(70).clamp(1, 100);
            params["quality"] = json!(quality);
        }

        let reply = self
            .send_session_with_timeout("Page.captureScreenshot", params, SCREENSHOT_TIMEOUT)
            .await?;
        let result = Self::expect_result(reply, "Page.captureScreenshot")?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("Page.captureScreenshot returned no data".to_string()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|err| Error::Protocol(format!("screenshot base64 invalid: {err}")))?;
        if bytes.len() > SCREENSHOT_MAX_BYTES {
            return Err(Error::Tool(format!(
                "Screenshot too large ({} bytes, limit {}). Reduce quality or window size.",
                bytes.len(),
                SCREENSHOT_MAX_BYTES
            )));
        }
        debug!("screenshot captured: {} bytes {format}", bytes.len());

        Ok(Screenshot {
            image_base64: data.to_string(),
            mime_type: format!("image/{format}"),
            byte_len: bytes.len(),
        })
    }

    pub async fn get_page_source(&self) -> Result<String> {
        let value = self
            .evaluate_value(
                "document.documentElement.outerHTML",
                false,
                self.command_timeout(),
            )
            .await?;
        Ok(sanitize_text(value.as_str().unwrap_or("")))
    }

    pub async fn get_outer_html(&self, selector: &str) -> Result<String> {
        let script = format!(
            "(function() {{ var el = document.querySelector('{}'); return el ? el.outerHTML : null; }})()",
            js_escape(selector)
        );
        let value = self
            .evaluate_value(&script, false, self.command_timeout())
            .await?;
        match value.as_str() {
            Some(html) => Ok(sanitize_text(html)),
            None => Err(Error::NotFound(format!("Element not found: {selector}"))),
        }
    }

    /// Resize the browser window via the Browser domain (no session).
    pub async fn set_window_bounds(&self, width: i64, height: i64) -> Result<()> {
        let target_id = {
            self.require_session()?;
            self.state().target_id()
        };

        let reply = self
            .send("Browser.getWindowForTarget", json!({"targetId": target_id}))
            .await?;
        let result = Self::expect_result(reply, "Browser.getWindowForTarget")?;
        let window_id = result
            .get("windowId")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                Error::Protocol("Browser.getWindowForTarget returned no windowId".to_string())
            })?;

        let reply = self
            .send(
                "Browser.setWindowBounds",
                json!({"windowId": window_id, "bounds": {"width": width, "height": height}}),
            )
            .await?;
        Self::expect_result(reply, "Browser.setWindowBounds")?;
        Ok(())
    }
}
