//! Element inspection: interactive-element listing, visibility, boxes, waits.

use std::time::Duration;

use bmcps_core::{Error, Result};
use serde_json::Value;

use crate::driver::BrowserDriver;
use crate::util::{js_escape, sanitize_text};

const SELECTOR_WAIT_DEFAULT: Duration = Duration::from_secs(5);
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(200);
const INTERACTIVE_ELEMENTS_MAX: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractiveElement {
    /// Stable selector of the form `[data-bmcps-id="N"]`.
    pub selector: String,
    pub role: String,
    pub label: String,
    pub placeholder: String,
    pub element_type: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One in-page pass: select form controls, buttons, anchors and ARIA
/// variants, tag each with a unique data-bmcps-id, and emit a JSON array.
/// The counter lives on `window` so ids survive repeated listings.
const LIST_INTERACTIVE_SCRIPT: &str = r#"(function() {
  var selector = 'input, textarea, select, button, a[href], ' +
    '[role="button"], [role="link"], [role="textbox"], [role="checkbox"], ' +
    '[role="combobox"], [contenteditable="true"]';
  var nodes = document.querySelectorAll(selector);
  if (typeof window.__bmcpsIdCounter !== 'number') window.__bmcpsIdCounter = 0;
  var out = [];
  for (var i = 0; i < nodes.length && out.length < 100; i++) {
    var el = nodes[i];
    var id = el.getAttribute('data-bmcps-id');
    if (!id) {
      id = String(++window.__bmcpsIdCounter);
      el.setAttribute('data-bmcps-id', id);
    }
    var label = el.getAttribute('aria-label') || '';
    if (!label && el.labels && el.labels.length > 0) {
      label = el.labels[0].innerText || '';
    }
    if (!label) label = el.getAttribute('name') || '';
    var text = (el.innerText || el.value || '').trim();
    if (text.length > 80) text = text.slice(0, 80);
    out.push({
      selector: '[data-bmcps-id="' + id + '"]',
      role: el.getAttribute('role') || el.tagName.toLowerCase(),
      label: label.trim(),
      placeholder: el.getAttribute('placeholder') || '',
      type: el.getAttribute('type') || '',
      text: text
    });
  }
  return JSON.stringify(out);
})()"#;

impl BrowserDriver {
    /// List form fields and clickable elements with stable selectors. Every
    /// string that crosses back from the page is sanitized.
    pub async fn list_interactive_elements(&self) -> Result<Vec<InteractiveElement>> {
        let value = self
            .evaluate_value(LIST_INTERACTIVE_SCRIPT, false, self.command_timeout())
            .await?;
        let raw = value
            .as_str()
            .ok_or_else(|| Error::Protocol("element listing returned no JSON".to_string()))?;
        let parsed: Vec<Value> = serde_json::from_str(raw)
            .map_err(|err| Error::Protocol(format!("element listing parse: {err}")))?;

        let field = |entry: &Value, key: &str| -> String {
            sanitize_text(entry.get(key).and_then(Value::as_str).unwrap_or(""))
        };

        Ok(parsed
            .iter()
            .take(INTERACTIVE_ELEMENTS_MAX)
            .map(|entry| InteractiveElement {
                selector: field(entry, "selector"),
                role: field(entry, "role"),
                label: field(entry, "label"),
                placeholder: field(entry, "placeholder"),
                element_type: field(entry, "type"),
                text: field(entry, "text"),
            })
            .collect())
    }

    /// An element is visible when it has layout and is not styled away.
    pub async fn is_visible(&self, selector: &str) -> Result<bool> {
        let script = format!(
            "(function() {{ var el = document.querySelector('{}'); \
             if (!el) return null; \
             var rect = el.getBoundingClientRect(); \
             var style = window.getComputedStyle(el); \
             return rect.width > 0 && rect.height > 0 && \
               style.display !== 'none' && style.visibility !== 'hidden' && \
               style.opacity !== '0'; }})()",
            js_escape(selector)
        );
        let value = self
            .evaluate_value(&script, false, self.command_timeout())
            .await?;
        match value.as_bool() {
            Some(visible) => Ok(visible),
            None => Err(Error::NotFound(format!("Element not found: {selector}"))),
        }
    }

    pub async fn get_element_bounding_box(&self, selector: &str) -> Result<BoundingBox> {
        let script = format!(
            "(function() {{ var el = document.querySelector('{}'); \
             if (!el) return null; var r = el.getBoundingClientRect(); \
             return JSON.stringify({{x: r.x, y: r.y, width: r.width, height: r.height}}); }})()",
            js_escape(selector)
        );
        let value = self
            .evaluate_value(&script, false, self.command_timeout())
            .await?;
        let raw = value
            .as_str()
            .ok_or_else(|| Error::NotFound(format!("Element not found: {selector}")))?;
        let parsed: Value = serde_json::from_str(raw)
            .map_err(|err| Error::Protocol(format!("bounding box parse: {err}")))?;

        let coordinate = |key: &str| parsed.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        Ok(BoundingBox {
            x: coordinate("x"),
            y: coordinate("y"),
            width: coordinate("width"),
            height: coordinate("height"),
        })
    }

    /// Sleep-poll until the selector matches, up to `timeout` (default 5 s).
    /// Returns the wait in milliseconds.
    pub async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Option<Duration>,
    ) -> Result<u64> {
        let timeout = timeout.unwrap_or(SELECTOR_WAIT_DEFAULT);
        let script = format!("!!document.querySelector('{}')", js_escape(selector));
        let started = tokio::time::Instant::now();

        loop {
            let value = self
                .evaluate_value(&script, false, self.command_timeout())
                .await?;
            if value.as_bool() == Some(true) {
                return Ok(started.elapsed().as_millis() as u64);
            }
            if started.elapsed() >= timeout {
                return Err(Error::Timeout(format!(
                    "Element did not appear within {} ms: {selector}",
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    pub async fn wait_seconds(&self, seconds: f64) -> Result<()> {
        self.require_session()?;
        let clamped = seconds.clamp(0.0, 60.0);
        tokio::time::sleep(Duration::from_millis((clamped * 1000.0) as u64)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_script_tags_and_caps() {
        assert!(LIST_INTERACTIVE_SCRIPT.contains("data-bmcps-id"));
        assert!(LIST_INTERACTIVE_SCRIPT.contains("out.length < 100"));
        assert!(LIST_INTERACTIVE_SCRIPT.contains("JSON.stringify(out)"));
    }
}
