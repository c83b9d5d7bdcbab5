//! JavaScript evaluation, web storage, clipboard.

use std::time::Duration;

use bmcps_core::{Error, Result};
use serde_json::{json, Value};

use crate::driver::BrowserDriver;
use crate::util::{js_escape, sanitize_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Local,
    Session,
}

impl StorageKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "localStorage" => Ok(Self::Local),
            "sessionStorage" => Ok(Self::Session),
            other => Err(Error::Tool(format!(
                "Unknown storage type: {other} (use localStorage or sessionStorage)"
            ))),
        }
    }

    fn object(&self) -> &'static str {
        match self {
            Self::Local => "window.localStorage",
            Self::Session => "window.sessionStorage",
        }
    }
}

impl BrowserDriver {
    /// Evaluate in the page and return the by-value result. Scoped to the
    /// current execution context when a frame switch is active. An exception
    /// is stitched from `exceptionDetails.text` and `exception.description`.
    pub(crate) async fn evaluate_value(
        &self,
        script: &str,
        await_promise: bool,
        timeout: Duration,
    ) -> Result<Value> {
        let mut params = json!({
            "expression": script,
            "returnByValue": true,
        });
        if await_promise {
            params["awaitPromise"] = json!(true);
        }
        let context_id = self.state().current_execution_context();
        if context_id != 0 {
            params["contextId"] = json!(context_id);
        }

        let reply = self
            .send_session_with_timeout("Runtime.evaluate", params, timeout)
            .await?;
        let result = Self::expect_result(reply, "Runtime.evaluate")?;

        if let Some(details) = result.get("exceptionDetails") {
            let text = details.get("text").and_then(Value::as_str).unwrap_or("");
            let description = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(Value::as_str)
                .unwrap_or("");
            let stitched = match (text.is_empty(), description.is_empty()) {
                (false, false) => format!("{text} {description}"),
                (false, true) => text.to_string(),
                (true, false) => description.to_string(),
                (true, true) => "JavaScript exception".to_string(),
            };
            return Err(Error::Protocol(sanitize_text(&stitched)));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Public evaluate verb: the result is handed back serialized, so a
    /// string result keeps its JSON quotes (`"true"` vs `true` is visible).
    pub async fn evaluate_javascript(
        &self,
        script: &str,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let timeout = timeout.unwrap_or_else(|| self.command_timeout());
        let value = self.evaluate_value(script, false, timeout).await?;
        let serialized =
            serde_json::to_string(&value).map_err(|err| Error::Protocol(err.to_string()))?;
        Ok(sanitize_text(&serialized))
    }

    /// Read one key, or the whole store as a JSON object string when no key
    /// is given.
    pub async fn get_storage(&self, kind: StorageKind, key: Option<&str>) -> Result<String> {
        let script = match key {
            Some(key) => format!(
                "(function() {{ var v = {}.getItem('{}'); return v === null ? '' : v; }})()",
                kind.object(),
                js_escape(key)
            ),
            None => format!(
                "(function() {{ var s = {}; var out = {{}}; \
                 for (var i = 0; i < s.length; i++) {{ var k = s.key(i); out[k] = s.getItem(k); }} \
                 return JSON.stringify(out); }})()",
                kind.object()
            ),
        };
        let value = self
            .evaluate_value(&script, false, self.command_timeout())
            .await?;
        Ok(sanitize_text(value.as_str().unwrap_or("")))
    }

    pub async fn set_storage(&self, kind: StorageKind, key: &str, value: &str) -> Result<()> {
        let script = format!(
            "{}.setItem('{}', '{}')",
            kind.object(),
            js_escape(key),
            js_escape(value)
        );
        self.evaluate_value(&script, false, self.command_timeout())
            .await?;
        Ok(())
    }

    /// Clipboard access goes through the page's async clipboard API, so the
    /// evaluation must await the promise.
    pub async fn get_clipboard(&self) -> Result<String> {
        let value = self
            .evaluate_value(
                "navigator.clipboard.readText()",
                true,
                self.command_timeout(),
            )
            .await?;
        Ok(sanitize_text(value.as_str().unwrap_or("")))
    }

    pub async fn set_clipboard(&self, text: &str) -> Result<()> {
        let script = format!(
            "navigator.clipboard.writeText('{}').then(function() {{ return true; }})",
            js_escape(text)
        );
        self.evaluate_value(&script, true, self.command_timeout())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_kind_parses() {
        assert_eq!(StorageKind::parse("localStorage").unwrap(), StorageKind::Local);
        assert_eq!(
            StorageKind::parse("sessionStorage").unwrap(),
            StorageKind::Session
        );
        assert!(StorageKind::parse("cookieJar").is_err());
    }
}
