//! Mouse and keyboard verbs: clicks, hover, drag, fill, keys, scroll, upload.

use bmcps_core::{Error, Result};
use serde_json::{json, Value};
use tracing::debug;

use crate::driver::BrowserDriver;
use crate::util::{box_model_center, js_escape};

impl BrowserDriver {
    /// Resolve a selector to its DOM nodeId. 0 means not found.
    async fn query_selector_node(&self, selector: &str) -> Result<i64> {
        self.ensure_dom_enabled().await?;

        let reply = self.send_session("DOM.getDocument", json!({})).await?;
        let result = Self::expect_result(reply, "DOM.getDocument")?;
        let root_id = result
            .get("root")
            .and_then(|root| root.get("nodeId"))
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Protocol("DOM.getDocument returned no root".to_string()))?;

        let reply = self
            .send_session(
                "DOM.querySelector",
                json!({"nodeId": root_id, "selector": selector}),
            )
            .await?;
        let result = Self::expect_result(reply, "DOM.querySelector")?;
        Ok(result.get("nodeId").and_then(Value::as_i64).unwrap_or(0))
    }

    /// Center of the element's box-model content quad, in CSS pixels.
    async fn element_center(&self, selector: &str) -> Result<(f64, f64)> {
        let node_id = self.query_selector_node(selector).await?;
        if node_id == 0 {
            return Err(Error::NotFound(format!("Element not found: {selector}")));
        }

        let reply = self
            .send_session("DOM.getBoxModel", json!({"nodeId": node_id}))
            .await?;
        let result = Self::expect_result(reply, "DOM.getBoxModel")?;
        let content: Vec<f64> = result
            .get("model")
            .and_then(|model| model.get("content"))
            .and_then(Value::as_array)
            .map(|quad| quad.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default();

        box_model_center(&content)
            .ok_or_else(|| Error::Protocol(format!("No box model for element: {selector}")))
    }

    async fn dispatch_mouse(
        &self,
        event_type: &str,
        x: f64,
        y: f64,
        button: &str,
        click_count: i64,
    ) -> Result<()> {
        let mut params = json!({
            "type": event_type,
            "x": x,
            "y": y,
            "button": button,
        });
        if click_count > 0 {
            params["clickCount"] = json!(click_count);
        }
        let reply = self
            .send_session("Input.dispatchMouseEvent", params)
            .await?;
        Self::expect_result(reply, "Input.dispatchMouseEvent")?;
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64, button: &str, click_count: i64) -> Result<()> {
        self.dispatch_mouse("mousePressed", x, y, button, click_count)
            .await?;
        self.dispatch_mouse("mouseReleased", x, y, button, click_count)
            .await
    }

    /// Click via box-model center and trusted mouse events. Any failure in
    /// that pipeline falls back to `el.click()` in the page, which covers
    /// elements without a box (e.g. zero-size overlay targets).
    pub async fn click_element(&self, selector: &str) -> Result<()> {
        match self.element_center(selector).await {
            Ok((x, y)) => self.click_at(x, y, "left", 1).await,
            Err(err) => {
                debug!("box-model click failed for {selector} ({err}); falling back to el.click()");
                self.click_fallback(selector).await
            }
        }
    }

    async fn click_fallback(&self, selector: &str) -> Result<()> {
        let script = format!(
            "(function() {{ var el = document.querySelector('{}'); \
             if (!el) return false; el.click(); return true; }})()",
            js_escape(selector)
        );
        let clicked = self
            .evaluate_value(&script, false, self.command_timeout())
            .await?;
        if clicked.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("Element not found: {selector}")))
        }
    }

    pub async fn double_click_element(&self, selector: &str) -> Result<()> {
        let (x, y) = self.element_center(selector).await?;
        self.click_at(x, y, "left", 2).await
    }

    pub async fn right_click_element(&self, selector: &str) -> Result<()> {
        let (x, y) = self.element_center(selector).await?;
        self.click_at(x, y, "right", 1).await
    }

    pub async fn hover_element(&self, selector: &str) -> Result<()> {
        let (x, y) = self.element_center(selector).await?;
        self.dispatch_mouse("mouseMoved", x, y, "none", 0).await
    }

    /// Click at viewport coordinates (canvas targets have no selector).
    pub async fn click_at_coordinates(&self, x: i64, y: i64) -> Result<()> {
        self.require_session()?;
        self.click_at(x as f64, y as f64, "left", 1).await
    }

    pub async fn drag_and_drop(&self, source: &str, target: &str) -> Result<()> {
        let (sx, sy) = self.element_center(source).await?;
        let (tx, ty) = self.element_center(target).await?;
        self.drag_path(sx, sy, tx, ty).await
    }

    pub async fn drag_from_to(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> Result<()> {
        self.require_session()?;
        self.drag_path(x1 as f64, y1 as f64, x2 as f64, y2 as f64)
            .await
    }

    async fn drag_path(&self, sx: f64, sy: f64, tx: f64, ty: f64) -> Result<()> {
        self.dispatch_mouse("mousePressed", sx, sy, "left", 1).await?;
        self.dispatch_mouse("mouseMoved", tx, ty, "left", 0).await?;
        self.dispatch_mouse("mouseReleased", tx, ty, "left", 1).await
    }

    /// Focus the field, optionally clear it (with input+change events so
    /// framework bindings notice), then type through Input.insertText.
    pub async fn fill_field(&self, selector: &str, value: &str, clear_first: bool) -> Result<()> {
        let clear_block = if clear_first {
            "el.value = ''; \
             el.dispatchEvent(new Event('input', {bubbles: true})); \
             el.dispatchEvent(new Event('change', {bubbles: true}));"
        } else {
            ""
        };
        let script = format!(
            "(function() {{ var el = document.querySelector('{}'); \
             if (!el) return false; el.focus(); {} return true; }})()",
            js_escape(selector),
            clear_block
        );
        let focused = self
            .evaluate_value(&script, false, self.command_timeout())
            .await?;
        if focused.as_bool() != Some(true) {
            return Err(Error::NotFound(format!("Element not found: {selector}")));
        }

        let reply = self
            .send_session("Input.insertText", json!({"text": value}))
            .await?;
        Self::expect_result(reply, "Input.insertText")?;
        Ok(())
    }

    /// Type text into the focused element, optionally focusing a selector
    /// first.
    pub async fn send_keys(&self, keys: &str, selector: Option<&str>) -> Result<()> {
        if let Some(selector) = selector {
            if !selector.is_empty() {
                let script = format!(
                    "(function() {{ var el = document.querySelector('{}'); \
                     if (!el) return false; el.focus(); return true; }})()",
                    js_escape(selector)
                );
                let focused = self
                    .evaluate_value(&script, false, self.command_timeout())
                    .await?;
                if focused.as_bool() != Some(true) {
                    return Err(Error::NotFound(format!("Element not found: {selector}")));
                }
            }
        }

        let reply = self
            .send_session("Input.insertText", json!({"text": keys}))
            .await?;
        Self::expect_result(reply, "Input.insertText")?;
        Ok(())
    }

    pub async fn key_press(&self, key: &str) -> Result<()> {
        let spec = parse_key_spec(key);
        self.dispatch_key("keyDown", &spec).await?;
        self.dispatch_key("keyUp", &spec).await
    }

    pub async fn key_down(&self, key: &str) -> Result<()> {
        let spec = parse_key_spec(key);
        self.dispatch_key("keyDown", &spec).await
    }

    pub async fn key_up(&self, key: &str) -> Result<()> {
        let spec = parse_key_spec(key);
        self.dispatch_key("keyUp", &spec).await
    }

    async fn dispatch_key(&self, event_type: &str, spec: &KeySpec) -> Result<()> {
        let mut params = json!({
            "type": event_type,
            "key": spec.key,
            "code": spec.code,
        });
        if spec.modifiers != 0 {
            params["modifiers"] = json!(spec.modifiers);
        }
        if event_type == "keyDown" {
            if let Some(text) = &spec.text {
                params["text"] = json!(text);
            }
        }
        let reply = self.send_session("Input.dispatchKeyEvent", params).await?;
        Self::expect_result(reply, "Input.dispatchKeyEvent")?;
        Ok(())
    }

    /// Scroll the window, or an element when a selector is given.
    pub async fn scroll(&self, selector: Option<&str>, dx: i64, dy: i64) -> Result<()> {
        let script = match selector.filter(|s| !s.is_empty()) {
            Some(selector) => format!(
                "(function() {{ var el = document.querySelector('{}'); \
                 if (!el) return false; el.scrollBy({dx}, {dy}); return true; }})()",
                js_escape(selector)
            ),
            None => format!("(function() {{ window.scrollBy({dx}, {dy}); return true; }})()"),
        };
        let scrolled = self
            .evaluate_value(&script, false, self.command_timeout())
            .await?;
        if scrolled.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(Error::NotFound(
                selector
                    .map(|s| format!("Element not found: {s}"))
                    .unwrap_or_else(|| "Scroll target not found".to_string()),
            ))
        }
    }

    /// Attach a local file to a file input.
    pub async fn upload_file(&self, selector: &str, file_path: &str) -> Result<()> {
        if !std::path::Path::new(file_path).exists() {
            return Err(Error::NotFound(format!("File not found: {file_path}")));
        }

        let node_id = self.query_selector_node(selector).await?;
        if node_id == 0 {
            return Err(Error::NotFound(format!("File input not found: {selector}")));
        }

        let reply = self
            .send_session(
                "DOM.setFileInputFiles",
                json!({"files": [file_path], "nodeId": node_id}),
            )
            .await?;
        Self::expect_result(reply, "DOM.setFileInputFiles")?;
        Ok(())
    }
}

struct KeySpec {
    key: String,
    code: String,
    modifiers: i64,
    text: Option<String>,
}

/// Parse a key spec like `Enter`, `Ctrl+A`, `Ctrl+Shift+Tab`. Modifier bits
/// follow CDP: Alt=1, Ctrl=2, Meta=4, Shift=8.
fn parse_key_spec(spec: &str) -> KeySpec {
    let parts: Vec<&str> = spec.split('+').collect();
    let mut modifiers = 0i64;
    let mut main_key = spec.to_string();

    if parts.len() > 1 {
        for part in &parts[..parts.len() - 1] {
            match part.to_ascii_lowercase().as_str() {
                "alt" | "option" => modifiers |= 1,
                "ctrl" | "control" => modifiers |= 2,
                "meta" | "cmd" | "command" => modifiers |= 4,
                "shift" => modifiers |= 8,
                _ => {}
            }
        }
        main_key = parts.last().copied().unwrap_or(spec).to_string();
    }

    let (key, code) = match main_key.as_str() {
        "Enter" | "Return" => ("Enter", "Enter"),
        "Tab" => ("Tab", "Tab"),
        "Escape" | "Esc" => ("Escape", "Escape"),
        "Backspace" => ("Backspace", "Backspace"),
        "Delete" => ("Delete", "Delete"),
        "ArrowUp" | "Up" => ("ArrowUp", "ArrowUp"),
        "ArrowDown" | "Down" => ("ArrowDown", "ArrowDown"),
        "ArrowLeft" | "Left" => ("ArrowLeft", "ArrowLeft"),
        "ArrowRight" | "Right" => ("ArrowRight", "ArrowRight"),
        "Home" => ("Home", "Home"),
        "End" => ("End", "End"),
        "PageUp" => ("PageUp", "PageUp"),
        "PageDown" => ("PageDown", "PageDown"),
        "Space" | " " => (" ", "Space"),
        _ => {
            if main_key.chars().count() == 1 {
                let code = format!("Key{}", main_key.to_uppercase());
                return KeySpec {
                    text: Some(main_key.clone()),
                    key: main_key,
                    code,
                    modifiers,
                };
            }
            let key = main_key.clone();
            return KeySpec {
                code: key.clone(),
                key,
                modifiers,
                text: None,
            };
        }
    };

    let text = match key {
        "Enter" => Some("\r".to_string()),
        " " => Some(" ".to_string()),
        _ => None,
    };

    KeySpec {
        key: key.to_string(),
        code: code.to_string(),
        modifiers,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_key() {
        let spec = parse_key_spec("Enter");
        assert_eq!(spec.key, "Enter");
        assert_eq!(spec.code, "Enter");
        assert_eq!(spec.modifiers, 0);
        assert_eq!(spec.text.as_deref(), Some("\r"));
    }

    #[test]
    fn modified_letter() {
        let spec = parse_key_spec("Ctrl+A");
        assert_eq!(spec.key, "A");
        assert_eq!(spec.code, "KeyA");
        assert_eq!(spec.modifiers, 2);
    }

    #[test]
    fn stacked_modifiers() {
        let spec = parse_key_spec("Ctrl+Shift+Tab");
        assert_eq!(spec.key, "Tab");
        assert_eq!(spec.code, "Tab");
        assert_eq!(spec.modifiers, 10);
        assert!(spec.text.is_none());
    }

    #[test]
    fn printable_character_carries_text() {
        let spec = parse_key_spec("a");
        assert_eq!(spec.key, "a");
        assert_eq!(spec.code, "KeyA");
        assert_eq!(spec.text.as_deref(), Some("a"));
    }
}
