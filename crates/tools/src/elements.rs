//! Element inspection and wait tools.

use std::time::Duration;

use async_trait::async_trait;
use bmcps_core::Result;
use serde_json::{json, Value};

use crate::{required_f64, required_str, Tool, ToolContext, ToolOutput, ToolSchema};

pub struct ListInteractiveElementsTool;

#[async_trait]
impl Tool for ListInteractiveElementsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "list_interactive_elements",
            description: "List form fields and clickable elements on the current page (inputs, \
                textareas, buttons, links). Returns selector, role, label, placeholder, type, \
                and visible text for each. Use these selectors with fill_field and \
                click_element. Browser must be open and a tab attached.",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        let elements = ctx.driver.list_interactive_elements().await?;
        let listing: Vec<Value> = elements
            .iter()
            .map(|element| {
                json!({
                    "selector": element.selector,
                    "role": element.role,
                    "label": element.label,
                    "placeholder": element.placeholder,
                    "type": element.element_type,
                    "text": element.text,
                })
            })
            .collect();
        Ok(ToolOutput::text(format!(
            "Found {} interactive element(s):\n{}",
            listing.len(),
            serde_json::to_string_pretty(&listing)?
        )))
    }
}

pub struct IsVisibleTool;

#[async_trait]
impl Tool for IsVisibleTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "is_visible",
            description: "Check whether the first element matching a CSS selector is visible \
                (has layout and is not hidden by CSS).",
            parameters: json!({
                "type": "object",
                "properties": {"selector": {"type": "string"}},
                "required": ["selector"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let selector = required_str(&params, "selector", "is_visible")?;
        let visible = ctx.driver.is_visible(selector).await?;
        Ok(ToolOutput::text(format!(
            "{selector} is {}.",
            if visible { "visible" } else { "not visible" }
        )))
    }
}

pub struct GetElementBoundingBoxTool;

#[async_trait]
impl Tool for GetElementBoundingBoxTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_element_bounding_box",
            description: "Get the viewport bounding box (x, y, width, height) of the first \
                element matching a CSS selector.",
            parameters: json!({
                "type": "object",
                "properties": {"selector": {"type": "string"}},
                "required": ["selector"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let selector = required_str(&params, "selector", "get_element_bounding_box")?;
        let bounding_box = ctx.driver.get_element_bounding_box(selector).await?;
        let payload = json!({
            "x": bounding_box.x,
            "y": bounding_box.y,
            "width": bounding_box.width,
            "height": bounding_box.height,
        });
        Ok(ToolOutput::text(payload.to_string()))
    }
}

pub struct WaitForSelectorTool;

#[async_trait]
impl Tool for WaitForSelectorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "wait_for_selector",
            description: "Wait until an element matching the CSS selector appears, up to \
                timeout_ms (default 5000).",
            parameters: json!({
                "type": "object",
                "properties": {
                    "selector": {"type": "string"},
                    "timeout_ms": {"type": "integer", "default": 5000}
                },
                "required": ["selector"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let selector = required_str(&params, "selector", "wait_for_selector")?;
        let timeout = params
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .map(Duration::from_millis);
        let waited_ms = ctx.driver.wait_for_selector(selector, timeout).await?;
        Ok(ToolOutput::text(format!(
            "{selector} appeared after {waited_ms} ms."
        )))
    }
}

pub struct WaitTool;

#[async_trait]
impl Tool for WaitTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "wait",
            description: "Sleep for the given number of seconds (fractional allowed, max 60).",
            parameters: json!({
                "type": "object",
                "properties": {"seconds": {"type": "number"}},
                "required": ["seconds"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let seconds = required_f64(&params, "seconds", "wait")?;
        ctx.driver.wait_seconds(seconds).await?;
        Ok(ToolOutput::text(format!("Waited {seconds} second(s).")))
    }
}
