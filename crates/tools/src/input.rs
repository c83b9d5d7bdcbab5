//! Mouse and keyboard tools.

use async_trait::async_trait;
use bmcps_core::Result;
use serde_json::{json, Value};

use crate::{
    bool_or, optional_str, required_i64, required_str, Tool, ToolContext, ToolOutput, ToolSchema,
};

fn selector_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "selector": {"type": "string", "description": description}
        },
        "required": ["selector"]
    })
}

pub struct ClickElementTool;

#[async_trait]
impl Tool for ClickElementTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "click_element",
            description: "Click the first element matching a CSS selector. Uses the element's \
                box model and trusted mouse events, falling back to el.click() when no box is \
                available. Use selectors from list_interactive_elements.",
            parameters: selector_schema("CSS selector (e.g. from list_interactive_elements)."),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let selector = required_str(&params, "selector", "click_element")?;
        ctx.driver.click_element(selector).await?;
        Ok(ToolOutput::text(format!("Clicked {selector}.")))
    }
}

pub struct ClickAtCoordinatesTool;

#[async_trait]
impl Tool for ClickAtCoordinatesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "click_at_coordinates",
            description: "Click at viewport coordinates (CSS pixels). Useful for canvas \
                content that has no selectable elements.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "x": {"type": "integer"},
                    "y": {"type": "integer"}
                },
                "required": ["x", "y"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let x = required_i64(&params, "x", "click_at_coordinates")?;
        let y = required_i64(&params, "y", "click_at_coordinates")?;
        ctx.driver.click_at_coordinates(x, y).await?;
        Ok(ToolOutput::text(format!("Clicked at ({x}, {y}).")))
    }
}

pub struct DoubleClickElementTool;

#[async_trait]
impl Tool for DoubleClickElementTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "double_click_element",
            description: "Double-click the first element matching a CSS selector.",
            parameters: selector_schema("CSS selector."),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let selector = required_str(&params, "selector", "double_click_element")?;
        ctx.driver.double_click_element(selector).await?;
        Ok(ToolOutput::text(format!("Double-clicked {selector}.")))
    }
}

pub struct RightClickElementTool;

#[async_trait]
impl Tool for RightClickElementTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "right_click_element",
            description: "Right-click the first element matching a CSS selector.",
            parameters: selector_schema("CSS selector."),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let selector = required_str(&params, "selector", "right_click_element")?;
        ctx.driver.right_click_element(selector).await?;
        Ok(ToolOutput::text(format!("Right-clicked {selector}.")))
    }
}

pub struct HoverElementTool;

#[async_trait]
impl Tool for HoverElementTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "hover_element",
            description: "Move the mouse to the center of the first element matching a CSS \
                selector.",
            parameters: selector_schema("CSS selector."),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let selector = required_str(&params, "selector", "hover_element")?;
        ctx.driver.hover_element(selector).await?;
        Ok(ToolOutput::text(format!("Hovering over {selector}.")))
    }
}

pub struct DragAndDropTool;

#[async_trait]
impl Tool for DragAndDropTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "drag_and_drop",
            description: "Drag from the center of the source element to the center of the \
                target element.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "source_selector": {"type": "string"},
                    "target_selector": {"type": "string"}
                },
                "required": ["source_selector", "target_selector"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let source = required_str(&params, "source_selector", "drag_and_drop")?;
        let target = required_str(&params, "target_selector", "drag_and_drop")?;
        ctx.driver.drag_and_drop(source, target).await?;
        Ok(ToolOutput::text(format!("Dragged {source} onto {target}.")))
    }
}

pub struct DragFromToTool;

#[async_trait]
impl Tool for DragFromToTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "drag_from_to",
            description: "Drag from one viewport coordinate to another (CSS pixels). Useful \
                for canvas interactions.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "x1": {"type": "integer"}, "y1": {"type": "integer"},
                    "x2": {"type": "integer"}, "y2": {"type": "integer"}
                },
                "required": ["x1", "y1", "x2", "y2"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let x1 = required_i64(&params, "x1", "drag_from_to")?;
        let y1 = required_i64(&params, "y1", "drag_from_to")?;
        let x2 = required_i64(&params, "x2", "drag_from_to")?;
        let y2 = required_i64(&params, "y2", "drag_from_to")?;
        ctx.driver.drag_from_to(x1, y1, x2, y2).await?;
        Ok(ToolOutput::text(format!(
            "Dragged from ({x1}, {y1}) to ({x2}, {y2})."
        )))
    }
}

pub struct FillFieldTool;

#[async_trait]
impl Tool for FillFieldTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "fill_field",
            description: "Fill an input or textarea by selector. Use selectors from \
                list_interactive_elements. Optionally clear the field first (default true). \
                Browser must be open and a tab attached.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "selector": {"type": "string", "description": "CSS selector (e.g. from list_interactive_elements)."},
                    "value": {"type": "string", "description": "Text to type into the field."},
                    "clear_first": {"type": "boolean", "description": "Clear the field before typing. Default true.", "default": true}
                },
                "required": ["selector", "value"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let selector = required_str(&params, "selector", "fill_field")?;
        let value = required_str(&params, "value", "fill_field")?;
        let clear_first = bool_or(&params, "clear_first", true);
        ctx.driver.fill_field(selector, value, clear_first).await?;
        Ok(ToolOutput::text(format!("Filled {selector}.")))
    }
}

pub struct SendKeysTool;

#[async_trait]
impl Tool for SendKeysTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "send_keys",
            description: "Type text into the focused element (or focus a selector first).",
            parameters: json!({
                "type": "object",
                "properties": {
                    "keys": {"type": "string", "description": "Text to type."},
                    "selector": {"type": "string", "description": "Optional CSS selector to focus first."}
                },
                "required": ["keys"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let keys = required_str(&params, "keys", "send_keys")?;
        let selector = optional_str(&params, "selector");
        ctx.driver.send_keys(keys, selector).await?;
        Ok(ToolOutput::text("Keys sent."))
    }
}

fn key_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "key": {"type": "string", "description": "Key spec, e.g. 'Enter', 'Tab', 'Ctrl+A'."}
        },
        "required": ["key"]
    })
}

pub struct KeyPressTool;

#[async_trait]
impl Tool for KeyPressTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "key_press",
            description: "Press and release a key (with optional modifiers, e.g. 'Ctrl+A').",
            parameters: key_schema(),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let key = required_str(&params, "key", "key_press")?;
        ctx.driver.key_press(key).await?;
        Ok(ToolOutput::text(format!("Pressed {key}.")))
    }
}

pub struct KeyDownTool;

#[async_trait]
impl Tool for KeyDownTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "key_down",
            description: "Hold a key down (without releasing). Pair with key_up.",
            parameters: key_schema(),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let key = required_str(&params, "key", "key_down")?;
        ctx.driver.key_down(key).await?;
        Ok(ToolOutput::text(format!("Key down: {key}.")))
    }
}

pub struct KeyUpTool;

#[async_trait]
impl Tool for KeyUpTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "key_up",
            description: "Release a key previously held with key_down.",
            parameters: key_schema(),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let key = required_str(&params, "key", "key_up")?;
        ctx.driver.key_up(key).await?;
        Ok(ToolOutput::text(format!("Key up: {key}.")))
    }
}

pub struct ScrollTool;

#[async_trait]
impl Tool for ScrollTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "scroll",
            description: "Scroll the window by (delta_x, delta_y) pixels, or an element when \
                a selector is given.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "delta_x": {"type": "integer", "default": 0},
                    "delta_y": {"type": "integer", "default": 400},
                    "selector": {"type": "string", "description": "Optional element to scroll instead of the window."}
                },
                "required": []
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let dx = params.get("delta_x").and_then(Value::as_i64).unwrap_or(0);
        let dy = params.get("delta_y").and_then(Value::as_i64).unwrap_or(400);
        let selector = optional_str(&params, "selector");
        ctx.driver.scroll(selector, dx, dy).await?;
        Ok(ToolOutput::text(format!("Scrolled by ({dx}, {dy}).")))
    }
}

pub struct UploadFileTool;

#[async_trait]
impl Tool for UploadFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "upload_file",
            description: "Attach a local file to a file input element identified by selector.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "selector": {"type": "string", "description": "CSS selector of the file input."},
                    "file_path": {"type": "string", "description": "Absolute path of the file to attach."}
                },
                "required": ["selector", "file_path"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let selector = required_str(&params, "selector", "upload_file")?;
        let file_path = required_str(&params, "file_path", "upload_file")?;
        ctx.driver.upload_file(selector, file_path).await?;
        Ok(ToolOutput::text(format!(
            "Attached {file_path} to {selector}."
        )))
    }
}
