//! JavaScript evaluation, storage, clipboard tools.

use std::time::Duration;

use async_trait::async_trait;
use bmcps_browser::eval::StorageKind;
use bmcps_core::Result;
use serde_json::{json, Value};

use crate::{optional_str, required_str, Tool, ToolContext, ToolOutput, ToolSchema};

pub struct EvaluateJavascriptTool;

#[async_trait]
impl Tool for EvaluateJavascriptTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "evaluate_javascript",
            description: "Evaluate a JavaScript expression in the current page (scoped to the \
                current frame after switch_to_frame) and return the JSON-serialized result.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "script": {"type": "string", "description": "JavaScript expression to evaluate."},
                    "timeout_ms": {"type": "integer", "default": 10000}
                },
                "required": ["script"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let script = required_str(&params, "script", "evaluate_javascript")?;
        let timeout = params
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .map(Duration::from_millis);
        let serialized = ctx.driver.evaluate_javascript(script, timeout).await?;
        Ok(ToolOutput::text(serialized))
    }
}

fn storage_properties() -> Value {
    json!({
        "storage_type": {
            "type": "string",
            "enum": ["localStorage", "sessionStorage"]
        },
        "key": {"type": "string"},
        "value": {"type": "string"}
    })
}

pub struct GetStorageTool;

#[async_trait]
impl Tool for GetStorageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_storage",
            description: "Read localStorage or sessionStorage. With a key, returns that \
                value; without, returns the whole store as a JSON object string.",
            parameters: json!({
                "type": "object",
                "properties": storage_properties(),
                "required": ["storage_type"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let kind = StorageKind::parse(required_str(&params, "storage_type", "get_storage")?)?;
        let key = optional_str(&params, "key");
        let value = ctx.driver.get_storage(kind, key).await?;
        Ok(ToolOutput::text(value))
    }
}

pub struct SetStorageTool;

#[async_trait]
impl Tool for SetStorageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "set_storage",
            description: "Set a key in localStorage or sessionStorage.",
            parameters: json!({
                "type": "object",
                "properties": storage_properties(),
                "required": ["storage_type", "key", "value"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let kind = StorageKind::parse(required_str(&params, "storage_type", "set_storage")?)?;
        let key = required_str(&params, "key", "set_storage")?;
        let value = required_str(&params, "value", "set_storage")?;
        ctx.driver.set_storage(kind, key, value).await?;
        Ok(ToolOutput::text(format!("Stored {key}.")))
    }
}

pub struct GetClipboardTool;

#[async_trait]
impl Tool for GetClipboardTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_clipboard",
            description: "Read the page clipboard via navigator.clipboard.readText(). May \
                require a prior user gesture in some contexts.",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        let text = ctx.driver.get_clipboard().await?;
        Ok(ToolOutput::text(text))
    }
}

pub struct SetClipboardTool;

#[async_trait]
impl Tool for SetClipboardTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "set_clipboard",
            description: "Write text to the page clipboard via navigator.clipboard.writeText().",
            parameters: json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let text = required_str(&params, "text", "set_clipboard")?;
        ctx.driver.set_clipboard(text).await?;
        Ok(ToolOutput::text("Clipboard set."))
    }
}
