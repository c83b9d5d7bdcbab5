//! Frame tools.

use async_trait::async_trait;
use bmcps_core::Result;
use serde_json::{json, Value};

use crate::{required_str, Tool, ToolContext, ToolOutput, ToolSchema};

pub struct ListFramesTool;

#[async_trait]
impl Tool for ListFramesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "list_frames",
            description: "List the current page's frames depth-first: frame_id, url, \
                parent_frame_id (empty for the main frame).",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        let frames = ctx.driver.list_frames().await?;
        let listing: Vec<Value> = frames
            .iter()
            .map(|frame| {
                json!({
                    "frame_id": frame.frame_id,
                    "url": frame.url,
                    "parent_frame_id": frame.parent_frame_id,
                })
            })
            .collect();
        Ok(ToolOutput::text(format!(
            "Found {} frame(s):\n{}",
            listing.len(),
            serde_json::to_string_pretty(&listing)?
        )))
    }
}

pub struct SwitchToFrameTool;

#[async_trait]
impl Tool for SwitchToFrameTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "switch_to_frame",
            description: "Scope subsequent evaluate_javascript calls to a frame, addressed by \
                frame id or by index into the list_frames order. Waits for the frame's \
                execution context before succeeding.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "frame": {"type": "string", "description": "Frame id, or a decimal index into list_frames."}
                },
                "required": ["frame"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let frame = required_str(&params, "frame", "switch_to_frame")?;
        let frame_id = ctx.driver.switch_to_frame(frame).await?;
        Ok(ToolOutput::text(format!("Switched to frame {frame_id}.")))
    }
}

pub struct SwitchToMainFrameTool;

#[async_trait]
impl Tool for SwitchToMainFrameTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "switch_to_main_frame",
            description: "Restore evaluation to the main frame's default execution context.",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        ctx.driver.switch_to_main_frame().await?;
        Ok(ToolOutput::text("Switched to main frame."))
    }
}
