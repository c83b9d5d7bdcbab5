//! JavaScript dialog tools.

use async_trait::async_trait;
use bmcps_core::Result;
use serde_json::{json, Value};

use crate::{required_str, Tool, ToolContext, ToolOutput, ToolSchema};

pub struct GetDialogMessageTool;

#[async_trait]
impl Tool for GetDialogMessageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_dialog_message",
            description: "Read the pending JavaScript dialog (alert/confirm/prompt/\
                beforeunload) without answering it.",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        let dialog = ctx.driver.get_dialog_message().await?;
        Ok(ToolOutput::text(format!(
            "Dialog ({}): {}",
            dialog.kind, dialog.message
        )))
    }
}

pub struct AcceptDialogTool;

#[async_trait]
impl Tool for AcceptDialogTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "accept_dialog",
            description: "Accept the pending JavaScript dialog (OK).",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        ctx.driver.accept_dialog().await?;
        Ok(ToolOutput::text("Dialog accepted."))
    }
}

pub struct DismissDialogTool;

#[async_trait]
impl Tool for DismissDialogTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dismiss_dialog",
            description: "Dismiss the pending JavaScript dialog (Cancel).",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        ctx.driver.dismiss_dialog().await?;
        Ok(ToolOutput::text("Dialog dismissed."))
    }
}

pub struct SendPromptValueTool;

#[async_trait]
impl Tool for SendPromptValueTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "send_prompt_value",
            description: "Answer the pending prompt dialog with text and accept it.",
            parameters: json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let text = required_str(&params, "text", "send_prompt_value")?;
        ctx.driver.send_prompt_value(text).await?;
        Ok(ToolOutput::text("Prompt answered."))
    }
}
