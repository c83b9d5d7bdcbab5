//! Navigation tools.

use std::time::Duration;

use async_trait::async_trait;
use bmcps_core::Result;
use serde_json::{json, Value};

use crate::{required_str, Tool, ToolContext, ToolOutput, ToolSchema};

pub struct NavigateTool;

#[async_trait]
impl Tool for NavigateTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "navigate",
            description: "Navigate the current tab to a URL. Browser must be open and a tab \
                attached (call open_browser first). Clears the console buffer on success.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Absolute URL (including scheme) to load."}
                },
                "required": ["url"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let url = required_str(&params, "url", "navigate")?;
        ctx.driver.navigate(url).await?;
        Ok(ToolOutput::text(format!("Navigated to {url}.")))
    }
}

pub struct NavigateBackTool;

#[async_trait]
impl Tool for NavigateBackTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "navigate_back",
            description: "Go back one entry in the current tab's history. Fails when there is \
                no back history.",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        let url = ctx.driver.navigate_back().await?;
        Ok(ToolOutput::text(format!("Went back to {url}.")))
    }
}

pub struct NavigateForwardTool;

#[async_trait]
impl Tool for NavigateForwardTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "navigate_forward",
            description: "Go forward one entry in the current tab's history. Fails when there \
                is no forward history.",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        let url = ctx.driver.navigate_forward().await?;
        Ok(ToolOutput::text(format!("Went forward to {url}.")))
    }
}

pub struct RefreshTool;

#[async_trait]
impl Tool for RefreshTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "refresh",
            description: "Reload the current tab. Clears the console buffer.",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        ctx.driver.refresh().await?;
        Ok(ToolOutput::text("Page reloaded."))
    }
}

pub struct GetNavigationHistoryTool;

#[async_trait]
impl Tool for GetNavigationHistoryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_navigation_history",
            description: "Get the current tab's navigation history: entries (id, url, title) \
                and the current index.",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        let history = ctx.driver.get_navigation_history().await?;
        let entries: Vec<Value> = history
            .entries
            .iter()
            .map(|entry| json!({"id": entry.id, "url": entry.url, "title": entry.title}))
            .collect();
        let payload = json!({
            "current_index": history.current_index,
            "entries": entries,
        });
        Ok(ToolOutput::text(serde_json::to_string_pretty(&payload)?))
    }
}

pub struct WaitForNavigationTool;

#[async_trait]
impl Tool for WaitForNavigationTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "wait_for_navigation",
            description: "Wait until the document reports readyState=complete, up to \
                timeout_ms (default 10000).",
            parameters: json!({
                "type": "object",
                "properties": {
                    "timeout_ms": {"type": "integer", "default": 10000}
                },
                "required": []
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let timeout = params
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .map(Duration::from_millis);
        let waited_ms = ctx.driver.wait_for_navigation(timeout).await?;
        Ok(ToolOutput::text(format!(
            "Navigation complete after {waited_ms} ms."
        )))
    }
}
