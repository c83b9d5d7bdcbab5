//! Tab management tools.

use async_trait::async_trait;
use bmcps_core::Result;
use serde_json::{json, Value};

use crate::{optional_str, required_i64, Tool, ToolContext, ToolOutput, ToolSchema};

pub struct ListTabsTool;

#[async_trait]
impl Tool for ListTabsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "list_tabs",
            description: "List all browser targets (tabs, workers) with target_id, title, url \
                and type. Browser must be open.",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        let tabs = ctx.driver.list_tabs().await?;
        let listing: Vec<Value> = tabs
            .iter()
            .map(|tab| {
                json!({
                    "target_id": tab.target_id,
                    "title": tab.title,
                    "url": tab.url,
                    "type": tab.kind,
                })
            })
            .collect();
        Ok(ToolOutput::text(format!(
            "Found {} target(s):\n{}",
            listing.len(),
            serde_json::to_string_pretty(&listing)?
        )))
    }
}

pub struct NewTabTool;

#[async_trait]
impl Tool for NewTabTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "new_tab",
            description: "Open a new tab (about:blank unless a url is given) and attach to it \
                as the current tab.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "URL to open in the new tab. Default about:blank."}
                },
                "required": []
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let target_id = ctx.driver.new_tab(optional_str(&params, "url")).await?;
        Ok(ToolOutput::text(format!(
            "New tab opened and attached (target {target_id})."
        )))
    }
}

pub struct SwitchTabTool;

#[async_trait]
impl Tool for SwitchTabTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "switch_tab",
            description: "Switch to a page tab by 0-based index (ordering matches list_tabs \
                restricted to page targets, sorted by target id).",
            parameters: json!({
                "type": "object",
                "properties": {
                    "index": {"type": "integer", "description": "0-based page tab index."}
                },
                "required": ["index"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let index = required_i64(&params, "index", "switch_tab")?;
        let target_id = ctx.driver.switch_tab(index).await?;
        Ok(ToolOutput::text(format!(
            "Switched to tab {index} (target {target_id})."
        )))
    }
}

pub struct CloseTabTool;

#[async_trait]
impl Tool for CloseTabTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "close_tab",
            description: "Close the current tab. If other page tabs remain, the first one \
                becomes current; closing the only tab leaves no tab attached.",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        let closed = ctx.driver.close_tab().await?;
        Ok(ToolOutput::text(format!("Tab closed ({closed}).")))
    }
}
