//! open_browser / close_browser.

use async_trait::async_trait;
use bmcps_browser::OpenBrowserOptions;
use bmcps_core::Result;
use serde_json::{json, Value};

use crate::{bool_or, Tool, ToolContext, ToolOutput, ToolSchema};

pub struct OpenBrowserTool;

#[async_trait]
impl Tool for OpenBrowserTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "open_browser",
            description: "Launch a browser (Chrome) and connect to it via CDP. \
                Discovers available tabs and attaches to the default page tab. \
                Must be called before navigate or other browser tools.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "disable_translate": {
                        "type": "boolean",
                        "default": true,
                        "description": "Launch with --disable-translate and never adopt an already-running Chrome. Set false to allow adoption."
                    }
                },
                "required": []
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let options = OpenBrowserOptions {
            disable_translate: bool_or(&params, "disable_translate", true),
        };
        let message = ctx.driver.open_browser(options).await?;
        Ok(ToolOutput::text(message))
    }
}

pub struct CloseBrowserTool;

#[async_trait]
impl Tool for CloseBrowserTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "close_browser",
            description: "Close the CDP connection and terminate the Chrome process if this \
                server launched it. An adopted Chrome is left running.",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        let message = ctx.driver.close_browser().await?;
        Ok(ToolOutput::text(message))
    }
}
