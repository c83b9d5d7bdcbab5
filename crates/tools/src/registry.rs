use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::capture::{
    CaptureScreenshotTool, GetOuterHtmlTool, GetPageSourceTool, ResizeBrowserTool,
};
use crate::console::GetConsoleMessagesTool;
use crate::dialogs::{
    AcceptDialogTool, DismissDialogTool, GetDialogMessageTool, SendPromptValueTool,
};
use crate::elements::{
    GetElementBoundingBoxTool, IsVisibleTool, ListInteractiveElementsTool, WaitForSelectorTool,
    WaitTool,
};
use crate::frames::{ListFramesTool, SwitchToFrameTool, SwitchToMainFrameTool};
use crate::input::{
    ClickAtCoordinatesTool, ClickElementTool, DoubleClickElementTool, DragAndDropTool,
    DragFromToTool, FillFieldTool, HoverElementTool, KeyDownTool, KeyPressTool, KeyUpTool,
    RightClickElementTool, ScrollTool, SendKeysTool, UploadFileTool,
};
use crate::lifecycle::{CloseBrowserTool, OpenBrowserTool};
use crate::navigation::{
    GetNavigationHistoryTool, NavigateBackTool, NavigateForwardTool, NavigateTool, RefreshTool,
    WaitForNavigationTool,
};
use crate::network::{
    ClearCookiesTool, GetCookiesTool, GetNetworkRequestsTool, SetCookieTool, SetGeolocationTool,
    SetUserAgentTool,
};
use crate::scripting::{
    EvaluateJavascriptTool, GetClipboardTool, GetStorageTool, SetClipboardTool, SetStorageTool,
};
use crate::tabs::{CloseTabTool, ListTabsTool, NewTabTool, SwitchTabTool};
use crate::{Tool, ToolContext, ToolOutput};

pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        // Browser lifecycle
        registry.register(Arc::new(OpenBrowserTool));
        registry.register(Arc::new(CloseBrowserTool));

        // Tabs
        registry.register(Arc::new(ListTabsTool));
        registry.register(Arc::new(NewTabTool));
        registry.register(Arc::new(SwitchTabTool));
        registry.register(Arc::new(CloseTabTool));

        // Navigation
        registry.register(Arc::new(NavigateTool));
        registry.register(Arc::new(NavigateBackTool));
        registry.register(Arc::new(NavigateForwardTool));
        registry.register(Arc::new(RefreshTool));
        registry.register(Arc::new(GetNavigationHistoryTool));
        registry.register(Arc::new(WaitForNavigationTool));

        // Page capture and window
        registry.register(Arc::new(CaptureScreenshotTool));
        registry.register(Arc::new(GetPageSourceTool));
        registry.register(Arc::new(GetOuterHtmlTool));
        registry.register(Arc::new(ResizeBrowserTool));

        // Console
        registry.register(Arc::new(GetConsoleMessagesTool));

        // Element inspection
        registry.register(Arc::new(ListInteractiveElementsTool));
        registry.register(Arc::new(IsVisibleTool));
        registry.register(Arc::new(GetElementBoundingBoxTool));
        registry.register(Arc::new(WaitForSelectorTool));
        registry.register(Arc::new(WaitTool));

        // Mouse and keyboard
        registry.register(Arc::new(ClickElementTool));
        registry.register(Arc::new(ClickAtCoordinatesTool));
        registry.register(Arc::new(DoubleClickElementTool));
        registry.register(Arc::new(RightClickElementTool));
        registry.register(Arc::new(HoverElementTool));
        registry.register(Arc::new(DragAndDropTool));
        registry.register(Arc::new(DragFromToTool));
        registry.register(Arc::new(FillFieldTool));
        registry.register(Arc::new(SendKeysTool));
        registry.register(Arc::new(KeyPressTool));
        registry.register(Arc::new(KeyDownTool));
        registry.register(Arc::new(KeyUpTool));
        registry.register(Arc::new(ScrollTool));
        registry.register(Arc::new(UploadFileTool));

        // Scripting, storage, clipboard
        registry.register(Arc::new(EvaluateJavascriptTool));
        registry.register(Arc::new(GetStorageTool));
        registry.register(Arc::new(SetStorageTool));
        registry.register(Arc::new(GetClipboardTool));
        registry.register(Arc::new(SetClipboardTool));

        // Frames
        registry.register(Arc::new(ListFramesTool));
        registry.register(Arc::new(SwitchToFrameTool));
        registry.register(Arc::new(SwitchToMainFrameTool));

        // Dialogs
        registry.register(Arc::new(GetDialogMessageTool));
        registry.register(Arc::new(AcceptDialogTool));
        registry.register(Arc::new(DismissDialogTool));
        registry.register(Arc::new(SendPromptValueTool));

        // Network, cookies, overrides
        registry.register(Arc::new(GetNetworkRequestsTool));
        registry.register(Arc::new(GetCookiesTool));
        registry.register(Arc::new(SetCookieTool));
        registry.register(Arc::new(ClearCookiesTool));
        registry.register(Arc::new(SetUserAgentTool));
        registry.register(Arc::new(SetGeolocationTool));

        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.schema().name;
        self.by_name.insert(name, self.tools.len());
        self.tools.push(tool);
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The `tools` array for an MCP tools/list response, in registration
    /// order.
    pub fn list_schemas(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|tool| {
                let schema = tool.schema();
                json!({
                    "name": schema.name,
                    "description": schema.description,
                    "inputSchema": schema.parameters,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    /// Run one tool call. Tool failures come back as `isError` results,
    /// never as Err: nothing throws across the dispatch boundary.
    pub async fn dispatch(&self, ctx: ToolContext, name: &str, arguments: Value) -> ToolOutput {
        let Some(&index) = self.by_name.get(name) else {
            return ToolOutput::error(format!("Unknown tool: {name}"));
        };
        debug!("tool call: {name}");
        match self.tools[index].execute(ctx, arguments).await {
            Ok(output) => output,
            Err(err) => ToolOutput::error(format!("{name} failed: {err}")),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmcps_browser::BrowserDriver;
    use bmcps_core::{Config, Paths};

    fn test_ctx() -> ToolContext {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());
        ToolContext {
            driver: Arc::new(BrowserDriver::new(paths, Config::default())),
        }
    }

    #[test]
    fn default_registry_has_expected_tools() {
        let registry = ToolRegistry::with_defaults();
        assert_eq!(registry.len(), 54);

        let listing = registry.list_schemas();
        let names: Vec<&str> = listing["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|tool| tool["name"].as_str().unwrap())
            .collect();

        for expected in [
            "open_browser",
            "close_browser",
            "navigate",
            "navigate_back",
            "fill_field",
            "click_element",
            "capture_screenshot",
            "get_console_messages",
            "list_interactive_elements",
            "switch_to_frame",
            "get_network_requests",
            "set_geolocation",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }
    }

    #[test]
    fn every_schema_is_an_object_schema() {
        let registry = ToolRegistry::with_defaults();
        for tool in registry.list_schemas()["tools"].as_array().unwrap() {
            assert_eq!(tool["inputSchema"]["type"], json!("object"), "{}", tool["name"]);
            assert!(!tool["description"].as_str().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result() {
        let registry = ToolRegistry::with_defaults();
        let output = registry
            .dispatch(test_ctx(), "no_such_tool", json!({}))
            .await;
        assert!(output.is_error);
    }

    #[tokio::test]
    async fn verbs_without_session_report_precondition() {
        let registry = ToolRegistry::with_defaults();
        let output = registry
            .dispatch(test_ctx(), "navigate", json!({"url": "about:blank"}))
            .await;
        assert!(output.is_error);
        let text = match &output.content[0] {
            crate::ToolContent::Text(text) => text.clone(),
            other => panic!("expected text content, got {other:?}"),
        };
        assert!(
            text.contains("No active browser session. Call open_browser first."),
            "{text}"
        );
    }
}
