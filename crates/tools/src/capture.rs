//! Screenshots, page source, window sizing.

use async_trait::async_trait;
use bmcps_core::Result;
use serde_json::{json, Value};

use crate::{
    optional_str, required_i64, required_str, Tool, ToolContent, ToolContext, ToolOutput,
    ToolSchema,
};

pub struct CaptureScreenshotTool;

#[async_trait]
impl Tool for CaptureScreenshotTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "capture_screenshot",
            description: "Capture a screenshot of the current tab as jpeg (default, quality \
                1-100, default 70) or png. Returns the image as base64 content.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "format": {"type": "string", "enum": ["jpeg", "png"], "default": "jpeg"},
                    "quality": {"type": "integer", "minimum": 1, "maximum": 100, "default": 70,
                                "description": "JPEG quality; ignored for png."}
                },
                "required": []
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let format = optional_str(&params, "format");
        let quality = params.get("quality").and_then(Value::as_i64);
        let shot = ctx.driver.capture_screenshot(format, quality).await?;
        Ok(ToolOutput {
            content: vec![
                ToolContent::Text(format!(
                    "Screenshot captured ({} bytes, {}).",
                    shot.byte_len, shot.mime_type
                )),
                ToolContent::Image {
                    data: shot.image_base64,
                    mime_type: shot.mime_type,
                },
            ],
            is_error: false,
        })
    }
}

pub struct GetPageSourceTool;

#[async_trait]
impl Tool for GetPageSourceTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_page_source",
            description: "Return the full HTML source (outerHTML of the document element) of \
                the current tab.",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        let html = ctx.driver.get_page_source().await?;
        Ok(ToolOutput::text(html))
    }
}

pub struct GetOuterHtmlTool;

#[async_trait]
impl Tool for GetOuterHtmlTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_outer_html",
            description: "Return the outerHTML of the first element matching a CSS selector.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "selector": {"type": "string", "description": "CSS selector."}
                },
                "required": ["selector"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let selector = required_str(&params, "selector", "get_outer_html")?;
        let html = ctx.driver.get_outer_html(selector).await?;
        Ok(ToolOutput::text(html))
    }
}

pub struct ResizeBrowserTool;

#[async_trait]
impl Tool for ResizeBrowserTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "resize_browser",
            description: "Resize the browser window containing the current tab.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "width": {"type": "integer", "description": "Window width in pixels."},
                    "height": {"type": "integer", "description": "Window height in pixels."}
                },
                "required": ["width", "height"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let width = required_i64(&params, "width", "resize_browser")?;
        let height = required_i64(&params, "height", "resize_browser")?;
        ctx.driver.set_window_bounds(width, height).await?;
        Ok(ToolOutput::text(format!(
            "Window resized to {width}x{height}."
        )))
    }
}
