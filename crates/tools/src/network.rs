//! Network, cookie and override tools.

use async_trait::async_trait;
use bmcps_core::Result;
use serde_json::{json, Value};

use crate::{optional_str, required_f64, required_str, Tool, ToolContext, ToolOutput, ToolSchema};

pub struct GetNetworkRequestsTool;

#[async_trait]
impl Tool for GetNetworkRequestsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_network_requests",
            description: "List network requests captured on the current tab (request_id, url, \
                method, status). Capture starts on the first call; up to 500 recent requests \
                are kept.",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        let requests = ctx.driver.get_network_requests().await?;
        let listing: Vec<Value> = requests
            .iter()
            .map(|request| {
                json!({
                    "request_id": request.request_id,
                    "url": request.url,
                    "method": request.method,
                    "status_code": request.status_code,
                    "status_text": request.status_text,
                })
            })
            .collect();
        Ok(ToolOutput::text(format!(
            "Captured {} request(s):\n{}",
            listing.len(),
            serde_json::to_string_pretty(&listing)?
        )))
    }
}

pub struct GetCookiesTool;

#[async_trait]
impl Tool for GetCookiesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_cookies",
            description: "Get browser cookies, optionally restricted to those matching a URL.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Optional URL filter."}
                },
                "required": []
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let cookies = ctx.driver.get_cookies(optional_str(&params, "url")).await?;
        Ok(ToolOutput::text(serde_json::to_string_pretty(&cookies)?))
    }
}

pub struct SetCookieTool;

#[async_trait]
impl Tool for SetCookieTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "set_cookie",
            description: "Set a browser cookie. Provide url or domain so the browser can \
                scope it.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "value": {"type": "string"},
                    "url": {"type": "string"},
                    "domain": {"type": "string"},
                    "path": {"type": "string"}
                },
                "required": ["name", "value"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let name = required_str(&params, "name", "set_cookie")?;
        let value = required_str(&params, "value", "set_cookie")?;
        ctx.driver
            .set_cookie(
                name,
                value,
                optional_str(&params, "url"),
                optional_str(&params, "domain"),
                optional_str(&params, "path"),
            )
            .await?;
        Ok(ToolOutput::text(format!("Cookie {name} set.")))
    }
}

pub struct ClearCookiesTool;

#[async_trait]
impl Tool for ClearCookiesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "clear_cookies",
            description: "Clear all browser cookies.",
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<ToolOutput> {
        ctx.driver.clear_cookies().await?;
        Ok(ToolOutput::text("Cookies cleared."))
    }
}

pub struct SetUserAgentTool;

#[async_trait]
impl Tool for SetUserAgentTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "set_user_agent",
            description: "Override the user agent string for the current tab.",
            parameters: json!({
                "type": "object",
                "properties": {"user_agent": {"type": "string"}},
                "required": ["user_agent"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let user_agent = required_str(&params, "user_agent", "set_user_agent")?;
        ctx.driver.set_user_agent(user_agent).await?;
        Ok(ToolOutput::text("User agent set."))
    }
}

pub struct SetGeolocationTool;

#[async_trait]
impl Tool for SetGeolocationTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "set_geolocation",
            description: "Override the geolocation reported to the current tab.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "latitude": {"type": "number"},
                    "longitude": {"type": "number"},
                    "accuracy": {"type": "number", "default": 1.0}
                },
                "required": ["latitude", "longitude"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput> {
        let latitude = required_f64(&params, "latitude", "set_geolocation")?;
        let longitude = required_f64(&params, "longitude", "set_geolocation")?;
        let accuracy = params.get("accuracy").and_then(Value::as_f64);
        ctx.driver
            .set_geolocation(latitude, longitude, accuracy)
            .await?;
        Ok(ToolOutput::text(format!(
            "Geolocation set to ({latitude}, {longitude})."
        )))
    }
}
