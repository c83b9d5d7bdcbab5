//! MCP JSON-RPC method dispatch: initialize, tools/list, tools/call.

use bmcps_tools::{ToolContext, ToolRegistry};
use serde_json::{json, Value};
use tracing::debug;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "bmcps";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Advertised so MCP clients suggest this server for browser-shaped work.
const SERVER_DESCRIPTION: &str =
    "Browser MCP server: controls a real browser (Chrome). Use this server when you need to \
     open URLs, navigate, fill forms, click elements, capture screenshots, manage tabs, read \
     console logs, or perform any browser-based automation. Tools include open_browser, \
     navigate, list_tabs, fill_field, click_element, capture_screenshot, \
     get_console_messages, and more.";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_PARAMS: i64 = -32602;
pub const METHOD_NOT_FOUND: i64 = -32601;

pub fn build_response(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

pub fn build_error_response(id: Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

fn handle_initialize(id: Value) -> Value {
    build_response(
        id,
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}},
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION,
                "description": SERVER_DESCRIPTION,
            }
        }),
    )
}

async fn handle_tools_call(
    ctx: ToolContext,
    registry: &ToolRegistry,
    id: Value,
    params: &Value,
) -> Value {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return build_error_response(id, INVALID_PARAMS, "Missing or invalid 'name' in tools/call");
    };
    let arguments = params
        .get("arguments")
        .filter(|v| v.is_object())
        .cloned()
        .unwrap_or_else(|| json!({}));

    let output = registry.dispatch(ctx, name, arguments).await;
    build_response(id, output.to_mcp())
}

/// Dispatch one JSON-RPC message. Notifications (no id) return None.
pub async fn dispatch_message(
    ctx: ToolContext,
    registry: &ToolRegistry,
    message: &Value,
) -> Option<Value> {
    let method = message.get("method").and_then(Value::as_str).unwrap_or("");
    let id = message.get("id").cloned();

    // Requests carry an id; anything without one is a notification
    // ("notifications/initialized" is the only one we expect).
    let Some(id) = id.filter(|id| !id.is_null()) else {
        debug!("notification: {method}");
        return None;
    };

    Some(match method {
        "initialize" => handle_initialize(id),
        "tools/list" => build_response(id, registry.list_schemas()),
        "tools/call" => {
            let params = message.get("params").cloned().unwrap_or_else(|| json!({}));
            handle_tools_call(ctx, registry, id, &params).await
        }
        other => build_error_response(
            id,
            METHOD_NOT_FOUND,
            &format!("Unknown method: {other}"),
        ),
    })
}
