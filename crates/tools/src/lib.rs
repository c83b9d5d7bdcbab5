//! MCP tool surface over the browser driver: one tool per verb.

pub mod capture;
pub mod console;
pub mod dialogs;
pub mod elements;
pub mod frames;
pub mod input;
pub mod lifecycle;
pub mod navigation;
pub mod network;
pub mod registry;
pub mod scripting;
pub mod tabs;

use std::sync::Arc;

use async_trait::async_trait;
use bmcps_browser::BrowserDriver;
use bmcps_core::{Error, Result};
use serde_json::{json, Value};

pub use registry::ToolRegistry;

/// Context handed to every tool execution: the one driver instance.
#[derive(Clone)]
pub struct ToolContext {
    pub driver: Arc<BrowserDriver>,
}

pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// A block of an MCP tool result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolContent {
    Text(String),
    Image { data: String, mime_type: String },
}

/// The record a tool hands back; the dispatch layer turns it into the MCP
/// `tools/call` result. Errors never cross the dispatch boundary as Err.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: Vec<ToolContent>,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text(message.into())],
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text(message.into())],
            is_error: true,
        }
    }

    pub fn to_mcp(&self) -> Value {
        let content: Vec<Value> = self
            .content
            .iter()
            .map(|block| match block {
                ToolContent::Text(text) => json!({"type": "text", "text": text}),
                ToolContent::Image { data, mime_type } => {
                    json!({"type": "image", "data": data, "mimeType": mime_type})
                }
            })
            .collect();
        json!({"content": content, "isError": self.is_error})
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolOutput>;
}

// -- argument helpers shared by the tool modules --

pub(crate) fn required_str<'a>(params: &'a Value, key: &str, tool: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Tool(format!("{tool} requires a string '{key}'")))
}

pub(crate) fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

pub(crate) fn required_i64(params: &Value, key: &str, tool: &str) -> Result<i64> {
    params
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Tool(format!("{tool} requires an integer '{key}'")))
}

pub(crate) fn required_f64(params: &Value, key: &str, tool: &str) -> Result<f64> {
    params
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::Tool(format!("{tool} requires a number '{key}'")))
}

pub(crate) fn bool_or(params: &Value, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}
