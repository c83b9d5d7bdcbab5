//! The stdio serve loop: frame stdin, dispatch, write responses to stdout.
//! Stdout belongs to the MCP client; all logging goes to stderr.

use std::sync::Arc;

use bmcps_browser::BrowserDriver;
use bmcps_core::{Config, Paths};
use bmcps_tools::{ToolContext, ToolRegistry};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{error, info};

use crate::dispatch::{self, build_error_response, PARSE_ERROR};
use crate::framing::MessageFramer;

pub async fn run(paths: Paths, config: Config) -> i32 {
    let driver = Arc::new(BrowserDriver::new(paths, config));
    let registry = ToolRegistry::with_defaults();
    let ctx = ToolContext {
        driver: Arc::clone(&driver),
    };

    info!("bmcps started. Waiting for MCP messages on stdin.");

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut framer = MessageFramer::new();
    let mut chunk = [0u8; 8192];
    let mut parsed_any = false;
    let mut saw_parse_failure = false;

    'serve: loop {
        let read = tokio::select! {
            read = stdin.read(&mut chunk) => read,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received. Shutting down.");
                break 'serve;
            }
        };

        let bytes = match read {
            Ok(0) => {
                info!("EOF on stdin. Shutting down.");
                break 'serve;
            }
            Ok(bytes) => bytes,
            Err(err) => {
                error!("stdin read error: {err}");
                break 'serve;
            }
        };

        for raw in framer.feed(&chunk[..bytes]) {
            let message: Value = match serde_json::from_str(&raw) {
                Ok(message) => message,
                Err(err) => {
                    error!("Failed to parse incoming JSON: {err}");
                    saw_parse_failure = true;
                    let response = build_error_response(Value::Null, PARSE_ERROR, "Parse error");
                    write_message(&mut stdout, &response).await;
                    continue;
                }
            };
            parsed_any = true;

            if let Some(response) =
                dispatch::dispatch_message(ctx.clone(), &registry, &message).await
            {
                write_message(&mut stdout, &response).await;
            }
        }
    }

    // Teardown: drop the socket, kill the Chrome we own (never an adopted
    // one), regardless of how the loop ended.
    if let Err(err) = driver.close_browser().await {
        error!("teardown: {err}");
    }
    info!("bmcps shut down.");

    // Exit 1 only when the input stream never yielded a single valid
    // message (informational for the operator; the client is gone anyway).
    if saw_parse_failure && !parsed_any {
        1
    } else {
        0
    }
}

async fn write_message(stdout: &mut tokio::io::Stdout, message: &Value) {
    let mut line = message.to_string();
    line.push('\n');
    if let Err(err) = stdout.write_all(line.as_bytes()).await {
        error!("stdout write error: {err}");
        return;
    }
    let _ = stdout.flush().await;
}
