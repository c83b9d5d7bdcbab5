//! WebSocket transport: one unencrypted client connection to Chrome.
//!
//! The transport never interprets payloads beyond end-of-message detection.
//! Inbound whole JSON messages are handed to the [`MessageSink`] supplied at
//! connect time; the correlator implements that sink, so neither side holds
//! a back-pointer to the other.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const OUTBOUND_QUEUE: usize = 256;

/// Inbox for fully parsed inbound messages.
pub trait MessageSink: Send + Sync + 'static {
    fn on_message(&self, message: Value);
    fn on_closed(&self);
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid CDP WebSocket URL: {0}")]
    BadUrl(String),
    #[error("CDP WebSocket connection failed: {0}")]
    ConnectFailed(String),
    #[error("timed out connecting to CDP WebSocket (after 20 s)")]
    ConnectTimeout,
    #[error("CDP WebSocket send failed: {0}")]
    SendFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsEndpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl WsEndpoint {
    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Split a `ws://host:port/path` URL. Host defaults to 127.0.0.1, port to
/// 9222, path to `/`. No TLS, no subprotocol.
pub fn parse_ws_url(url: &str) -> Result<WsEndpoint, TransportError> {
    let without_scheme = url.strip_prefix("ws://").unwrap_or(url);
    if without_scheme.is_empty() {
        return Err(TransportError::BadUrl(url.to_string()));
    }

    let (host_and_port, path) = match without_scheme.find('/') {
        Some(slash) => (
            &without_scheme[..slash],
            without_scheme[slash..].to_string(),
        ),
        None => (without_scheme, "/".to_string()),
    };

    let (host, port) = match host_and_port.find(':') {
        Some(colon) => {
            let host = &host_and_port[..colon];
            let port: u16 = host_and_port[colon + 1..]
                .parse()
                .map_err(|_| TransportError::BadUrl(url.to_string()))?;
            (host, port)
        }
        None => (host_and_port, 9222),
    };

    let host = if host.is_empty() { "127.0.0.1" } else { host };

    Ok(WsEndpoint {
        host: host.to_string(),
        port,
        path,
    })
}

/// Handle to a live connection. Dropping it closes the outbound queue,
/// which ends the writer task and with it the socket.
pub struct Transport {
    outbound: mpsc::Sender<String>,
}

impl Transport {
    pub async fn connect(url: &str, sink: Arc<dyn MessageSink>) -> Result<Self, TransportError> {
        let endpoint = parse_ws_url(url)?;
        let canonical = endpoint.url();
        debug!("connecting to CDP WebSocket: {canonical}");

        let connect = connect_async(canonical.as_str());
        let (stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| TransportError::ConnectTimeout)?
            .map_err(|err| TransportError::ConnectFailed(err.to_string()))?;

        let (mut ws_sink, mut ws_stream) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);

        // Writer: serialize each queued message as a single text frame.
        tokio::spawn(async move {
            while let Some(payload) = outbound_rx.recv().await {
                if let Err(err) = ws_sink.send(Message::Text(payload)).await {
                    warn!("CDP WebSocket write error: {err}");
                    break;
                }
            }
            let _ = ws_sink.close().await;
        });

        // Reader: the WebSocket library reassembles fragmented frames, so
        // every Text message here is one complete JSON message.
        tokio::spawn(async move {
            while let Some(frame) = ws_stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text) {
                        Ok(message) => sink.on_message(message),
                        Err(err) => {
                            let preview: String = text.chars().take(200).collect();
                            warn!("failed to parse CDP message: {err}, buffer content: {preview}");
                        }
                    },
                    Ok(Message::Close(_)) => {
                        debug!("CDP WebSocket closed by peer");
                        break;
                    }
                    Ok(_) => {} // ping/pong/binary: nothing to do
                    Err(err) => {
                        warn!("CDP WebSocket read error: {err}");
                        break;
                    }
                }
            }
            sink.on_closed();
        });

        Ok(Self { outbound })
    }

    pub async fn send(&self, payload: String) -> Result<(), TransportError> {
        self.outbound
            .send(payload)
            .await
            .map_err(|err| TransportError::SendFailed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_url() {
        let endpoint = parse_ws_url("ws://127.0.0.1:33445/devtools/browser/abc-123").unwrap();
        assert_eq!(endpoint.host, "127.0.0.1");
        assert_eq!(endpoint.port, 33445);
        assert_eq!(endpoint.path, "/devtools/browser/abc-123");
        assert_eq!(endpoint.url(), "ws://127.0.0.1:33445/devtools/browser/abc-123");
    }

    #[test]
    fn defaults_port_and_path() {
        let endpoint = parse_ws_url("ws://localhost").unwrap();
        assert_eq!(endpoint.host, "localhost");
        assert_eq!(endpoint.port, 9222);
        assert_eq!(endpoint.path, "/");
    }

    #[test]
    fn accepts_missing_scheme() {
        let endpoint = parse_ws_url("10.0.0.5:9000/x").unwrap();
        assert_eq!(endpoint.host, "10.0.0.5");
        assert_eq!(endpoint.port, 9000);
        assert_eq!(endpoint.path, "/x");
    }

    #[test]
    fn rejects_garbage_port() {
        assert!(parse_ws_url("ws://127.0.0.1:not-a-port/x").is_err());
        assert!(parse_ws_url("ws://").is_err());
    }
}
