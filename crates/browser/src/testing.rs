//! Test-only in-process CDP endpoint.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// Spawn a WebSocket server speaking just enough CDP for tests. For each
/// inbound command the handler returns the frames to emit, in order;
/// events may precede the reply, which is how a real Chrome interleaves.
pub(crate) async fn spawn_mock_cdp<F>(handler: F) -> String
where
    F: Fn(Value) -> Vec<Value> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut sink, mut source) = ws.split();
        while let Some(Ok(frame)) = source.next().await {
            if let Message::Text(text) = frame {
                let incoming: Value = serde_json::from_str(&text).unwrap();
                for outgoing in handler(incoming) {
                    sink.send(Message::Text(outgoing.to_string())).await.unwrap();
                }
            }
        }
    });
    format!("ws://127.0.0.1:{}/devtools/browser/mock", addr.port())
}
