//! Request/response correlator over the CDP WebSocket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::state::{EventDemux, SharedState};
use crate::transport::{Transport, TransportError};

/// Reply slots for in-flight commands, written by the demux and read by the
/// correlator's waiter. The critical section only moves a sender; no holder
/// ever calls back into the transport.
pub type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CdpError {
    #[error("Not connected to CDP")]
    NotConnected,
    #[error("Failed to send CDP command via WebSocket: {0}")]
    SendFailed(String),
    #[error("Timed out waiting for CDP response to method: {method}")]
    Timeout { method: String, message_id: u64 },
    #[error("CDP connection closed while waiting for response to: {0}")]
    ConnectionClosed(String),
}

pub struct CdpClient {
    transport: Transport,
    pending: PendingMap,
    next_message_id: AtomicU64,
    state: Arc<SharedState>,
}

impl CdpClient {
    /// Connect to the browser-level CDP endpoint. The event demux (and with
    /// it the caches in `state`) becomes the transport's inbox.
    pub async fn connect(url: &str, state: Arc<SharedState>) -> Result<Self, TransportError> {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let demux = Arc::new(EventDemux::new(Arc::clone(&pending), Arc::clone(&state)));
        let transport = Transport::connect(url, demux).await?;
        state.set_connected(true);
        Ok(Self {
            transport,
            pending,
            next_message_id: AtomicU64::new(1),
            state,
        })
    }

    /// Send one CDP command and wait for its reply.
    ///
    /// Message ids are strictly increasing and never reused within a
    /// connection. A timeout removes the reply slot; the command is not
    /// cancelled on the peer and a late reply is silently dropped.
    pub async fn send_command(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> Result<Value, CdpError> {
        if !self.state.is_connected() {
            return Err(CdpError::NotConnected);
        }

        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);

        let mut command = json!({ "id": message_id, "method": method });
        let params_empty = params.is_null()
            || params.as_object().map_or(false, |map| map.is_empty());
        if !params_empty {
            command["params"] = params;
        }
        if let Some(session) = session_id {
            if !session.is_empty() {
                command["sessionId"] = json!(session);
            }
        }

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending mutex poisoned")
            .insert(message_id, tx);

        if let Err(err) = self.transport.send(command.to_string()).await {
            self.pending
                .lock()
                .expect("pending mutex poisoned")
                .remove(&message_id);
            return Err(CdpError::SendFailed(err.to_string()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_closed)) => Err(CdpError::ConnectionClosed(method.to_string())),
            Err(_elapsed) => {
                self.pending
                    .lock()
                    .expect("pending mutex poisoned")
                    .remove(&message_id);
                debug!("CDP command {method} (id={message_id}) timed out");
                Err(CdpError::Timeout {
                    method: method.to_string(),
                    message_id,
                })
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending mutex poisoned").len()
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_mock_cdp;

    #[tokio::test]
    async fn ids_are_strictly_increasing_and_replies_correlate() {
        let url = spawn_mock_cdp(|incoming| {
            let id = incoming["id"].as_u64().unwrap();
            vec![json!({"id": id, "result": {"echoMethod": incoming["method"]}})]
        })
        .await;

        let state = Arc::new(SharedState::new());
        let client = CdpClient::connect(&url, state).await.unwrap();

        let mut last_id = 0;
        for round in 0..5 {
            let method = format!("Mock.method{round}");
            let reply = client
                .send_command(&method, Value::Null, None, DEFAULT_COMMAND_TIMEOUT)
                .await
                .unwrap();
            let id = reply["id"].as_u64().unwrap();
            assert!(id > last_id, "ids must be strictly increasing");
            last_id = id;
            assert_eq!(reply["result"]["echoMethod"], json!(method));
        }
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn empty_params_and_session_are_omitted() {
        let url = spawn_mock_cdp(|incoming| {
            let id = incoming["id"].as_u64().unwrap();
            let has_params = incoming.get("params").is_some();
            let has_session = incoming.get("sessionId").is_some();
            vec![json!({"id": id, "result": {"hasParams": has_params, "hasSession": has_session}})]
        })
        .await;

        let state = Arc::new(SharedState::new());
        let client = CdpClient::connect(&url, state).await.unwrap();

        let reply = client
            .send_command("Mock.bare", json!({}), Some(""), DEFAULT_COMMAND_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(reply["result"]["hasParams"], json!(false));
        assert_eq!(reply["result"]["hasSession"], json!(false));

        let reply = client
            .send_command(
                "Mock.full",
                json!({"k": 1}),
                Some("session-9"),
                DEFAULT_COMMAND_TIMEOUT,
            )
            .await
            .unwrap();
        assert_eq!(reply["result"]["hasParams"], json!(true));
        assert_eq!(reply["result"]["hasSession"], json!(true));
    }

    #[tokio::test]
    async fn timeout_removes_pending_slot() {
        // Mock that never replies.
        let url = spawn_mock_cdp(|_incoming| Vec::new()).await;

        let state = Arc::new(SharedState::new());
        let client = CdpClient::connect(&url, state).await.unwrap();

        let err = client
            .send_command(
                "Mock.never",
                Value::Null,
                None,
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();
        match err {
            CdpError::Timeout { method, message_id } => {
                assert_eq!(method, "Mock.never");
                assert_eq!(message_id, 1);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn not_connected_after_close() {
        let state = Arc::new(SharedState::new());
        state.set_connected(false);
        // Build a client against a mock, then flip the flag to simulate close.
        let url = spawn_mock_cdp(|incoming| {
            let id = incoming["id"].as_u64().unwrap();
            vec![json!({"id": id, "result": {}})]
        })
        .await;
        let client = CdpClient::connect(&url, Arc::clone(&state)).await.unwrap();
        state.set_connected(false);

        let err = client
            .send_command("Mock.any", Value::Null, None, DEFAULT_COMMAND_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, CdpError::NotConnected));
    }

    #[tokio::test]
    async fn events_interleaved_before_reply_reach_caches() {
        let url = spawn_mock_cdp(|incoming| {
            let id = incoming["id"].as_u64().unwrap();
            vec![
                json!({
                    "method": "Runtime.consoleAPICalled",
                    "params": {"type": "warning", "args": [{"type": "string", "value": "interleaved"}]}
                }),
                json!({"id": id, "result": {"done": true}}),
            ]
        })
        .await;

        let state = Arc::new(SharedState::new());
        let client = CdpClient::connect(&url, Arc::clone(&state)).await.unwrap();

        let reply = client
            .send_command("Mock.one", Value::Null, None, DEFAULT_COMMAND_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(reply["result"]["done"], json!(true));

        // The event preceding the reply must already be in the ring: the
        // reply cannot overtake it on one ordered connection.
        let snapshot = state.console_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].level, "warning");
        assert_eq!(snapshot[0].text, "interleaved");
    }
}
