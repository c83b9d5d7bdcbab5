//! Event demux and the caches that outlive individual tool calls.
//!
//! Inbound messages are classified purely on the presence of a non-null
//! `id`: replies fill the correlator's slot, everything else is an event
//! routed by `method`. Caches are append-on-event, mutated only here;
//! readers take a snapshot under the lock and filter outside it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

use crate::client::PendingMap;
use crate::transport::MessageSink;
use crate::util::{now_ms, sanitize_text};

pub const CONSOLE_RING_CAP: usize = 20_000;
pub const NETWORK_LOG_CAP: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleEntry {
    pub timestamp_ms: i64,
    pub level: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRequestEntry {
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub status_code: i64,
    pub status_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDialog {
    /// alert | confirm | prompt | beforeunload
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabInfo {
    pub target_id: String,
    pub title: String,
    pub url: String,
    pub kind: String,
}

/// Connection lifecycle. Navigation never transitions this; it only
/// invalidates caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Launching,
    Connecting,
    Attached,
    Detaching,
    Failed,
}

#[derive(Debug, Default)]
struct SessionIds {
    target_id: String,
    session_id: String,
}

/// Connection-wide state: one instance per driver, handed to each verb
/// (no module-level singleton; tests construct isolated instances).
#[derive(Default)]
pub struct SharedState {
    connected: AtomicBool,
    shutting_down: AtomicBool,
    phase: Mutex<Phase>,

    session: Mutex<SessionIds>,

    console: Mutex<VecDeque<ConsoleEntry>>,
    network: Mutex<VecDeque<NetworkRequestEntry>>,
    dialog: Mutex<Option<PendingDialog>>,

    /// frame id -> execution context id, populated by executionContextCreated.
    frame_contexts: Mutex<HashMap<String, i64>>,
    /// 0 = default/main frame context.
    current_execution_context: AtomicI64,

    dom_enabled: AtomicBool,
    page_enabled: AtomicBool,
    network_enabled: AtomicBool,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    // -- connection flags --

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn set_shutting_down(&self, value: bool) {
        self.shutting_down.store(value, Ordering::SeqCst);
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().expect("phase mutex poisoned")
    }

    pub fn set_phase(&self, phase: Phase) {
        *self.phase.lock().expect("phase mutex poisoned") = phase;
    }

    // -- current target / session --

    pub fn session_id(&self) -> String {
        self.session
            .lock()
            .expect("session mutex poisoned")
            .session_id
            .clone()
    }

    pub fn target_id(&self) -> String {
        self.session
            .lock()
            .expect("session mutex poisoned")
            .target_id
            .clone()
    }

    pub fn set_session(&self, target_id: &str, session_id: &str) {
        let mut guard = self.session.lock().expect("session mutex poisoned");
        guard.target_id = target_id.to_string();
        guard.session_id = session_id.to_string();
    }

    pub fn clear_session(&self) {
        let mut guard = self.session.lock().expect("session mutex poisoned");
        guard.target_id.clear();
        guard.session_id.clear();
    }

    pub fn has_session(&self) -> bool {
        !self
            .session
            .lock()
            .expect("session mutex poisoned")
            .session_id
            .is_empty()
    }

    // -- domain enable flags (lazy, reset on attach) --

    pub fn dom_enabled(&self) -> &AtomicBool {
        &self.dom_enabled
    }

    pub fn page_enabled(&self) -> &AtomicBool {
        &self.page_enabled
    }

    pub fn network_enabled(&self) -> &AtomicBool {
        &self.network_enabled
    }

    pub fn reset_domain_flags(&self) {
        self.dom_enabled.store(false, Ordering::SeqCst);
        self.page_enabled.store(false, Ordering::SeqCst);
        self.network_enabled.store(false, Ordering::SeqCst);
    }

    // -- console ring --

    pub fn push_console(&self, entry: ConsoleEntry) {
        let mut ring = self.console.lock().expect("console mutex poisoned");
        if ring.len() == CONSOLE_RING_CAP {
            ring.pop_front();
        }
        ring.push_back(entry);
    }

    pub fn console_snapshot(&self) -> Vec<ConsoleEntry> {
        self.console
            .lock()
            .expect("console mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear_console(&self) {
        self.console.lock().expect("console mutex poisoned").clear();
    }

    pub fn console_len(&self) -> usize {
        self.console.lock().expect("console mutex poisoned").len()
    }

    // -- network log --

    pub fn push_network_request(&self, entry: NetworkRequestEntry) {
        let mut log = self.network.lock().expect("network mutex poisoned");
        if log.len() == NETWORK_LOG_CAP {
            log.pop_front();
        }
        log.push_back(entry);
    }

    pub fn record_network_response(&self, request_id: &str, status_code: i64, status_text: &str) {
        let mut log = self.network.lock().expect("network mutex poisoned");
        // Request ids repeat only across navigations; newest entry wins.
        if let Some(entry) = log.iter_mut().rev().find(|e| e.request_id == request_id) {
            entry.status_code = status_code;
            entry.status_text = status_text.to_string();
        }
    }

    pub fn network_snapshot(&self) -> Vec<NetworkRequestEntry> {
        self.network
            .lock()
            .expect("network mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn network_len(&self) -> usize {
        self.network.lock().expect("network mutex poisoned").len()
    }

    // -- dialog slot --

    pub fn set_dialog(&self, dialog: PendingDialog) {
        *self.dialog.lock().expect("dialog mutex poisoned") = Some(dialog);
    }

    pub fn peek_dialog(&self) -> Option<PendingDialog> {
        self.dialog.lock().expect("dialog mutex poisoned").clone()
    }

    pub fn clear_dialog(&self) {
        *self.dialog.lock().expect("dialog mutex poisoned") = None;
    }

    // -- frame execution contexts --

    pub fn record_frame_context(&self, frame_id: &str, context_id: i64) {
        self.frame_contexts
            .lock()
            .expect("frame mutex poisoned")
            .insert(frame_id.to_string(), context_id);
    }

    pub fn context_for_frame(&self, frame_id: &str) -> Option<i64> {
        self.frame_contexts
            .lock()
            .expect("frame mutex poisoned")
            .get(frame_id)
            .copied()
    }

    pub fn current_execution_context(&self) -> i64 {
        self.current_execution_context.load(Ordering::SeqCst)
    }

    pub fn set_current_execution_context(&self, context_id: i64) {
        self.current_execution_context
            .store(context_id, Ordering::SeqCst);
    }

    pub fn clear_frame_contexts(&self) {
        self.frame_contexts
            .lock()
            .expect("frame mutex poisoned")
            .clear();
    }
}

/// The transport's inbox: replies go to the correlator's pending map,
/// events mutate the caches. Holds no back-pointer to the transport.
pub struct EventDemux {
    pending: PendingMap,
    state: Arc<SharedState>,
}

impl EventDemux {
    pub fn new(pending: PendingMap, state: Arc<SharedState>) -> Self {
        Self { pending, state }
    }

    fn dispatch_reply(&self, message: Value) {
        let Some(id) = message.get("id").and_then(Value::as_u64) else {
            warn!("CDP reply with non-integer id dropped: {}", preview(&message));
            return;
        };
        let slot = self
            .pending
            .lock()
            .expect("pending mutex poisoned")
            .remove(&id);
        match slot {
            Some(sender) => {
                // A closed receiver means the waiter timed out; drop the late reply.
                let _ = sender.send(message);
            }
            None => warn!("CDP reply for unknown message id {id} dropped"),
        }
    }

    fn dispatch_event(&self, message: &Value) {
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            debug!("CDP message without id or method: {}", preview(message));
            return;
        };
        let params = message.get("params").cloned().unwrap_or(Value::Null);
        let session_id = message
            .get("sessionId")
            .and_then(Value::as_str)
            .unwrap_or("");

        match method {
            "Runtime.consoleAPICalled" => self.on_console_api_called(&params, session_id),
            "Page.javascriptDialogOpening" => self.on_dialog_opening(&params),
            "Runtime.executionContextCreated" => self.on_execution_context_created(&params),
            "Network.requestWillBeSent" => self.on_request_will_be_sent(&params),
            "Network.responseReceived" => self.on_response_received(&params),
            other => debug!("CDP event: {other}"),
        }
    }

    fn on_console_api_called(&self, params: &Value, session_id: &str) {
        // Events from other sessions (stale tabs) are not ours.
        if !session_id.is_empty() && session_id != self.state.session_id() {
            return;
        }

        let level = params
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("log")
            .to_string();
        let text = compose_console_text(params.get("args").and_then(Value::as_array));

        self.state.push_console(ConsoleEntry {
            timestamp_ms: now_ms(),
            level,
            text,
        });
    }

    fn on_dialog_opening(&self, params: &Value) {
        let kind = params
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("alert")
            .to_string();
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .map(sanitize_text)
            .unwrap_or_default();
        self.state.set_dialog(PendingDialog { kind, message });
    }

    fn on_execution_context_created(&self, params: &Value) {
        let Some(context) = params.get("context") else {
            return;
        };
        let context_id = context.get("id").and_then(Value::as_i64).unwrap_or(0);
        if context_id == 0 {
            return;
        }
        if let Some(frame_id) = context
            .get("auxData")
            .and_then(|aux| aux.get("frameId"))
            .and_then(Value::as_str)
        {
            self.state.record_frame_context(frame_id, context_id);
        }
    }

    fn on_request_will_be_sent(&self, params: &Value) {
        let request_id = params
            .get("requestId")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let request = params.get("request").cloned().unwrap_or(Value::Null);
        self.state.push_network_request(NetworkRequestEntry {
            request_id,
            url: request
                .get("url")
                .and_then(Value::as_str)
                .map(sanitize_text)
                .unwrap_or_default(),
            method: request
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            status_code: 0,
            status_text: String::new(),
        });
    }

    fn on_response_received(&self, params: &Value) {
        let Some(request_id) = params.get("requestId").and_then(Value::as_str) else {
            return;
        };
        let response = params.get("response").cloned().unwrap_or(Value::Null);
        let status = response.get("status").and_then(Value::as_i64).unwrap_or(0);
        let status_text = response
            .get("statusText")
            .and_then(Value::as_str)
            .unwrap_or("");
        self.state
            .record_network_response(request_id, status, status_text);
    }
}

impl MessageSink for EventDemux {
    fn on_message(&self, message: Value) {
        let is_reply = message.get("id").map_or(false, |id| !id.is_null());
        if is_reply {
            self.dispatch_reply(message);
        } else {
            self.dispatch_event(&message);
        }
    }

    fn on_closed(&self) {
        self.state.set_connected(false);
        // Dropping the senders wakes every waiter with a recv error.
        self.pending
            .lock()
            .expect("pending mutex poisoned")
            .clear();
    }
}

/// Compose the console line from the event's `args`: string values verbatim,
/// other values as compact JSON, otherwise the remote object `description`.
/// Empties are skipped; parts are joined by single spaces.
fn compose_console_text(args: Option<&Vec<Value>>) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(args) = args {
        for arg in args {
            let part = match arg.get("value") {
                Some(Value::String(text)) => text.clone(),
                // An explicit null value is still a value: console.log(null)
                // arrives as {"subtype":"null","value":null} and must render
                // as its JSON dump, not via description.
                Some(other) => other.to_string(),
                None => arg
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
            };
            if !part.is_empty() {
                parts.push(part);
            }
        }
    }
    sanitize_text(&parts.join(" "))
}

fn preview(message: &Value) -> String {
    let raw = message.to_string();
    if raw.len() > 200 {
        let mut end = 200;
        while end > 0 && !raw.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &raw[..end])
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn demux_with_state() -> (EventDemux, Arc<SharedState>, PendingMap) {
        let state = Arc::new(SharedState::new());
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let demux = EventDemux::new(Arc::clone(&pending), Arc::clone(&state));
        (demux, state, pending)
    }

    #[test]
    fn console_ring_enforces_cap() {
        let state = SharedState::new();
        for i in 0..(CONSOLE_RING_CAP + 10) {
            state.push_console(ConsoleEntry {
                timestamp_ms: i as i64,
                level: "log".into(),
                text: format!("line {i}"),
            });
        }
        let snapshot = state.console_snapshot();
        assert_eq!(snapshot.len(), CONSOLE_RING_CAP);
        // Oldest entries were dropped.
        assert_eq!(snapshot[0].text, "line 10");
        assert_eq!(
            snapshot.last().unwrap().text,
            format!("line {}", CONSOLE_RING_CAP + 9)
        );
    }

    #[test]
    fn network_log_enforces_cap_and_mutates_in_place() {
        let state = SharedState::new();
        for i in 0..(NETWORK_LOG_CAP + 5) {
            state.push_network_request(NetworkRequestEntry {
                request_id: format!("req-{i}"),
                url: format!("https://example.test/{i}"),
                method: "GET".into(),
                status_code: 0,
                status_text: String::new(),
            });
        }
        assert_eq!(state.network_len(), NETWORK_LOG_CAP);

        state.record_network_response("req-500", 200, "OK");
        let snapshot = state.network_snapshot();
        let hit = snapshot.iter().find(|e| e.request_id == "req-500").unwrap();
        assert_eq!(hit.status_code, 200);
        assert_eq!(hit.status_text, "OK");
    }

    #[test]
    fn reply_fills_pending_slot() {
        let (demux, _state, pending) = demux_with_state();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        pending.lock().unwrap().insert(7, tx);

        demux.on_message(json!({"id": 7, "result": {"ok": true}}));

        let reply = rx.try_recv().expect("slot must be filled");
        assert_eq!(reply["result"]["ok"], json!(true));
        assert!(pending.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_reply_id_is_dropped() {
        let (demux, _state, pending) = demux_with_state();
        demux.on_message(json!({"id": 99, "result": {}}));
        assert!(pending.lock().unwrap().is_empty());
    }

    #[test]
    fn null_id_is_an_event_not_a_reply() {
        let (demux, state, _pending) = demux_with_state();
        demux.on_message(json!({
            "id": null,
            "method": "Page.javascriptDialogOpening",
            "params": {"type": "confirm", "message": "sure?"}
        }));
        assert_eq!(
            state.peek_dialog(),
            Some(PendingDialog {
                kind: "confirm".into(),
                message: "sure?".into()
            })
        );
    }

    #[test]
    fn console_event_respects_session_filter() {
        let (demux, state, _pending) = demux_with_state();
        state.set_session("target-1", "session-1");

        demux.on_message(json!({
            "method": "Runtime.consoleAPICalled",
            "sessionId": "session-other",
            "params": {"type": "log", "args": [{"type": "string", "value": "foreign"}]}
        }));
        assert_eq!(state.console_len(), 0);

        demux.on_message(json!({
            "method": "Runtime.consoleAPICalled",
            "sessionId": "session-1",
            "params": {"type": "error", "args": [{"type": "string", "value": "mine"}]}
        }));
        let snapshot = state.console_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].level, "error");
        assert_eq!(snapshot[0].text, "mine");
    }

    #[test]
    fn console_text_composition() {
        let args = vec![
            json!({"type": "string", "value": "count:"}),
            json!({"type": "number", "value": 42}),
            json!({"type": "object", "description": "Object"}),
            json!({"type": "string", "value": ""}),
        ];
        assert_eq!(compose_console_text(Some(&args)), "count: 42 Object");
        assert_eq!(compose_console_text(None), "");
    }

    #[test]
    fn console_text_explicit_null_value_dumps_as_json() {
        // console.log(null): the arg carries value: null alongside a
        // description; the present-but-null value wins and dumps as "null".
        let args = vec![
            json!({"type": "object", "subtype": "null", "value": null, "description": "null object"}),
            json!({"type": "string", "value": "tail"}),
        ];
        assert_eq!(compose_console_text(Some(&args)), "null tail");
    }

    #[test]
    fn execution_context_event_populates_frame_map() {
        let (demux, state, _pending) = demux_with_state();
        demux.on_message(json!({
            "method": "Runtime.executionContextCreated",
            "params": {"context": {"id": 5, "auxData": {"frameId": "frame-a"}}}
        }));
        assert_eq!(state.context_for_frame("frame-a"), Some(5));

        // id 0 and missing frameId are ignored.
        demux.on_message(json!({
            "method": "Runtime.executionContextCreated",
            "params": {"context": {"id": 0, "auxData": {"frameId": "frame-b"}}}
        }));
        assert_eq!(state.context_for_frame("frame-b"), None);
    }

    #[test]
    fn network_events_flow_into_log() {
        let (demux, state, _pending) = demux_with_state();
        demux.on_message(json!({
            "method": "Network.requestWillBeSent",
            "params": {
                "requestId": "r1",
                "request": {"url": "https://example.test/a", "method": "POST"}
            }
        }));
        demux.on_message(json!({
            "method": "Network.responseReceived",
            "params": {
                "requestId": "r1",
                "response": {"status": 404, "statusText": "Not Found"}
            }
        }));
        let snapshot = state.network_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].method, "POST");
        assert_eq!(snapshot[0].status_code, 404);
        assert_eq!(snapshot[0].status_text, "Not Found");
    }

    #[test]
    fn on_closed_fails_waiters_and_marks_disconnected() {
        let (demux, state, pending) = demux_with_state();
        state.set_connected(true);
        let (tx, mut rx) = tokio::sync::oneshot::channel::<Value>();
        pending.lock().unwrap().insert(1, tx);

        demux.on_closed();

        assert!(!state.is_connected());
        assert!(rx.try_recv().is_err());
    }
}
