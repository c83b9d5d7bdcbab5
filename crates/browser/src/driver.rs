//! The verb facade. One driver instance per server process; every tool call
//! goes through it. The driver owns the Chrome child when it launched one
//! and never kills a Chrome it merely adopted.

use std::sync::Arc;
use std::time::Duration;

use bmcps_core::{Config, Error, Paths, Result};
use serde_json::{json, Value};
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::{CdpClient, CdpError};
use crate::launch;
use crate::state::{Phase, SharedState};

pub const NO_SESSION_ERROR: &str = "No active browser session. Call open_browser first.";

/// Launch options for open_browser. `disable_translate` doubles as an
/// adoption guard: a fresh Chrome is the only way to guarantee the flag set.
#[derive(Debug, Clone)]
pub struct OpenBrowserOptions {
    pub disable_translate: bool,
}

impl Default for OpenBrowserOptions {
    fn default() -> Self {
        Self {
            disable_translate: true,
        }
    }
}

pub struct BrowserDriver {
    state: Arc<SharedState>,
    client: Mutex<Option<Arc<CdpClient>>>,
    /// Set iff this process spawned Chrome; an adopted instance stays None.
    child: Mutex<Option<Child>>,
    paths: Paths,
    config: Config,
}

impl BrowserDriver {
    pub fn new(paths: Paths, config: Config) -> Self {
        Self {
            state: Arc::new(SharedState::new()),
            client: Mutex::new(None),
            child: Mutex::new(None),
            paths,
            config,
        }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.config.command_timeout_ms)
    }

    pub fn is_attached(&self) -> bool {
        self.state.is_connected() && self.state.has_session()
    }

    pub(crate) async fn client(&self) -> Result<Arc<CdpClient>> {
        match self.client.lock().await.as_ref() {
            Some(client) if self.state.is_connected() => Ok(Arc::clone(client)),
            _ => Err(Error::Transport("Not connected to CDP".to_string())),
        }
    }

    pub(crate) fn require_session(&self) -> Result<String> {
        let session_id = self.state.session_id();
        if !self.state.is_connected() || session_id.is_empty() {
            return Err(Error::Session(NO_SESSION_ERROR.to_string()));
        }
        Ok(session_id)
    }

    // -- command plumbing --

    /// Browser-scope command (no session routing).
    pub(crate) async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.send_with_timeout(method, params, self.command_timeout())
            .await
    }

    pub(crate) async fn send_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let client = self.client().await?;
        client
            .send_command(method, params, None, timeout)
            .await
            .map_err(map_cdp_error)
    }

    /// Command routed to the current session; precondition-checked.
    pub(crate) async fn send_session(&self, method: &str, params: Value) -> Result<Value> {
        self.send_session_with_timeout(method, params, self.command_timeout())
            .await
    }

    pub(crate) async fn send_session_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let session_id = self.require_session()?;
        let client = self.client().await?;
        client
            .send_command(method, params, Some(&session_id), timeout)
            .await
            .map_err(map_cdp_error)
    }

    /// Reject replies carrying a CDP protocol error; unwrap `result`.
    pub(crate) fn expect_result(reply: Value, method: &str) -> Result<Value> {
        if let Some(error) = reply.get("error") {
            if !error.is_null() {
                let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown CDP error");
                return Err(Error::Protocol(format!("{method}: {message} (code {code})")));
            }
        }
        Ok(reply.get("result").cloned().unwrap_or_else(|| json!({})))
    }

    // -- lazy domain enables (reset on attach) --

    pub(crate) async fn ensure_dom_enabled(&self) -> Result<()> {
        if self.state.dom_enabled().load(std::sync::atomic::Ordering::SeqCst) {
            return Ok(());
        }
        let reply = self.send_session("DOM.enable", json!({})).await?;
        Self::expect_result(reply, "DOM.enable")?;
        self.state
            .dom_enabled()
            .store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    pub(crate) async fn ensure_page_enabled(&self) -> Result<()> {
        if self.state.page_enabled().load(std::sync::atomic::Ordering::SeqCst) {
            return Ok(());
        }
        let reply = self.send_session("Page.enable", json!({})).await?;
        Self::expect_result(reply, "Page.enable")?;
        self.state
            .page_enabled()
            .store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    pub(crate) async fn ensure_network_enabled(&self) -> Result<()> {
        if self
            .state
            .network_enabled()
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Ok(());
        }
        let reply = self.send_session("Network.enable", json!({})).await?;
        Self::expect_result(reply, "Network.enable")?;
        self.state
            .network_enabled()
            .store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    // -- lifecycle --

    /// Open the browser: adopt or launch Chrome, connect, attach to a page
    /// target (creating one if needed), enable console capture.
    pub async fn open_browser(&self, options: OpenBrowserOptions) -> Result<String> {
        if self.is_attached() {
            return Ok("Browser already open and attached.".to_string());
        }

        self.paths
            .ensure_dirs()
            .map_err(|err| Error::Launch(format!("create state dirs: {err}")))?;
        let profile_dir = self.paths.chrome_profile_dir();

        // Adoption is only safe when the caller does not insist on a
        // particular flag set.
        let mut adopted_url = None;
        if !options.disable_translate {
            adopted_url = launch::try_adopt_existing(&profile_dir).await;
        }

        self.state.set_shutting_down(false);
        let connect_url = match adopted_url {
            Some(url) => {
                info!("adopting existing Chrome at {url}");
                url
            }
            None => {
                self.state.set_phase(Phase::Launching);
                let launched = launch::launch_chrome(
                    &profile_dir,
                    self.config.debug_port,
                    self.config.chrome_executable.as_deref(),
                )
                .await
                .map_err(|err| {
                    self.state.set_phase(Phase::Failed);
                    Error::Launch(err.to_string())
                })?;
                *self.child.lock().await = Some(launched.child);
                launched.websocket_url
            }
        };

        match self.connect_and_attach(&connect_url).await {
            Ok(()) => Ok("Browser opened and connected to default tab.".to_string()),
            Err(err) => {
                // Only a Chrome we spawned is killed on failure; an adopted
                // one keeps running.
                self.kill_owned_child().await;
                Err(err)
            }
        }
    }

    /// Connect to an already-running CDP endpoint and attach to the first
    /// page target (creating one when none exists). This is the whole of
    /// open_browser minus process management.
    pub async fn connect_and_attach(&self, websocket_url: &str) -> Result<()> {
        self.state.set_phase(Phase::Connecting);
        let client = match CdpClient::connect(websocket_url, Arc::clone(&self.state)).await {
            Ok(client) => Arc::new(client),
            Err(err) => {
                self.state.set_phase(Phase::Failed);
                return Err(Error::Transport(format!(
                    "Could not establish WebSocket connection to: {websocket_url} ({err})"
                )));
            }
        };
        *self.client.lock().await = Some(client);

        match self.attach_to_first_page().await {
            Ok(()) => {
                self.state.set_phase(Phase::Attached);
                Ok(())
            }
            Err(err) => {
                self.state.set_phase(Phase::Failed);
                *self.client.lock().await = None;
                self.state.set_connected(false);
                Err(err)
            }
        }
    }

    async fn attach_to_first_page(&self) -> Result<()> {
        // Discovery failure is tolerated; getTargets works regardless.
        match self.send("Target.setDiscoverTargets", json!({"discover": true})).await {
            Ok(reply) => {
                if let Err(err) = Self::expect_result(reply, "Target.setDiscoverTargets") {
                    warn!("Target.setDiscoverTargets: {err}");
                }
            }
            Err(err) => warn!("Target.setDiscoverTargets: {err}"),
        }

        let mut page_targets = self.page_targets().await?;
        let target_id = match page_targets.first_mut() {
            Some(info) => std::mem::take(&mut info.target_id),
            None => {
                debug!("no page target found, creating about:blank");
                let reply = self
                    .send("Target.createTarget", json!({"url": "about:blank"}))
                    .await?;
                let result = Self::expect_result(reply, "Target.createTarget")?;
                result
                    .get("targetId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::Protocol("Target.createTarget returned no targetId".to_string())
                    })?
                    .to_string()
            }
        };

        self.attach_to_target(&target_id).await
    }

    /// Tear down: destroy the socket, then kill the child iff we own one.
    pub async fn close_browser(&self) -> Result<String> {
        self.state.set_shutting_down(true);
        self.state.set_phase(Phase::Detaching);

        self.state.clear_session();
        self.state.clear_console();
        self.state.clear_frame_contexts();
        self.state.clear_dialog();
        self.state.set_current_execution_context(0);
        self.state.reset_domain_flags();

        // Dropping the client drops the transport handle, closing the socket.
        *self.client.lock().await = None;
        self.state.set_connected(false);

        let owned = self.kill_owned_child().await;
        self.state.set_phase(Phase::Idle);

        Ok(if owned {
            "Browser closed and Chrome process terminated.".to_string()
        } else {
            "Browser connection closed.".to_string()
        })
    }

    async fn kill_owned_child(&self) -> bool {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            debug!("killing owned Chrome pid={:?}", child.id());
            if let Err(err) = child.kill().await {
                warn!("failed to kill Chrome child: {err}");
            }
            true
        } else {
            false
        }
    }
}

fn map_cdp_error(err: CdpError) -> Error {
    match err {
        CdpError::Timeout { .. } => Error::Timeout(err.to_string()),
        CdpError::NotConnected
        | CdpError::SendFailed(_)
        | CdpError::ConnectionClosed(_) => Error::Transport(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_mock_cdp;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    fn test_driver() -> BrowserDriver {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());
        BrowserDriver::new(paths, Config::default())
    }

    /// A Chrome-shaped mock: two page tabs plus a service worker, flat
    /// attach, canned navigation history, evaluate triggers that emit
    /// console/dialog events before their reply.
    async fn chrome_like_endpoint() -> String {
        let closed: StdMutex<HashSet<String>> = StdMutex::new(HashSet::new());
        spawn_mock_cdp(move |incoming| {
            let id = incoming["id"].as_u64().unwrap();
            let method = incoming["method"].as_str().unwrap().to_string();
            let params = incoming.get("params").cloned().unwrap_or(json!({}));
            let session = incoming
                .get("sessionId")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let reply = |result: Value| json!({"id": id, "result": result});

            match method.as_str() {
                "Target.getTargets" => {
                    let closed = closed.lock().unwrap();
                    let tabs = [
                        ("tab-b", "page"),
                        ("tab-a", "page"),
                        ("svc-1", "service_worker"),
                    ];
                    let infos: Vec<Value> = tabs
                        .iter()
                        .filter(|(target, _)| !closed.contains(*target))
                        .map(|(target, kind)| {
                            json!({"targetId": target, "type": kind, "title": target, "url": "about:blank"})
                        })
                        .collect();
                    vec![reply(json!({"targetInfos": infos}))]
                }
                "Target.attachToTarget" => {
                    let target = params["targetId"].as_str().unwrap_or("");
                    vec![reply(json!({"sessionId": format!("sess-{target}")}))]
                }
                "Target.closeTarget" => {
                    let target = params["targetId"].as_str().unwrap_or("").to_string();
                    closed.lock().unwrap().insert(target);
                    vec![reply(json!({}))]
                }
                "Page.navigate" => {
                    let url = params["url"].as_str().unwrap_or("");
                    if url.starts_with("https://unresolvable.") {
                        vec![reply(
                            json!({"frameId": "f1", "errorText": "net::ERR_NAME_NOT_RESOLVED"}),
                        )]
                    } else {
                        vec![reply(json!({"frameId": "f1"}))]
                    }
                }
                "Page.getNavigationHistory" => vec![reply(json!({
                    "currentIndex": 0,
                    "entries": [{"id": 1, "url": "about:blank", "title": ""}]
                }))],
                "Runtime.evaluate" => {
                    let expression = params["expression"].as_str().unwrap_or("");
                    if expression == "Date.now()" {
                        vec![reply(
                            json!({"result": {"type": "number", "value": 1_700_000_000_000i64}}),
                        )]
                    } else if expression.contains("boom") {
                        vec![reply(json!({
                            "result": {"type": "object"},
                            "exceptionDetails": {
                                "text": "Uncaught",
                                "exception": {"description": "Error: boom"}
                            }
                        }))]
                    } else if expression.contains("alert(") {
                        vec![
                            json!({
                                "method": "Page.javascriptDialogOpening",
                                "sessionId": session,
                                "params": {"type": "alert", "message": "hi there"}
                            }),
                            reply(json!({"result": {"type": "undefined"}})),
                        ]
                    } else if expression.contains("console.error") {
                        vec![
                            json!({
                                "method": "Runtime.consoleAPICalled",
                                "sessionId": session,
                                "params": {"type": "error", "args": [{"type": "string", "value": "b"}]}
                            }),
                            reply(json!({"result": {"type": "undefined"}})),
                        ]
                    } else {
                        vec![reply(json!({"result": {"type": "string", "value": "ok"}}))]
                    }
                }
                // setDiscoverTargets, Runtime.enable, activateTarget,
                // handleJavaScriptDialog, Page.reload and friends.
                _ => vec![reply(json!({}))],
            }
        })
        .await
    }

    async fn attached_driver() -> BrowserDriver {
        let url = chrome_like_endpoint().await;
        let driver = test_driver();
        driver.connect_and_attach(&url).await.unwrap();
        driver
    }

    #[tokio::test]
    async fn connect_and_attach_picks_first_page_target_in_stable_order() {
        let driver = attached_driver().await;
        assert!(driver.is_attached());
        assert_eq!(driver.state().phase(), Phase::Attached);
        // Page targets sort by target id, so tab-a wins although the
        // browser listed tab-b first.
        assert_eq!(driver.state().target_id(), "tab-a");
        assert_eq!(driver.state().session_id(), "sess-tab-a");
    }

    #[tokio::test]
    async fn navigate_success_clears_console_and_failure_surfaces_error_text() {
        let driver = attached_driver().await;
        driver.state().push_console(crate::state::ConsoleEntry {
            timestamp_ms: 1,
            level: "log".into(),
            text: "stale".into(),
        });

        driver.navigate("https://example.test/").await.unwrap();
        assert_eq!(driver.state().console_len(), 0);

        let err = driver
            .navigate("https://unresolvable.test/")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("net::ERR_NAME_NOT_RESOLVED"));
    }

    #[tokio::test]
    async fn switch_tab_out_of_range_keeps_session() {
        let driver = attached_driver().await;
        let before = driver.state().session_id();

        let err = driver.switch_tab(3).await.unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
        assert_eq!(driver.state().session_id(), before);

        let err = driver.switch_tab(-1).await.unwrap_err();
        assert!(err.to_string().contains("out of range"));

        driver.switch_tab(1).await.unwrap();
        assert_eq!(driver.state().target_id(), "tab-b");
    }

    #[tokio::test]
    async fn navigate_back_at_boundary_reports_no_history() {
        let driver = attached_driver().await;
        let err = driver.navigate_back().await.unwrap_err();
        match err {
            Error::NotFound(detail) => assert_eq!(detail, "No back history."),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_tab_reattaches_then_leaves_session_empty() {
        let driver = attached_driver().await;

        // tab-a closes; tab-b survives and becomes current.
        driver.close_tab().await.unwrap();
        assert_eq!(driver.state().target_id(), "tab-b");

        // Closing the only remaining tab succeeds and leaves no session.
        driver.close_tab().await.unwrap();
        assert!(driver.state().session_id().is_empty());
        assert!(!driver.is_attached());
    }

    #[tokio::test]
    async fn evaluate_serializes_result_and_stitches_exceptions() {
        let driver = attached_driver().await;

        let value = driver
            .evaluate_javascript("document.location.href", None)
            .await
            .unwrap();
        assert_eq!(value, "\"ok\"");

        let err = driver
            .evaluate_javascript("boom()", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Uncaught Error: boom"), "{err}");
    }

    #[tokio::test]
    async fn dialog_event_fills_slot_and_accept_clears_it() {
        let driver = attached_driver().await;

        driver.evaluate_javascript("alert('x')", None).await.unwrap();
        let dialog = driver.get_dialog_message().await.unwrap();
        assert_eq!(dialog.kind, "alert");
        assert_eq!(dialog.message, "hi there");

        driver.accept_dialog().await.unwrap();
        assert!(driver.state().peek_dialog().is_none());
    }

    #[tokio::test]
    async fn time_sync_reads_browser_clock() {
        let driver = attached_driver().await;
        let sync = driver.time_sync().await.unwrap();
        assert_eq!(sync.browser_now_ms, 1_700_000_000_000);
        assert!(sync.server_now_ms > 0);
        assert!(sync.round_trip_ms >= 0);
        assert_eq!(sync.offset_ms, sync.browser_now_ms - sync.server_now_ms);
    }

    #[tokio::test]
    async fn console_query_end_to_end_with_min_level() {
        let driver = attached_driver().await;

        // The mock emits a console.error event before replying.
        driver
            .evaluate_javascript("console.error('b')", None)
            .await
            .unwrap();

        let query = crate::console::ConsoleQuery {
            level_scope: crate::console::LevelScope::MinLevel("warning".to_string()),
            count_scope: crate::console::CountScope {
                max_entries: 10,
                order: crate::console::Order::NewestFirst,
            },
            ..Default::default()
        };
        let result = driver.get_console_messages(&query).await.unwrap();
        assert_eq!(result.lines, vec!["[error] b".to_string()]);
        assert_eq!(result.total_matching, 1);
        assert!(!result.truncated);
        assert_eq!(result.time_sync.browser_now_ms, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn verbs_before_open_hit_precondition() {
        let driver = test_driver();
        let err = driver.require_session().unwrap_err();
        assert_eq!(err.to_string(), format!("Session error: {NO_SESSION_ERROR}"));

        let err = driver
            .send_session("Page.navigate", json!({"url": "about:blank"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains(NO_SESSION_ERROR));
    }

    #[tokio::test]
    async fn close_browser_after_adoption_kills_no_one() {
        let driver = attached_driver().await;
        let message = driver.close_browser().await.unwrap();
        // No child pid was recorded, so teardown only drops the socket.
        assert_eq!(message, "Browser connection closed.");
        assert!(!driver.state().is_connected());
        assert_eq!(driver.state().phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn close_browser_without_open_is_clean() {
        let driver = test_driver();
        let message = driver.close_browser().await.unwrap();
        assert_eq!(message, "Browser connection closed.");
        assert_eq!(driver.state().phase(), Phase::Idle);
    }

    #[test]
    fn protocol_error_is_surfaced() {
        let reply = json!({
            "id": 3,
            "error": {"code": -32000, "message": "Cannot find context"}
        });
        let err = BrowserDriver::expect_result(reply, "Runtime.evaluate").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Runtime.evaluate"));
        assert!(text.contains("Cannot find context"));
        assert!(text.contains("-32000"));
    }

    #[test]
    fn missing_result_defaults_to_empty_object() {
        let result = BrowserDriver::expect_result(json!({"id": 1}), "Mock.m").unwrap();
        assert_eq!(result, json!({}));
    }

    #[test]
    fn default_options_disable_translate() {
        assert!(OpenBrowserOptions::default().disable_translate);
    }
}
