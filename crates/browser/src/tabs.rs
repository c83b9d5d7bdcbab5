//! Target and session management: attach, enumerate, switch, close.

use bmcps_core::{Error, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::driver::BrowserDriver;
use crate::state::TabInfo;

impl BrowserDriver {
    /// Attach to a target with flat session routing and store the ids.
    /// Console capture is enabled on the new session as a mandatory
    /// post-condition: the ring is cleared and Runtime is enabled so
    /// consoleAPICalled events start flowing. Page/Network/DOM stay lazy.
    pub(crate) async fn attach_to_target(&self, target_id: &str) -> Result<()> {
        let reply = self
            .send(
                "Target.attachToTarget",
                json!({"targetId": target_id, "flatten": true}),
            )
            .await?;
        let result = Self::expect_result(reply, "Target.attachToTarget")?;
        let session_id = result
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Protocol("Target.attachToTarget returned no sessionId".to_string())
            })?;

        self.state().set_session(target_id, session_id);
        self.state().reset_domain_flags();
        self.state().clear_frame_contexts();
        self.state().set_current_execution_context(0);
        debug!("attached to target {target_id} session {session_id}");

        self.enable_console_for_session().await;
        Ok(())
    }

    /// Clear the ring and enable Runtime on the current session. A failure
    /// downgrades console capture but does not fail the attach.
    pub(crate) async fn enable_console_for_session(&self) {
        self.state().clear_console();
        match self.send_session("Runtime.enable", json!({})).await {
            Ok(reply) => {
                if let Err(err) = Self::expect_result(reply, "Runtime.enable") {
                    warn!("Runtime.enable failed, console capture degraded: {err}");
                }
            }
            Err(err) => warn!("Runtime.enable failed, console capture degraded: {err}"),
        }
    }

    /// All targets, as reported by the browser.
    pub async fn list_tabs(&self) -> Result<Vec<TabInfo>> {
        if !self.state().is_connected() {
            return Err(Error::Session(crate::driver::NO_SESSION_ERROR.to_string()));
        }
        let reply = self.send("Target.getTargets", json!({})).await?;
        let result = Self::expect_result(reply, "Target.getTargets")?;
        let infos = result
            .get("targetInfos")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::Protocol("Target.getTargets returned no targetInfos".to_string())
            })?;

        Ok(infos.iter().map(tab_info_from_value).collect())
    }

    /// Page-type targets in a stable order (sorted by target id) so tab
    /// indices mean the same thing across calls.
    pub(crate) async fn page_targets(&self) -> Result<Vec<TabInfo>> {
        let mut pages: Vec<TabInfo> = self
            .list_tabs()
            .await?
            .into_iter()
            .filter(|tab| tab.kind == "page")
            .collect();
        pages.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        Ok(pages)
    }

    /// Create a tab (about:blank unless a URL is given) and attach to it.
    pub async fn new_tab(&self, url: Option<&str>) -> Result<String> {
        if !self.state().is_connected() {
            return Err(Error::Session(crate::driver::NO_SESSION_ERROR.to_string()));
        }
        let url = match url {
            Some(u) if !u.is_empty() => u,
            _ => "about:blank",
        };
        let reply = self.send("Target.createTarget", json!({"url": url})).await?;
        let result = Self::expect_result(reply, "Target.createTarget")?;
        let target_id = result
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Protocol("Target.createTarget returned no targetId".to_string())
            })?
            .to_string();
        debug!("new_tab created target {target_id}");

        self.attach_to_target(&target_id).await?;
        Ok(target_id)
    }

    /// Re-attach to the index-th page target and bring it to front. An
    /// out-of-range index leaves the current session untouched.
    pub async fn switch_tab(&self, index: i64) -> Result<String> {
        let pages = self.page_targets().await?;
        if index < 0 || index as usize >= pages.len() {
            let upper = pages.len().saturating_sub(1);
            return Err(Error::NotFound(format!(
                "Tab index {index} out of range (0..{upper})."
            )));
        }
        let target_id = pages[index as usize].target_id.clone();

        self.attach_to_target(&target_id).await?;

        // Activation is cosmetic; a failure is logged, not surfaced.
        match self
            .send("Target.activateTarget", json!({"targetId": target_id}))
            .await
        {
            Ok(reply) => {
                if let Err(err) = Self::expect_result(reply, "Target.activateTarget") {
                    warn!("Target.activateTarget: {err}");
                }
            }
            Err(err) => warn!("Target.activateTarget: {err}"),
        }

        Ok(target_id)
    }

    /// Close the current tab, then try to re-attach to the first surviving
    /// page target so the facade is not left sessionless. Closing the only
    /// tab succeeds and leaves the session empty.
    pub async fn close_tab(&self) -> Result<String> {
        let closing = self.state().target_id();
        if !self.state().is_connected() || closing.is_empty() {
            return Err(Error::Session(crate::driver::NO_SESSION_ERROR.to_string()));
        }

        let reply = self
            .send("Target.closeTarget", json!({"targetId": closing}))
            .await?;
        Self::expect_result(reply, "Target.closeTarget")?;

        // The closed tab's session must never be observed by a later verb.
        self.state().clear_session();
        self.state().set_current_execution_context(0);

        let survivors = self.page_targets().await?;
        if let Some(next) = survivors.iter().find(|tab| tab.target_id != closing) {
            let target_id = next.target_id.clone();
            if let Err(err) = self.attach_to_target(&target_id).await {
                warn!("re-attach after close_tab failed: {err}");
            }
        }

        Ok(closing)
    }
}

fn tab_info_from_value(value: &Value) -> TabInfo {
    TabInfo {
        target_id: value
            .get("targetId")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        title: value
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        url: value
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        kind: value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
    }
}
