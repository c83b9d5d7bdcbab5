//! Cookies, captured network requests, user-agent and geolocation overrides.
//!
//! Cookies live on the browser scope and are sent without a session; the
//! request log is fed by session-scoped Network events.

use bmcps_core::{Error, Result};
use serde_json::{json, Value};

use crate::driver::BrowserDriver;
use crate::state::NetworkRequestEntry;

impl BrowserDriver {
    /// Snapshot of the captured request log, oldest first. Network events
    /// only flow once the domain is enabled, so the first call starts the
    /// capture and later calls see accumulated traffic.
    pub async fn get_network_requests(&self) -> Result<Vec<NetworkRequestEntry>> {
        self.require_session()?;
        self.ensure_network_enabled().await?;
        Ok(self.state().network_snapshot())
    }

    pub async fn get_cookies(&self, url: Option<&str>) -> Result<Value> {
        if !self.state().is_connected() {
            return Err(Error::Session(crate::driver::NO_SESSION_ERROR.to_string()));
        }
        let params = match url.filter(|u| !u.is_empty()) {
            Some(url) => json!({"urls": [url]}),
            None => json!({}),
        };
        let reply = self.send("Network.getCookies", params).await?;
        let result = Self::expect_result(reply, "Network.getCookies")?;
        Ok(result.get("cookies").cloned().unwrap_or(Value::Array(vec![])))
    }

    pub async fn set_cookie(
        &self,
        name: &str,
        value: &str,
        url: Option<&str>,
        domain: Option<&str>,
        path: Option<&str>,
    ) -> Result<()> {
        if !self.state().is_connected() {
            return Err(Error::Session(crate::driver::NO_SESSION_ERROR.to_string()));
        }
        let mut params = json!({"name": name, "value": value});
        if let Some(url) = url.filter(|u| !u.is_empty()) {
            params["url"] = json!(url);
        }
        if let Some(domain) = domain.filter(|d| !d.is_empty()) {
            params["domain"] = json!(domain);
        }
        if let Some(path) = path.filter(|p| !p.is_empty()) {
            params["path"] = json!(path);
        }

        let reply = self.send("Network.setCookie", params).await?;
        let result = Self::expect_result(reply, "Network.setCookie")?;
        if result.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(Error::Protocol(format!("Cookie {name} was rejected")));
        }
        Ok(())
    }

    pub async fn clear_cookies(&self) -> Result<()> {
        if !self.state().is_connected() {
            return Err(Error::Session(crate::driver::NO_SESSION_ERROR.to_string()));
        }
        let reply = self.send("Network.clearBrowserCookies", json!({})).await?;
        Self::expect_result(reply, "Network.clearBrowserCookies")?;
        Ok(())
    }

    pub async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        let reply = self
            .send_session(
                "Network.setUserAgentOverride",
                json!({"userAgent": user_agent}),
            )
            .await?;
        Self::expect_result(reply, "Network.setUserAgentOverride")?;
        Ok(())
    }

    pub async fn set_geolocation(
        &self,
        latitude: f64,
        longitude: f64,
        accuracy: Option<f64>,
    ) -> Result<()> {
        let reply = self
            .send_session(
                "Emulation.setGeolocationOverride",
                json!({
                    "latitude": latitude,
                    "longitude": longitude,
                    "accuracy": accuracy.unwrap_or(1.0),
                }),
            )
            .await?;
        Self::expect_result(reply, "Emulation.setGeolocationOverride")?;
        Ok(())
    }
}
