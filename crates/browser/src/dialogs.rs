//! JavaScript dialog handling. The pending slot is written by the demux on
//! Page.javascriptDialogOpening and cleared by any accept/dismiss/prompt call.

use bmcps_core::{Error, Result};
use serde_json::json;

use crate::driver::BrowserDriver;
use crate::state::PendingDialog;

impl BrowserDriver {
    pub async fn get_dialog_message(&self) -> Result<PendingDialog> {
        self.require_session()?;
        self.state()
            .peek_dialog()
            .ok_or_else(|| Error::NotFound("No dialog is currently open.".to_string()))
    }

    pub async fn accept_dialog(&self) -> Result<()> {
        self.handle_dialog(true, None).await
    }

    pub async fn dismiss_dialog(&self) -> Result<()> {
        self.handle_dialog(false, None).await
    }

    pub async fn send_prompt_value(&self, text: &str) -> Result<()> {
        self.handle_dialog(true, Some(text)).await
    }

    async fn handle_dialog(&self, accept: bool, prompt_text: Option<&str>) -> Result<()> {
        let mut params = json!({"accept": accept});
        if let Some(text) = prompt_text {
            params["promptText"] = json!(text);
        }
        let reply = self
            .send_session("Page.handleJavaScriptDialog", params)
            .await?;
        let outcome = Self::expect_result(reply, "Page.handleJavaScriptDialog");
        // The dialog is gone either way once Chrome has processed the call.
        self.state().clear_dialog();
        outcome.map(|_| ())
    }
}
