//! Frame tree traversal and execution-context switching.

use std::time::Duration;

use bmcps_core::{Error, Result};
use serde_json::{json, Value};
use tracing::debug;

use crate::driver::BrowserDriver;

/// How long a frame switch waits for the target frame's
/// executionContextCreated before giving up.
const CONTEXT_WAIT: Duration = Duration::from_secs(5);
const CONTEXT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame_id: String,
    pub url: String,
    pub parent_frame_id: String,
}

impl BrowserDriver {
    /// Depth-first flattening of Page.getFrameTree: main frame first, then
    /// children in tree order.
    pub async fn list_frames(&self) -> Result<Vec<FrameInfo>> {
        self.ensure_page_enabled().await?;
        let reply = self.send_session("Page.getFrameTree", json!({})).await?;
        let result = Self::expect_result(reply, "Page.getFrameTree")?;
        let tree = result
            .get("frameTree")
            .ok_or_else(|| Error::Protocol("Page.getFrameTree returned no frameTree".to_string()))?;

        let mut frames = Vec::new();
        collect_frames(tree, "", &mut frames);
        Ok(frames)
    }

    /// Switch evaluation to a frame, addressed by frame id or by index into
    /// the [`list_frames`] order. The switch only succeeds once the frame's
    /// execution context is known; contexts arrive asynchronously via
    /// executionContextCreated, so wait rather than guessing.
    pub async fn switch_to_frame(&self, frame_id_or_index: &str) -> Result<String> {
        let frames = self.list_frames().await?;

        let frame_id = match frame_id_or_index.parse::<usize>() {
            Ok(index) => frames
                .get(index)
                .map(|frame| frame.frame_id.clone())
                .ok_or_else(|| {
                    Error::NotFound(format!(
                        "Frame index {index} out of range (0..{}).",
                        frames.len().saturating_sub(1)
                    ))
                })?,
            Err(_) => {
                let wanted = frame_id_or_index;
                if !frames.iter().any(|frame| frame.frame_id == wanted) {
                    return Err(Error::NotFound(format!("Frame not found: {wanted}")));
                }
                wanted.to_string()
            }
        };

        let started = tokio::time::Instant::now();
        let context_id = loop {
            if let Some(context_id) = self.state().context_for_frame(&frame_id) {
                break context_id;
            }
            if started.elapsed() >= CONTEXT_WAIT {
                return Err(Error::Timeout(format!(
                    "No execution context observed for frame {frame_id} within {} ms",
                    CONTEXT_WAIT.as_millis()
                )));
            }
            tokio::time::sleep(CONTEXT_POLL_INTERVAL).await;
        };

        self.state().set_current_execution_context(context_id);
        debug!("switched to frame {frame_id} (context {context_id})");
        Ok(frame_id)
    }

    /// Restore the default (main-frame) execution context.
    pub async fn switch_to_main_frame(&self) -> Result<()> {
        self.require_session()?;
        self.state().set_current_execution_context(0);
        Ok(())
    }
}

fn collect_frames(tree: &Value, parent_id: &str, out: &mut Vec<FrameInfo>) {
    let frame = tree.get("frame").cloned().unwrap_or(Value::Null);
    let frame_id = frame
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    out.push(FrameInfo {
        frame_id: frame_id.clone(),
        url: frame
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        parent_frame_id: parent_id.to_string(),
    });

    if let Some(children) = tree.get("childFrames").and_then(Value::as_array) {
        for child in children {
            collect_frames(child, &frame_id, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_tree_flattens_depth_first() {
        let tree = json!({
            "frame": {"id": "main", "url": "https://example.test/"},
            "childFrames": [
                {
                    "frame": {"id": "child-a", "url": "https://example.test/a"},
                    "childFrames": [
                        {"frame": {"id": "grandchild", "url": "https://example.test/a/g"}}
                    ]
                },
                {"frame": {"id": "child-b", "url": "https://example.test/b"}}
            ]
        });

        let mut frames = Vec::new();
        collect_frames(&tree, "", &mut frames);

        let ids: Vec<&str> = frames.iter().map(|f| f.frame_id.as_str()).collect();
        assert_eq!(ids, ["main", "child-a", "grandchild", "child-b"]);
        assert_eq!(frames[0].parent_frame_id, "");
        assert_eq!(frames[1].parent_frame_id, "main");
        assert_eq!(frames[2].parent_frame_id, "child-a");
        assert_eq!(frames[3].parent_frame_id, "main");
    }
}
