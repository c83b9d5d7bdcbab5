//! Chrome process launcher and DevToolsActivePort rendezvous.
//!
//! Chrome writes `{profile_dir}/DevToolsActivePort` once its debug endpoint
//! is up: line 1 is the port, line 2 (optional) the browser-level endpoint
//! path. We poll for the file, parse it, and probe the HTTP endpoint inside
//! a short settling window before handing the WebSocket URL upward.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use once_cell::sync::Lazy;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info};

static PROBE_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

const PORT_FILE_TIMEOUT: Duration = Duration::from_secs(15);
const PORT_FILE_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Budget for the post-port-file settling probe: the HTTP upgrade may not be
/// accepted the instant the file appears.
const SETTLE_BUDGET: Duration = Duration::from_millis(1500);
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Candidate Chrome/Chromium binaries, in preference order. Bare names are
/// resolved through PATH; absolute paths are checked on disk.
pub const CHROME_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium-browser",
    "/usr/bin/chromium",
    "/snap/bin/chromium",
];

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(
        "Could not find Chrome executable on this system. \
         Install google-chrome or chromium and ensure it is on PATH."
    )]
    NotFound,
    #[error("Failed to spawn Chrome: {0}")]
    SpawnFailed(String),
    #[error("Timed out waiting for DevToolsActivePort file at: {0}")]
    PortFileTimeout(String),
    #[error("Failed to parse DevToolsActivePort file at: {0}")]
    PortFileParse(String),
}

pub struct ChromeLaunch {
    pub child: Child,
    pub websocket_url: String,
    pub profile_dir: PathBuf,
}

pub fn find_chrome_executable() -> Option<PathBuf> {
    for candidate in CHROME_CANDIDATES {
        if candidate.contains('/') {
            let path = Path::new(candidate);
            if path.exists() {
                return Some(path.to_path_buf());
            }
        } else if let Ok(resolved) = which::which(candidate) {
            return Some(resolved);
        }
    }
    None
}

/// Argv for a debuggable Chrome. Port 0 asks for an ephemeral port; the real
/// one arrives through DevToolsActivePort. Sandbox is disabled only when
/// running as root, where Chrome refuses to start with it on.
pub fn build_chrome_args(profile_dir: &Path, debug_port: u16) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={debug_port}"),
        "--remote-allow-origins=*".to_string(),
        format!("--user-data-dir={}", profile_dir.display()),
    ];
    if running_as_root() {
        args.push("--no-sandbox".to_string());
    }
    args.extend(
        [
            "--no-first-run",
            "--no-default-browser-check",
            "--disable-background-networking",
            "--disable-client-side-phishing-detection",
            "--disable-default-apps",
            "--disable-extensions",
            "--disable-hang-monitor",
            "--disable-popup-blocking",
            "--disable-prompt-on-repost",
            "--disable-sync",
            "--disable-translate",
            "--metrics-recording-only",
            "--safebrowsing-disable-auto-update",
            "about:blank",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args
}

#[cfg(unix)]
fn running_as_root() -> bool {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata("/proc/self")
        .map(|metadata| metadata.uid() == 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}

/// Parse DevToolsActivePort contents: line 1 an integer port in (0, 65535],
/// line 2 (optional) the browser endpoint path fragment.
pub fn parse_devtools_active_port(contents: &str) -> Option<(u16, Option<String>)> {
    let mut lines = contents.lines();
    let port: u32 = lines.next()?.trim().parse().ok()?;
    if port == 0 || port > 65535 {
        return None;
    }
    let path = lines
        .next()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty());
    Some((port as u16, path))
}

/// Browser-level WebSocket URL. The path is normalized to exactly one
/// leading slash; a missing path falls back to `/devtools/browser`.
pub fn build_websocket_url(port: u16, browser_path: Option<&str>) -> String {
    let path = match browser_path {
        Some(fragment) => format!("/{}", fragment.trim_start_matches('/')),
        None => "/devtools/browser".to_string(),
    };
    format!("ws://127.0.0.1:{port}{path}")
}

/// Poll until the port file exists and is non-empty (Chrome creates the
/// file before writing it; zero bytes means not ready).
async fn wait_for_port_file(path: &Path, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(metadata) = std::fs::metadata(path) {
            if metadata.len() > 0 {
                return true;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(PORT_FILE_POLL_INTERVAL).await;
    }
}

/// Probe GET /json/version until the endpoint answers or the settling budget
/// runs out. Outcome is advisory: the WebSocket connect has its own timeout.
async fn settle_endpoint(port: u16) {
    let url = format!("http://127.0.0.1:{port}/json/version");
    let deadline = tokio::time::Instant::now() + SETTLE_BUDGET;
    loop {
        match PROBE_CLIENT.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("CDP endpoint ready on port {port}");
                return;
            }
            _ => {}
        }
        if tokio::time::Instant::now() >= deadline {
            debug!("CDP endpoint probe budget exhausted on port {port}; proceeding");
            return;
        }
        tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
    }
}

/// Adoption path: if a previous Chrome is still running on the pinned
/// profile, its DevToolsActivePort is present and the endpoint answers the
/// version probe. Returns the WebSocket URL without spawning anything.
pub async fn try_adopt_existing(profile_dir: &Path) -> Option<String> {
    let port_file = profile_dir.join("DevToolsActivePort");
    let contents = std::fs::read_to_string(&port_file).ok()?;
    let (port, path) = parse_devtools_active_port(&contents)?;

    let url = format!("http://127.0.0.1:{port}/json/version");
    let response = PROBE_CLIENT
        .get(&url)
        .timeout(Duration::from_millis(800))
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }

    let ws_url = build_websocket_url(port, path.as_deref());
    debug!("adopting existing Chrome at {ws_url}");
    Some(ws_url)
}

/// Spawn a fresh Chrome and rendezvous with its debug endpoint. On any
/// failure after the spawn the child is killed before returning.
pub async fn launch_chrome(
    profile_dir: &Path,
    debug_port: u16,
    executable_override: Option<&str>,
) -> Result<ChromeLaunch, LaunchError> {
    let executable = match executable_override {
        Some(path) => PathBuf::from(path),
        None => find_chrome_executable().ok_or(LaunchError::NotFound)?,
    };

    std::fs::create_dir_all(profile_dir)
        .map_err(|err| LaunchError::SpawnFailed(format!("create profile dir: {err}")))?;

    // A stale port file from a dead Chrome would win the poll race.
    let port_file = profile_dir.join("DevToolsActivePort");
    let _ = std::fs::remove_file(&port_file);

    let args = build_chrome_args(profile_dir, debug_port);
    let mut child = Command::new(&executable)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| LaunchError::SpawnFailed(err.to_string()))?;

    if !wait_for_port_file(&port_file, PORT_FILE_TIMEOUT).await {
        let _ = child.kill().await;
        return Err(LaunchError::PortFileTimeout(
            port_file.display().to_string(),
        ));
    }

    let contents = std::fs::read_to_string(&port_file)
        .map_err(|_| LaunchError::PortFileParse(port_file.display().to_string()))?;
    let Some((port, path)) = parse_devtools_active_port(&contents) else {
        let _ = child.kill().await;
        return Err(LaunchError::PortFileParse(
            port_file.display().to_string(),
        ));
    };

    settle_endpoint(port).await;

    let websocket_url = build_websocket_url(port, path.as_deref());
    info!(
        "Chrome launched (pid={:?}, port={port})",
        child.id()
    );

    Ok(ChromeLaunch {
        child,
        websocket_url,
        profile_dir: profile_dir.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_port_and_path() {
        let (port, path) =
            parse_devtools_active_port("39117\n/devtools/browser/ab-cd\n").unwrap();
        assert_eq!(port, 39117);
        assert_eq!(path.as_deref(), Some("/devtools/browser/ab-cd"));
    }

    #[test]
    fn parses_port_without_second_line() {
        let (port, path) = parse_devtools_active_port("9222").unwrap();
        assert_eq!(port, 9222);
        assert!(path.is_none());
    }

    #[test]
    fn rejects_bad_ports() {
        assert!(parse_devtools_active_port("").is_none());
        assert!(parse_devtools_active_port("0\n/x").is_none());
        assert!(parse_devtools_active_port("65536\n/x").is_none());
        assert!(parse_devtools_active_port("not-a-port\n/x").is_none());
    }

    #[test]
    fn websocket_url_missing_path_falls_back() {
        assert_eq!(
            build_websocket_url(9222, None),
            "ws://127.0.0.1:9222/devtools/browser"
        );
    }

    #[test]
    fn websocket_url_normalizes_leading_slashes() {
        for fragment in ["devtools/browser/x", "/devtools/browser/x", "///devtools/browser/x"] {
            assert_eq!(
                build_websocket_url(40000, Some(fragment)),
                "ws://127.0.0.1:40000/devtools/browser/x",
                "fragment {fragment:?} must normalize to one leading slash"
            );
        }
    }

    #[test]
    fn chrome_args_shape() {
        let args = build_chrome_args(Path::new("/tmp/profile"), 0);
        assert_eq!(args[0], "--remote-debugging-port=0");
        assert!(args.contains(&"--remote-allow-origins=*".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
        assert!(args.contains(&"--disable-translate".to_string()));
        assert!(args.contains(&"--no-first-run".to_string()));
        assert_eq!(args.last().unwrap(), "about:blank");
    }

    #[test]
    fn chrome_args_caller_port() {
        let args = build_chrome_args(Path::new("/tmp/profile"), 9333);
        assert_eq!(args[0], "--remote-debugging-port=9333");
    }

    #[tokio::test]
    async fn port_file_poll_treats_zero_byte_as_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DevToolsActivePort");
        std::fs::write(&path, b"").unwrap();
        assert!(!wait_for_port_file(&path, Duration::from_millis(250)).await);

        std::fs::write(&path, b"9222\n").unwrap();
        assert!(wait_for_port_file(&path, Duration::from_millis(250)).await);
    }
}
