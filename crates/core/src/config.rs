use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;

/// Server configuration, loaded from `~/.bmcps/config.json` when present.
/// Every field has a default so a missing file means default behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Remote debugging port to request from Chrome. 0 = ephemeral; Chrome
    /// announces the real port through DevToolsActivePort.
    #[serde(default)]
    pub debug_port: u16,

    /// Launch Chrome with --disable-translate and refuse to adopt an
    /// already-running instance. Safe default: an adopted Chrome may have
    /// been launched with an incompatible flag set.
    #[serde(default = "default_disable_translate")]
    pub disable_translate: bool,

    /// Override the Chrome binary instead of scanning the candidate list.
    #[serde(default)]
    pub chrome_executable: Option<String>,

    /// Default timeout for a single CDP command, in milliseconds.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

fn default_disable_translate() -> bool {
    true
}

fn default_command_timeout_ms() -> u64 {
    10_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug_port: 0,
            disable_translate: default_disable_translate(),
            chrome_executable: None,
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl Config {
    pub fn load(paths: &Paths) -> Result<Self> {
        Self::load_from(&paths.config_file())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn save(&self, paths: &Paths) -> Result<()> {
        paths.ensure_dirs()?;
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let config = Config::load_from(Path::new("/nonexistent/config.json")).unwrap();
        assert_eq!(config.debug_port, 0);
        assert!(config.disable_translate);
        assert_eq!(config.command_timeout_ms, 10_000);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"debugPort": 9333}"#).unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.debug_port, 9333);
        assert!(config.disable_translate);
    }
}
