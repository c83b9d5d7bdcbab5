use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".bmcps"))
            .unwrap_or_else(|| PathBuf::from(".bmcps"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Pinned Chrome user-data directory. A single well-known path: a second
    /// server instance on the same machine would collide, which is the
    /// accepted single-instance restriction.
    pub fn chrome_profile_dir(&self) -> PathBuf {
        self.base.join("chrome-profile")
    }

    pub fn devtools_active_port_file(&self) -> PathBuf {
        self.chrome_profile_dir().join("DevToolsActivePort")
    }

    pub fn media_dir(&self) -> PathBuf {
        self.base.join("media")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.chrome_profile_dir())?;
        std::fs::create_dir_all(self.media_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
