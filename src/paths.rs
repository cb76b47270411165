use anyhow::{Context, Result};
use std::path::PathBuf;

/// Name of the env var that overrides the config directory
pub const CONFIG_DIR_ENV: &str = "MEDIA_NODE_CONFIG_DIR";

/// Settings files and instance directories, relative to the config directory
pub const APP_FILE: &str = "app.ini";
pub const NODE_FILE: &str = "media_node.ini";
pub const DISPLAYS_FILE: &str = "displays.conf";
pub const LOG_FILE: &str = "media-node.log";
pub const PLAYERS_DIR: &str = "players";
pub const BROWSERS_DIR: &str = "browsers";

/// Configuration for overriding default application paths
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Create PathConfig from CLI arguments and environment variables
    ///
    /// Priority: CLI args → ENV var (MEDIA_NODE_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| {
            std::env::var(CONFIG_DIR_ENV)
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        });

        Self { config_dir }
    }

    /// Resolved configuration directory
    ///
    /// Priority:
    /// 1. CLI --config-dir argument
    /// 2. MEDIA_NODE_CONFIG_DIR environment variable
    /// 3. Platform-specific config directory from dirs-next
    /// 4. "." if no platform directory is known
    ///
    /// Platform paths:
    /// - Linux: ~/.config/media-node
    /// - macOS: ~/Library/Application Support/media-node
    /// - Windows: %APPDATA%\media-node
    pub fn dir(&self) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        if let Some(dir) = dirs_next::config_dir() {
            return dir.join("media-node");
        }
        PathBuf::from(".")
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.dir().join(name)
    }

    pub fn players_dir(&self) -> PathBuf {
        self.dir().join(PLAYERS_DIR)
    }

    pub fn browsers_dir(&self) -> PathBuf {
        self.dir().join(BROWSERS_DIR)
    }

    /// Ensure the config directory and the instance directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.dir(), self.players_dir(), self.browsers_dir()] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }
}
