//! User configuration: `~/.config/cog-explorer/config.toml`.
//!
//! Every field has a default, so a missing file, a missing section or a
//! missing key all fall back to the compiled defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Environment variable overriding `backend.base_url`.
pub const BACKEND_ENV: &str = "COG_EXPLORER_BACKEND";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// How long an unread notification is kept.
    pub ttl_secs: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { ttl_secs: 5 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendSettings,
    pub notifications: NotificationSettings,
}

impl Settings {
    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(target: "config", path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!(target: "config", path = %path.display(), "loaded config");
        Ok(settings)
    }

    /// Apply `COG_EXPLORER_BACKEND` if it is set and non-empty.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BACKEND_ENV) {
            self.override_base_url(Some(url));
        }
    }

    pub fn override_base_url(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.backend.base_url = url.trim().to_string();
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs.max(1))
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_secs(self.notifications.ttl_secs)
    }
}

/// `$XDG_CONFIG_HOME/cog-explorer`, falling back to `$HOME/.config/cog-explorer`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        let mut p = PathBuf::from(xdg);
        p.push("cog-explorer");
        return p;
    }
    let mut p = home_dir();
    p.push(".config");
    p.push("cog-explorer");
    p
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// The user's home directory, `/tmp` if `$HOME` is unset.
pub(crate) fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
