//! User settings for the chatty frontend.
//!
//! Settings live in a JSON file in the user's config directory:
//! - macOS: ~/Library/Application Support/chatty/settings.json
//! - Linux: ~/.config/chatty/settings.json
//! - Windows: C:\Users\<User>\AppData\Roaming\chatty\settings.json

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_session_name() -> String {
    "chatty".to_string()
}

fn default_context() -> String {
    "dataset".to_string()
}

fn default_channel_capacity() -> usize {
    100
}

fn default_heartbeat_timeout_secs() -> u64 {
    2
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChattySettings {
    /// Session name stamped on outbound requests
    #[serde(default = "default_session_name")]
    pub session_name: String,

    /// Context name used by `:context` when none is given
    #[serde(default = "default_context")]
    pub default_context: String,

    /// Buffer size of the shell and iopub bridge channels
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
}

impl Default for ChattySettings {
    fn default() -> Self {
        Self {
            session_name: default_session_name(),
            default_context: default_context(),
            channel_capacity: default_channel_capacity(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
        }
    }
}

impl ChattySettings {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

/// Get the path to the settings file
pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chatty")
        .join("settings.json")
}

/// Load settings from disk, returning defaults if the file is missing or unreadable
pub fn load_settings() -> ChattySettings {
    load_settings_from(&settings_path())
}

pub fn load_settings_from(path: &Path) -> ChattySettings {
    if path.exists() {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    } else {
        ChattySettings::default()
    }
}

/// Fields to change in the stored settings. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub session_name: Option<String>,
    pub default_context: Option<String>,
    pub channel_capacity: Option<usize>,
    pub heartbeat_timeout_secs: Option<u64>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, settings: &mut ChattySettings) {
        if let Some(ref name) = self.session_name {
            settings.session_name = name.clone();
        }
        if let Some(ref context) = self.default_context {
            settings.default_context = context.clone();
        }
        if let Some(capacity) = self.channel_capacity {
            settings.channel_capacity = capacity;
        }
        if let Some(secs) = self.heartbeat_timeout_secs {
            settings.heartbeat_timeout_secs = secs;
        }
    }
}

/// Apply `update` to the settings file and return the stored result.
pub fn update_settings(update: &SettingsUpdate) -> Result<ChattySettings> {
    update_settings_at(&settings_path(), update)
}

pub fn update_settings_at(path: &Path, update: &SettingsUpdate) -> Result<ChattySettings> {
    let mut settings = load_settings_from(path);
    update.apply(&mut settings);
    save_settings_to(&settings, path)?;
    Ok(settings)
}

pub fn save_settings_to(settings: &ChattySettings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}
