//! Settings loading from the file system.
//!
//! Reads `settings.json` from the config directory. Any failure falls back to
//! defaults with a warning; settings problems are never fatal.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::types::Settings;

/// Load settings from `~/.keychord/settings.json` (or `$KEYCHORD_DIR`).
pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

pub fn load_settings_from(path: &Path) -> Settings {
    if !path.exists() {
        info!(path = %path.display(), "Settings file not found, using defaults");
        return Settings::default();
    }

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read settings, using defaults");
            return Settings::default();
        }
    };

    match serde_json::from_str::<Settings>(&text) {
        Ok(settings) => {
            info!(path = %path.display(), "Loaded settings");
            settings
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to parse settings, using defaults"
            );
            Settings::default()
        }
    }
}

fn settings_path() -> PathBuf {
    if let Ok(dir) = std::env::var("KEYCHORD_DIR") {
        return PathBuf::from(shellexpand::tilde(&dir).as_ref()).join("settings.json");
    }
    dirs::home_dir()
        .map(|h| h.join(".keychord").join("settings.json"))
        .unwrap_or_else(|| PathBuf::from(".keychord/settings.json"))
}
