//! Settings type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::event::Modifiers;

use super::defaults::*;

/// Activation shortcut: modifier names plus a physical key name
/// (e.g. `{"modifiers": ["meta"], "key": "Semicolon"}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyConfig {
    pub modifiers: Vec<String>,
    pub key: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        HotkeyConfig {
            modifiers: DEFAULT_HOTKEY_MODIFIERS.iter().map(|s| s.to_string()).collect(),
            key: DEFAULT_HOTKEY_KEY.to_string(),
        }
    }
}

impl HotkeyConfig {
    /// Human-readable form for logs ("meta+Semicolon").
    pub fn display(&self) -> String {
        if self.modifiers.is_empty() {
            self.key.clone()
        } else {
            format!("{}+{}", self.modifiers.join("+"), self.key)
        }
    }
}

/// What happens to open navigation after an action executes with the sticky
/// modifier held (or while a sticky-mode group is active).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StickyPolicy {
    #[default]
    Hide,
    ResetToRoot,
    DoNothing,
}

/// Persistent user preferences. Every field has a serde default so a partial
/// file parses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub hotkey: HotkeyConfig,

    #[serde(default)]
    pub sticky_policy: StickyPolicy,

    /// Modifier that keeps navigation open after a leaf executes.
    #[serde(default = "default_sticky_modifier")]
    pub sticky_modifier: String,

    /// Modifier that runs a whole group as a sequence instead of descending.
    #[serde(default = "default_sequence_modifier")]
    pub run_as_sequence_modifier: String,

    /// Resolve keys from physical key positions instead of the active layout.
    #[serde(default)]
    pub force_physical_layout: bool,

    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    #[serde(default = "default_tree_cache_ttl_secs")]
    pub tree_cache_ttl_secs: u64,

    #[serde(default = "default_tree_cache_max_entries")]
    pub tree_cache_max_entries: usize,

    #[serde(default = "default_tree_cache_max_cost")]
    pub tree_cache_max_cost: usize,

    /// Override for the config directory (defaults to ~/.keychord).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<String>,
}

fn default_sticky_modifier() -> String {
    DEFAULT_STICKY_MODIFIER.to_string()
}
fn default_sequence_modifier() -> String {
    DEFAULT_SEQUENCE_MODIFIER.to_string()
}
fn default_health_check_interval_ms() -> u64 {
    DEFAULT_HEALTH_CHECK_INTERVAL_MS
}
fn default_tree_cache_ttl_secs() -> u64 {
    DEFAULT_TREE_CACHE_TTL_SECS
}
fn default_tree_cache_max_entries() -> usize {
    DEFAULT_TREE_CACHE_MAX_ENTRIES
}
fn default_tree_cache_max_cost() -> usize {
    DEFAULT_TREE_CACHE_MAX_COST
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            hotkey: HotkeyConfig::default(),
            sticky_policy: StickyPolicy::default(),
            sticky_modifier: default_sticky_modifier(),
            run_as_sequence_modifier: default_sequence_modifier(),
            force_physical_layout: false,
            health_check_interval_ms: DEFAULT_HEALTH_CHECK_INTERVAL_MS,
            tree_cache_ttl_secs: DEFAULT_TREE_CACHE_TTL_SECS,
            tree_cache_max_entries: DEFAULT_TREE_CACHE_MAX_ENTRIES,
            tree_cache_max_cost: DEFAULT_TREE_CACHE_MAX_COST,
            config_dir: None,
        }
    }
}

impl Settings {
    /// The directory holding context config files. `$KEYCHORD_DIR` overrides
    /// everything, then the `configDir` setting, then `~/.keychord`.
    pub fn config_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var("KEYCHORD_DIR") {
            return PathBuf::from(shellexpand::tilde(&dir).as_ref());
        }
        match &self.config_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).as_ref()),
            None => dirs::home_dir()
                .map(|h| h.join(".keychord"))
                .unwrap_or_else(|| PathBuf::from(".keychord")),
        }
    }

    pub fn sticky_modifier_flags(&self) -> Modifiers {
        Modifiers::parse_name(&self.sticky_modifier).unwrap_or(Modifiers::SHIFT)
    }

    pub fn sequence_modifier_flags(&self) -> Modifiers {
        Modifiers::parse_name(&self.run_as_sequence_modifier).unwrap_or(Modifiers::CONTROL)
    }
}
