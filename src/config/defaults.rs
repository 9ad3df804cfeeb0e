//! Default settings values.
//!
//! All constants used throughout the settings module are defined here.

/// Default activation shortcut parts.
pub const DEFAULT_HOTKEY_MODIFIERS: &[&str] = &["meta"];
pub const DEFAULT_HOTKEY_KEY: &str = "Semicolon";

/// Default modifier roles during navigation.
pub const DEFAULT_STICKY_MODIFIER: &str = "shift";
pub const DEFAULT_SEQUENCE_MODIFIER: &str = "ctrl";

/// Capture layer health check cadence and recovery bounds.
pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_RECOVERY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RECOVERY_BASE_DELAY_MS: u64 = 100;

/// Tree cache tuning: time bound, entry bound, and an estimated cost bound
/// proportional to total node count.
pub const DEFAULT_TREE_CACHE_TTL_SECS: u64 = 30;
pub const DEFAULT_TREE_CACHE_MAX_ENTRIES: usize = 64;
pub const DEFAULT_TREE_CACHE_MAX_COST: usize = 50_000;
