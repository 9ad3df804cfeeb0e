//! Settings module - persistent key-value preferences.
//!
//! This is the small, flat settings store (activation shortcut, modifier role
//! assignment, sticky policy, cache tuning), distinct from the per-context
//! action tree documents that the resolver owns.
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - Settings struct definitions (Settings, HotkeyConfig, ...)
//! - `loader` - File system loading and parsing

mod defaults;
mod loader;
mod types;

pub use defaults::{
    DEFAULT_HEALTH_CHECK_INTERVAL_MS, DEFAULT_RECOVERY_BASE_DELAY_MS,
    DEFAULT_RECOVERY_MAX_ATTEMPTS, DEFAULT_TREE_CACHE_MAX_COST, DEFAULT_TREE_CACHE_MAX_ENTRIES,
    DEFAULT_TREE_CACHE_TTL_SECS,
};
pub use loader::load_settings;
pub use types::{HotkeyConfig, Settings, StickyPolicy};
