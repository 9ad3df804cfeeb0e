//! Keychord - a global keystroke-driven command dispatcher.
//!
//! One activation shortcut opens an overlay; from there, short single-key
//! chains walk a user-configured tree of groups and actions. Leaves launch
//! applications, open URLs and folders, run shell commands and shortcuts,
//! or stage text on the clipboard.
//!
//! Core pieces: a redundant [`capture`] layer with health-checked failover,
//! the [`navigation`] state machine, the per-application [`resolver`] with
//! recursive fallback merging, and the [`cache`] pair that keeps dispatch
//! O(1) per keystroke.

pub mod cache;
pub mod capture;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod executor;
pub mod hotkey;
pub mod keymap;
pub mod logging;
pub mod navigation;
pub mod presentation;
pub mod resolver;
pub mod tree;
pub mod validator;
pub mod watcher;
