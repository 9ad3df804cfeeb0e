//! Leaf action execution.
//!
//! Execution is handed off to a worker thread and never awaited on the
//! dispatch path; the navigation machine keeps moving while the OS launches
//! whatever was requested. Spawn failures that look transient (resource busy,
//! interrupted) get a bounded backoff retry.

use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{retry_with_backoff, KeychordError, Result, ResultExt};
use crate::tree::{Action, ActionKind};

/// Executes leaf actions. Dispatch hands actions to `execute` and moves on;
/// tests substitute a recording implementation.
pub trait ActionRunner: Send + Sync {
    fn execute(&self, action: &Action);
}

/// The real runner: spawns a worker thread per action.
#[derive(Debug, Default)]
pub struct SystemExecutor;

impl ActionRunner for SystemExecutor {
    fn execute(&self, action: &Action) {
        let action = action.clone();
        std::thread::spawn(move || {
            let label = action.label.clone().unwrap_or_else(|| action.value.clone());
            info!(
                event_type = "action",
                kind = ?action.kind,
                value = %action.value,
                "Executing '{}'", label
            );
            run(&action).log_err();
        });
    }
}

fn run(action: &Action) -> Result<()> {
    match action.kind {
        ActionKind::Application => launch_application(&action.value),
        ActionKind::Url => open_with_system(&action.value),
        ActionKind::Folder => open_with_system(&action.value),
        ActionKind::Command => run_command(&action.value),
        ActionKind::Shortcut => run_shortcut(&action.value),
        ActionKind::Text => stage_text(&action.value),
    }
}

#[cfg(target_os = "macos")]
fn launch_application(value: &str) -> Result<()> {
    // `open -a` resolves both bundle paths and application names.
    spawn_detached(Command::new("open").arg("-a").arg(value), value)
}

#[cfg(not(target_os = "macos"))]
fn launch_application(value: &str) -> Result<()> {
    open_with_system(value)
}

fn open_with_system(value: &str) -> Result<()> {
    open::that_detached(value)
        .map_err(|e| KeychordError::from_io(value.into(), e))
        .map(|()| {
            debug!(value = %value, "Opened with system handler");
        })
}

fn run_command(value: &str) -> Result<()> {
    let value = value.to_string();
    retry_with_backoff(3, Duration::from_millis(50), move || {
        spawn_detached(
            Command::new("sh")
                .arg("-c")
                .arg(&value)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null()),
            &value,
        )
    })
}

#[cfg(target_os = "macos")]
fn run_shortcut(value: &str) -> Result<()> {
    spawn_detached(Command::new("shortcuts").arg("run").arg(value), value)
}

#[cfg(not(target_os = "macos"))]
fn run_shortcut(value: &str) -> Result<()> {
    tracing::warn!(value = %value, "Shortcut actions are not supported on this platform");
    Ok(())
}

/// Text actions stage their payload on the clipboard; pasting into the
/// frontmost app is the presentation layer's business.
fn stage_text(value: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new()
        .map_err(|e| KeychordError::Transient(format!("clipboard unavailable: {}", e)))?;
    clipboard
        .set_text(value.to_string())
        .map_err(|e| KeychordError::Transient(format!("clipboard write failed: {}", e)))?;
    debug!(len = value.len(), "Text staged on clipboard");
    Ok(())
}

fn spawn_detached(command: &mut Command, what: &str) -> Result<()> {
    match command.spawn() {
        Ok(child) => {
            debug!(what = %what, pid = child.id(), "Spawned");
            Ok(())
        }
        Err(e) => Err(KeychordError::from_io(what.into(), e)),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_spawn_succeeds() {
        // `true` exists everywhere we test.
        assert!(run_command("true").is_ok());
    }

    #[test]
    fn recording_runner_captures_in_order() {
        use test_support::RecordingRunner;
        let runner = RecordingRunner::new();
        for value in ["a", "b", "c"] {
            runner.execute(&Action {
                key: None,
                kind: ActionKind::Command,
                value: value.into(),
                label: None,
                icon_path: None,
                activates: None,
                from_fallback: false,
            });
        }
        assert_eq!(runner.values(), vec!["a", "b", "c"]);
    }
}
