//! Activation shortcut registration.
//!
//! Registers the configured system-wide shortcut and forwards presses over a
//! bounded channel. The capture layer sees every key; this is the one
//! shortcut the OS resolves for us, so activation works even while both
//! capture handles are down.

use global_hotkey::{
    hotkey::{Code, HotKey, Modifiers},
    Error as HotkeyError, GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
};
use tracing::{info, warn};

use crate::config::HotkeyConfig;
use crate::logging;

/// Map a configured key name to a `Code`. Unknown names fall back to
/// Semicolon so a typo in settings still yields a working activation key.
fn parse_code(key: &str) -> Code {
    match key {
        "Semicolon" => Code::Semicolon,
        "Space" => Code::Space,
        "Enter" => Code::Enter,
        "Comma" => Code::Comma,
        "Period" => Code::Period,
        "Slash" => Code::Slash,
        "Backquote" => Code::Backquote,
        "Digit0" => Code::Digit0,
        "Digit1" => Code::Digit1,
        "Digit2" => Code::Digit2,
        "Digit3" => Code::Digit3,
        "Digit4" => Code::Digit4,
        "Digit5" => Code::Digit5,
        "Digit6" => Code::Digit6,
        "Digit7" => Code::Digit7,
        "Digit8" => Code::Digit8,
        "Digit9" => Code::Digit9,
        "KeyA" => Code::KeyA,
        "KeyB" => Code::KeyB,
        "KeyC" => Code::KeyC,
        "KeyD" => Code::KeyD,
        "KeyE" => Code::KeyE,
        "KeyF" => Code::KeyF,
        "KeyG" => Code::KeyG,
        "KeyH" => Code::KeyH,
        "KeyI" => Code::KeyI,
        "KeyJ" => Code::KeyJ,
        "KeyK" => Code::KeyK,
        "KeyL" => Code::KeyL,
        "KeyM" => Code::KeyM,
        "KeyN" => Code::KeyN,
        "KeyO" => Code::KeyO,
        "KeyP" => Code::KeyP,
        "KeyQ" => Code::KeyQ,
        "KeyR" => Code::KeyR,
        "KeyS" => Code::KeyS,
        "KeyT" => Code::KeyT,
        "KeyU" => Code::KeyU,
        "KeyV" => Code::KeyV,
        "KeyW" => Code::KeyW,
        "KeyX" => Code::KeyX,
        "KeyY" => Code::KeyY,
        "KeyZ" => Code::KeyZ,
        "F1" => Code::F1,
        "F2" => Code::F2,
        "F3" => Code::F3,
        "F4" => Code::F4,
        "F5" => Code::F5,
        "F6" => Code::F6,
        "F7" => Code::F7,
        "F8" => Code::F8,
        "F9" => Code::F9,
        "F10" => Code::F10,
        "F11" => Code::F11,
        "F12" => Code::F12,
        other => {
            warn!(
                key = other,
                "Unknown key code, valid keys are KeyA-KeyZ, Digit0-Digit9, F1-F12, Space, Enter, Semicolon. Falling back to Semicolon"
            );
            Code::Semicolon
        }
    }
}

fn parse_modifiers(names: &[String]) -> Modifiers {
    let mut modifiers = Modifiers::empty();
    for name in names {
        match name.as_str() {
            "meta" | "cmd" | "command" => modifiers |= Modifiers::META,
            "ctrl" | "control" => modifiers |= Modifiers::CONTROL,
            "alt" | "option" => modifiers |= Modifiers::ALT,
            "shift" => modifiers |= Modifiers::SHIFT,
            other => warn!(modifier = other, "Unknown modifier"),
        }
    }
    modifiers
}

fn format_hotkey_error(e: &HotkeyError, shortcut_display: &str) -> String {
    match e {
        HotkeyError::AlreadyRegistered(hk) => format!(
            "Hotkey '{}' is already registered by another application (ID: {}). \
             Try a different shortcut or close the conflicting app.",
            shortcut_display,
            hk.id()
        ),
        HotkeyError::FailedToRegister(msg) => format!(
            "System rejected hotkey '{}': {}. This shortcut may be reserved by the OS.",
            shortcut_display, msg
        ),
        HotkeyError::OsError(os_err) => format!(
            "OS error registering '{}': {}. Check system hotkey settings.",
            shortcut_display, os_err
        ),
        other => format!("Failed to register hotkey '{}': {}", shortcut_display, other),
    }
}

/// Register the activation shortcut and forward each press as a unit on the
/// returned channel. Registration failure is logged, not fatal: the stdin
/// command channel still works.
pub fn start_hotkey_listener(config: HotkeyConfig) -> async_channel::Receiver<()> {
    let (tx, rx) = async_channel::bounded(10);

    std::thread::spawn(move || {
        let manager = match GlobalHotKeyManager::new() {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "Failed to create hotkey manager");
                return;
            }
        };

        let code = parse_code(&config.key);
        let modifiers = parse_modifiers(&config.modifiers);
        let hotkey = HotKey::new(Some(modifiers), code);
        let hotkey_display = config.display();

        if let Err(e) = manager.register(hotkey) {
            logging::log("HOTKEY", &format_hotkey_error(&e, &hotkey_display));
            return;
        }
        info!(shortcut = %hotkey_display, id = hotkey.id(), "Registered activation hotkey");

        let receiver = GlobalHotKeyEvent::receiver();
        loop {
            match receiver.recv() {
                Ok(event) => {
                    if event.state != HotKeyState::Pressed || event.id != hotkey.id() {
                        continue;
                    }
                    logging::log("HOTKEY", &format!("{} pressed", hotkey_display));
                    if tx.send_blocking(()).is_err() {
                        logging::log("HOTKEY", "Hotkey channel closed, exiting");
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_key_names_parse() {
        assert_eq!(parse_code("Semicolon"), Code::Semicolon);
        assert_eq!(parse_code("KeyK"), Code::KeyK);
        assert_eq!(parse_code("Digit7"), Code::Digit7);
        assert_eq!(parse_code("F12"), Code::F12);
    }

    #[test]
    fn unknown_key_name_falls_back_to_semicolon() {
        assert_eq!(parse_code("Hyperspace"), Code::Semicolon);
    }

    #[test]
    fn modifier_aliases_parse() {
        let mods = parse_modifiers(&[
            "meta".to_string(),
            "shift".to_string(),
            "bogus".to_string(),
        ]);
        assert!(mods.contains(Modifiers::META));
        assert!(mods.contains(Modifiers::SHIFT));
        assert!(!mods.contains(Modifiers::CONTROL));
    }
}
