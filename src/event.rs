//! Raw keyboard event types shared between the capture layer and the dispatcher.

use bitflags::bitflags;

bitflags! {
    /// Modifier keys held during a key event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const SHIFT   = 1 << 0;
        const CONTROL = 1 << 1;
        const ALT     = 1 << 2;
        const META    = 1 << 3;
    }
}

impl Modifiers {
    /// Parse a modifier name as used in the settings file ("shift", "ctrl", ...).
    pub fn parse_name(name: &str) -> Option<Modifiers> {
        match name {
            "shift" => Some(Modifiers::SHIFT),
            "ctrl" | "control" => Some(Modifiers::CONTROL),
            "alt" | "option" => Some(Modifiers::ALT),
            "meta" | "cmd" | "command" => Some(Modifiers::META),
            _ => None,
        }
    }
}

/// What kind of key transition an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    Down,
    Up,
    FlagsChanged,
}

/// A system-wide keyboard event as delivered by a capture handle.
///
/// `character` is the layout-resolved character when the OS supplied one;
/// `keycode` is the physical key code, used when the layout override is on.
#[derive(Debug, Clone)]
pub struct RawKeyEvent {
    pub kind: KeyEventKind,
    pub keycode: u16,
    pub character: Option<char>,
    pub modifiers: Modifiers,
}

impl RawKeyEvent {
    pub fn down(keycode: u16, character: Option<char>, modifiers: Modifiers) -> Self {
        RawKeyEvent {
            kind: KeyEventKind::Down,
            keycode,
            character,
            modifiers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_names_parse() {
        assert_eq!(Modifiers::parse_name("shift"), Some(Modifiers::SHIFT));
        assert_eq!(Modifiers::parse_name("cmd"), Some(Modifiers::META));
        assert_eq!(Modifiers::parse_name("option"), Some(Modifiers::ALT));
        assert_eq!(Modifiers::parse_name("hyper"), None);
    }

    #[test]
    fn modifiers_combine() {
        let mods = Modifiers::SHIFT | Modifiers::META;
        assert!(mods.contains(Modifiers::SHIFT));
        assert!(!mods.contains(Modifiers::CONTROL));
    }
}
