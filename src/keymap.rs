//! Fixed physical-key-to-character table.
//!
//! When the layout override is enabled, dispatch resolves keys against this
//! table (ANSI physical positions) instead of the active keyboard layout, so a
//! chain like `o s` lands on the same tree entries on Dvorak or AZERTY as on
//! QWERTY. Shift state uppercases letters and shifts digits/punctuation.

/// Key codes for control keys the navigation machine handles directly.
pub const KEY_RETURN: u16 = 0x24;
pub const KEY_SPACE: u16 = 0x31;
pub const KEY_BACKSPACE: u16 = 0x33;
pub const KEY_ESCAPE: u16 = 0x35;

/// Resolve a physical key code to a character, ignoring the active layout.
/// Returns `None` for keys with no printable ANSI mapping.
pub fn physical_char(keycode: u16, shift: bool) -> Option<char> {
    let (plain, shifted) = base_pair(keycode)?;
    Some(if shift { shifted } else { plain })
}

fn base_pair(keycode: u16) -> Option<(char, char)> {
    let pair = match keycode {
        0x00 => ('a', 'A'),
        0x01 => ('s', 'S'),
        0x02 => ('d', 'D'),
        0x03 => ('f', 'F'),
        0x04 => ('h', 'H'),
        0x05 => ('g', 'G'),
        0x06 => ('z', 'Z'),
        0x07 => ('x', 'X'),
        0x08 => ('c', 'C'),
        0x09 => ('v', 'V'),
        0x0B => ('b', 'B'),
        0x0C => ('q', 'Q'),
        0x0D => ('w', 'W'),
        0x0E => ('e', 'E'),
        0x0F => ('r', 'R'),
        0x10 => ('y', 'Y'),
        0x11 => ('t', 'T'),
        0x12 => ('1', '!'),
        0x13 => ('2', '@'),
        0x14 => ('3', '#'),
        0x15 => ('4', '$'),
        0x16 => ('6', '^'),
        0x17 => ('5', '%'),
        0x18 => ('=', '+'),
        0x19 => ('9', '('),
        0x1A => ('7', '&'),
        0x1B => ('-', '_'),
        0x1C => ('8', '*'),
        0x1D => ('0', ')'),
        0x1E => (']', '}'),
        0x1F => ('o', 'O'),
        0x20 => ('u', 'U'),
        0x21 => ('[', '{'),
        0x22 => ('i', 'I'),
        0x23 => ('p', 'P'),
        0x25 => ('l', 'L'),
        0x26 => ('j', 'J'),
        0x27 => ('\'', '"'),
        0x28 => ('k', 'K'),
        0x29 => (';', ':'),
        0x2A => ('\\', '|'),
        0x2B => (',', '<'),
        0x2C => ('/', '?'),
        0x2D => ('n', 'N'),
        0x2E => ('m', 'M'),
        0x2F => ('.', '>'),
        0x32 => ('`', '~'),
        KEY_SPACE => (' ', ' '),
        _ => return None,
    };
    Some(pair)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_follow_shift_state() {
        assert_eq!(physical_char(0x1F, false), Some('o'));
        assert_eq!(physical_char(0x1F, true), Some('O'));
        assert_eq!(physical_char(0x01, false), Some('s'));
    }

    #[test]
    fn digits_shift_to_symbols() {
        assert_eq!(physical_char(0x12, false), Some('1'));
        assert_eq!(physical_char(0x12, true), Some('!'));
        assert_eq!(physical_char(0x1D, true), Some(')'));
    }

    #[test]
    fn control_keys_have_no_character() {
        assert_eq!(physical_char(KEY_ESCAPE, false), None);
        assert_eq!(physical_char(KEY_BACKSPACE, false), None);
        assert_eq!(physical_char(KEY_RETURN, true), None);
    }
}
