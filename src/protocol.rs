//! Keyboard status protocol
//!
//! Every outbound frame is a system exclusive message:
//!
//! ```text
//! F0 00 00 66 <cmd> 12 <page> <payload...> F7
//! ```
//!
//! * status update (`cmd = 0x14`, page 0): track name, index and optionally the
//!   instrument name and instance id, separated by `0x19`
//! * display text (`cmd = 0x17`): 28 space-padded characters at `page = grid * 28`
//!
//! Encoding is stateless; callers hand the bytes to the MIDI transport as-is.

use crate::host::InstrumentDescriptor;
use crate::midi::MidiMessage;

/// Manufacturer id bytes following 0xF0
pub const MANUFACTURER_ID: [u8; 3] = [0x00, 0x00, 0x66];

/// Command byte of a focus status update
pub const CMD_STATUS: u8 = 0x14;

/// Command byte of a free-text display update
pub const CMD_DISPLAY_TEXT: u8 = 0x17;

/// Sub-command byte shared by both messages
pub const SUB_COMMAND: u8 = 0x12;

/// Separator between status fields
pub const FIELD_DELIMITER: u8 = 0x19;

/// Characters per display line
pub const DISPLAY_WIDTH: usize = 28;

/// Text longer than a line is cut to this many characters before padding
pub const DISPLAY_TRUNCATED_LEN: usize = 27;

/// Highest addressable display grid
pub const MAX_GRID: u8 = 3;

/// Substitute for characters outside 7-bit ASCII
const REPLACEMENT_CHAR: u8 = b'?';

/// Build the status update announcing a focused track
pub fn status_update(
    track_name: &str,
    index: usize,
    instrument: Option<&InstrumentDescriptor>,
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(track_name.len() + 32);

    push_ascii(&mut payload, track_name);
    payload.push(FIELD_DELIMITER);
    push_ascii(&mut payload, &index.to_string());

    if let Some(instrument) = instrument {
        payload.push(FIELD_DELIMITER);
        push_ascii(&mut payload, &instrument.display_name);

        if let Some(instance_id) = &instrument.instance_id {
            payload.push(FIELD_DELIMITER);
            push_ascii(&mut payload, instance_id);
        }
    }

    frame(CMD_STATUS, 0x00, payload)
}

/// Build a display text message for one grid line
pub fn display_text(text: &str, grid: u8) -> Vec<u8> {
    let char_count = text.chars().count();
    let visible: String = if char_count > DISPLAY_WIDTH {
        text.chars().take(DISPLAY_TRUNCATED_LEN).collect()
    } else {
        text.to_string()
    };

    let mut payload = Vec::with_capacity(DISPLAY_WIDTH);
    push_ascii(&mut payload, &visible);
    payload.resize(DISPLAY_WIDTH, b' ');

    let page = grid.min(MAX_GRID) * DISPLAY_WIDTH as u8;
    frame(CMD_DISPLAY_TEXT, page, payload)
}

fn frame(command: u8, page: u8, payload: Vec<u8>) -> Vec<u8> {
    let mut data = Vec::with_capacity(payload.len() + 6);
    data.extend_from_slice(&MANUFACTURER_ID);
    data.push(command);
    data.push(SUB_COMMAND);
    data.push(page);
    data.extend(payload);

    MidiMessage::SysEx { data }.encode()
}

/// Append text as 7-bit ASCII; anything else would break the SysEx frame
fn push_ascii(buf: &mut Vec<u8>, text: &str) {
    buf.extend(text.chars().map(|c| {
        if c.is_ascii() {
            c as u8
        } else {
            REPLACEMENT_CHAR
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER_STATUS: [u8; 7] = [0xF0, 0x00, 0x00, 0x66, 0x14, 0x12, 0x00];

    #[test]
    fn test_status_with_native_instrument() {
        let instrument = InstrumentDescriptor::new("Kontakt", Some("42"));
        let bytes = status_update("Bass", 3, Some(&instrument));

        let mut expected = HEADER_STATUS.to_vec();
        expected.extend_from_slice(b"Bass");
        expected.push(0x19);
        expected.push(b'3');
        expected.push(0x19);
        expected.extend_from_slice(b"Kontakt");
        expected.push(0x19);
        expected.extend_from_slice(b"42");
        expected.push(0xF7);

        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_status_without_instance_id() {
        let instrument = InstrumentDescriptor::new("Operator", None);
        let bytes = status_update("Lead", 12, Some(&instrument));

        let mut expected = HEADER_STATUS.to_vec();
        expected.extend_from_slice(b"Lead\x1912\x19Operator");
        expected.push(0xF7);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_status_without_instrument_ends_after_index() {
        let bytes = status_update("Audio 1", 0, None);

        let mut expected = HEADER_STATUS.to_vec();
        expected.extend_from_slice(b"Audio 1\x190");
        expected.push(0xF7);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_status_replaces_non_ascii() {
        let bytes = status_update("Café", 1, None);
        assert_eq!(&bytes[7..12], b"Caf?\x19");
        assert!(bytes[1..bytes.len() - 1].iter().all(|b| *b < 0x80));
    }

    #[test]
    fn test_display_text_truncates_long_input() {
        let text = "abcdefghijklmnopqrstuvwxyz0123456789ABCD";
        assert_eq!(text.len(), 40);

        let bytes = display_text(text, 0);
        assert_eq!(&bytes[..7], &[0xF0, 0x00, 0x00, 0x66, 0x17, 0x12, 0x00]);

        let payload = &bytes[7..bytes.len() - 1];
        assert_eq!(payload.len(), 28);
        assert_eq!(&payload[..27], &text.as_bytes()[..27]);
        assert_eq!(payload[27], b' ');
        assert_eq!(*bytes.last().unwrap(), 0xF7);
    }

    #[test]
    fn test_display_text_pads_short_input() {
        let bytes = display_text("Hello", 1);
        assert_eq!(bytes[6], 28);

        let payload = &bytes[7..bytes.len() - 1];
        assert_eq!(payload.len(), 28);
        assert_eq!(&payload[..5], b"Hello");
        assert!(payload[5..].iter().all(|b| *b == b' '));
    }

    #[test]
    fn test_display_text_exact_width_is_kept() {
        let text = "x".repeat(28);
        let bytes = display_text(&text, 2);
        assert_eq!(bytes[6], 56);
        assert_eq!(&bytes[7..35], text.as_bytes());
    }

    #[test]
    fn test_display_grid_clamps() {
        assert_eq!(display_text("", 3)[6], 84);
        assert_eq!(display_text("", 5)[6], 84);
        assert_eq!(display_text("", 255)[6], 84);
        assert_eq!(display_text("", 5).len(), 7 + 28 + 1);
    }
}
