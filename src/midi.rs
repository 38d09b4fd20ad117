//! MIDI decoding for the canonical event pipeline
//!
//! Turns raw status/data byte messages into [`CanonicalEvent`]s. Only the four
//! channel message types the visualizer understands are decoded; everything
//! else is filtered out.

use crate::event::{CanonicalEvent, EventKind, PITCH_BEND_CENTER};

/// Status nibble of Note Off messages
pub const STATUS_NOTE_OFF: u8 = 0x8;
/// Status nibble of Note On messages
pub const STATUS_NOTE_ON: u8 = 0x9;
/// Status nibble of Control Change messages
pub const STATUS_CONTROL_CHANGE: u8 = 0xB;
/// Status nibble of Pitch Bend messages
pub const STATUS_PITCH_BEND: u8 = 0xE;

/// Decode a raw MIDI message into a canonical event.
///
/// Returns `None` for running status (data byte first), system messages,
/// unsupported channel messages and messages shorter than three bytes.
/// A Note On with velocity 0 is reported as Note Off.
pub fn decode(data: &[u8]) -> Option<CanonicalEvent> {
    let (&status, rest) = data.split_first()?;

    // Running status would need per-port state; such messages are skipped
    if status < 0x80 || status >= 0xF0 {
        return None;
    }

    let type_nibble = status >> 4;
    let channel = (status & 0x0F) + 1;

    if rest.len() < 2 {
        return None;
    }
    let d1 = rest[0] & 0x7F;
    let d2 = rest[1] & 0x7F;

    match type_nibble {
        STATUS_NOTE_OFF => Some(CanonicalEvent::note_off(channel, d1, d2)),
        // note_on() folds velocity 0 into Note Off
        STATUS_NOTE_ON => Some(CanonicalEvent::note_on(channel, d1, d2)),
        STATUS_CONTROL_CHANGE => Some(CanonicalEvent::control_change(channel, d1, d2)),
        STATUS_PITCH_BEND => {
            let value = convert::from_lsb_msb(d1, d2) as i16 - PITCH_BEND_CENTER;
            Some(CanonicalEvent::pitch_bend(channel, value))
        }
        _ => None,
    }
}

/// Status nibble a canonical event would be sent with
pub fn status_nibble(kind: EventKind) -> u8 {
    match kind {
        EventKind::NoteOff => STATUS_NOTE_OFF,
        EventKind::NoteOn => STATUS_NOTE_ON,
        EventKind::ControlChange => STATUS_CONTROL_CHANGE,
        EventKind::PitchBend => STATUS_PITCH_BEND,
    }
}

/// MIDI value conversion utilities
pub mod convert {
    /// Combine 7-bit LSB and MSB data bytes into a 14-bit value (0-16383)
    pub fn from_lsb_msb(lsb: u8, msb: u8) -> u16 {
        (((msb & 0x7F) as u16) << 7) | (lsb & 0x7F) as u16
    }

    /// Convert 7-bit value (0-127) to a 0.0-1.0 fraction
    pub fn to_unit_7bit(value: i16) -> f64 {
        value.clamp(0, 127) as f64 / 127.0
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a hex string like "90 3C 64" or "903C64" into bytes
pub fn parse_hex(input: &str) -> Option<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    let digits = digits.trim_start_matches("0x");

    if digits.is_empty() || digits.len() % 2 != 0 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).ok().and_then(|s| u8::from_str_radix(s, 16).ok()))
        .collect()
}
