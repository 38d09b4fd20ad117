//! Canonical controller events
//!
//! Every transport (MIDI port, forwarded stream payload, replayed take) is
//! translated into [`CanonicalEvent`] before it reaches the recorder, the
//! mapping resolver and the visual engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MappingError;

/// Center of the 14-bit pitch bend range
pub const PITCH_BEND_CENTER: i16 = 8192;

/// Largest raw 14-bit pitch bend value
pub const PITCH_BEND_MAX_RAW: i16 = 16383;

/// Kind of a canonical event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "noteon")]
    NoteOn,
    #[serde(rename = "noteoff")]
    NoteOff,
    #[serde(rename = "cc")]
    ControlChange,
    #[serde(rename = "pitch")]
    PitchBend,
}

impl EventKind {
    /// Parse a wire name (`noteon`, `noteoff`, `cc`, `pitch`), case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "noteon" => Some(EventKind::NoteOn),
            "noteoff" => Some(EventKind::NoteOff),
            "cc" => Some(EventKind::ControlChange),
            "pitch" => Some(EventKind::PitchBend),
            _ => None,
        }
    }

    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NoteOn => "noteon",
            EventKind::NoteOff => "noteoff",
            EventKind::ControlChange => "cc",
            EventKind::PitchBend => "pitch",
        }
    }

    /// Whether events of this kind carry a code (note or controller number)
    pub fn has_code(&self) -> bool {
        !matches!(self, EventKind::PitchBend)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single normalized event shape all transports are translated into.
///
/// `channel` is always 1-16. `value` is 0-127 for note and CC events and the
/// re-centered signed bend (-8192..=8191) for pitch bend. `code` is the note
/// or controller number and is `None` only for pitch bend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanonicalEvent {
    pub kind: EventKind,
    pub channel: u8,
    pub code: Option<u8>,
    pub value: i16,
}

impl CanonicalEvent {
    /// Build a validated event.
    ///
    /// Returns `None` when the channel is outside 1-16 or the code is missing
    /// or out of range for the kind. Values are clamped to the kind's range and
    /// a zero-velocity note on becomes a note off.
    pub fn new(kind: EventKind, channel: u8, code: Option<u8>, value: i16) -> Option<Self> {
        if !(1..=16).contains(&channel) {
            return None;
        }

        let code = if kind.has_code() {
            Some(code.filter(|c| *c <= 127)?)
        } else {
            None
        };

        let (kind, value) = normalize_value(kind, value);

        Some(Self {
            kind,
            channel,
            code,
            value,
        })
    }

    /// Note on (a zero velocity yields a note off). Channel is clamped to 1-16.
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self::channel_event(EventKind::NoteOn, channel, Some(note & 0x7F), velocity as i16)
    }

    /// Note off. Channel is clamped to 1-16.
    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        Self::channel_event(EventKind::NoteOff, channel, Some(note & 0x7F), velocity as i16)
    }

    /// Control change. Channel is clamped to 1-16.
    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self::channel_event(
            EventKind::ControlChange,
            channel,
            Some(controller & 0x7F),
            value as i16,
        )
    }

    /// Pitch bend with an already re-centered value. Channel is clamped to 1-16.
    pub fn pitch_bend(channel: u8, value: i16) -> Self {
        Self::channel_event(EventKind::PitchBend, channel, None, value)
    }

    fn channel_event(kind: EventKind, channel: u8, code: Option<u8>, value: i16) -> Self {
        let (kind, value) = normalize_value(kind, value);
        Self {
            kind,
            channel: channel.clamp(1, 16),
            code,
            value,
        }
    }

    /// Identity used for mapping lookup
    pub fn key(&self) -> EventKey {
        EventKey {
            kind: self.kind,
            channel: self.channel,
            code: self.code,
        }
    }

    /// Key used by the recorder to suppress duplicate deliveries: `kind|channel|code|value`
    pub fn dedup_key(&self) -> String {
        let code = self.code.map(|c| c.to_string()).unwrap_or_default();
        format!("{}|{}|{}|{}", self.kind, self.channel, code, self.value)
    }

    /// Coerce an already-normalized wire payload into a canonical event.
    ///
    /// Returns `None` for unknown types, channels outside 1-16 and note/CC
    /// payloads without a code. This mirrors a decode failure: the payload is
    /// simply filtered out.
    pub fn from_wire(wire: &WireEvent) -> Option<Self> {
        let kind = EventKind::parse(&wire.kind)?;
        let channel = u8::try_from(wire.ch).ok()?;

        match kind {
            EventKind::NoteOn | EventKind::NoteOff => {
                let note = data_byte(wire.d1?)?;
                let value = wire.value.or(wire.d2).or(wire.velocity).unwrap_or(0);
                let zero_off = kind == EventKind::NoteOn
                    && (value == 0 || wire.d2 == Some(0) || wire.velocity == Some(0));
                let value = if zero_off { 0 } else { clamp_7bit(value) };
                Self::new(kind, channel, Some(note), value)
            }
            EventKind::ControlChange => {
                let controller = data_byte(wire.controller.or(wire.d1)?)?;
                let value = clamp_7bit(wire.value.or(wire.d2).unwrap_or(0));
                Self::new(kind, channel, Some(controller), value)
            }
            EventKind::PitchBend => {
                let raw = match (wire.value, wire.d1, wire.d2) {
                    (Some(v), _, _) => v,
                    (None, Some(lsb), Some(msb)) => ((msb & 0x7F) << 7) | (lsb & 0x7F),
                    _ => PITCH_BEND_CENTER as i64,
                };
                let raw = raw.clamp(0, PITCH_BEND_MAX_RAW as i64) as i16;
                Self::new(kind, channel, None, raw - PITCH_BEND_CENTER)
            }
        }
    }

    /// Wire representation of this event (pitch bend is written as the raw 14-bit value)
    pub fn to_wire(&self) -> WireEvent {
        let code = self.code.map(i64::from);
        let value = self.value as i64;
        match self.kind {
            EventKind::NoteOn | EventKind::NoteOff => WireEvent {
                kind: self.kind.as_str().to_string(),
                ch: self.channel as i64,
                d1: code,
                d2: Some(value),
                controller: None,
                value: Some(value),
                velocity: None,
            },
            EventKind::ControlChange => WireEvent {
                kind: self.kind.as_str().to_string(),
                ch: self.channel as i64,
                d1: code,
                d2: Some(value),
                controller: code,
                value: Some(value),
                velocity: None,
            },
            EventKind::PitchBend => {
                let raw = value + PITCH_BEND_CENTER as i64;
                WireEvent {
                    kind: self.kind.as_str().to_string(),
                    ch: self.channel as i64,
                    d1: Some(raw & 0x7F),
                    d2: Some((raw >> 7) & 0x7F),
                    controller: None,
                    value: Some(raw),
                    velocity: None,
                }
            }
        }
    }
}

impl fmt::Display for CanonicalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ch:{} code:{} v:{}", self.kind, self.channel, code, self.value),
            None => write!(f, "{} ch:{} v:{}", self.kind, self.channel, self.value),
        }
    }
}

impl Serialize for CanonicalEvent {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CanonicalEvent {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireEvent::deserialize(deserializer)?;
        CanonicalEvent::from_wire(&wire).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "not a valid controller event: type={} ch={}",
                wire.kind, wire.ch
            ))
        })
    }
}

/// Clamp a value into its kind's range; a zero-velocity note on means note off
fn normalize_value(kind: EventKind, value: i16) -> (EventKind, i16) {
    match kind {
        EventKind::NoteOn if value <= 0 => (EventKind::NoteOff, 0),
        EventKind::PitchBend => (
            kind,
            value.clamp(-PITCH_BEND_CENTER, PITCH_BEND_MAX_RAW - PITCH_BEND_CENTER),
        ),
        _ => (kind, value.clamp(0, 127)),
    }
}

fn clamp_7bit(v: i64) -> i16 {
    v.clamp(0, 127) as i16
}

fn data_byte(v: i64) -> Option<u8> {
    u8::try_from(v).ok().filter(|b| *b <= 127)
}

/// Canonical event exchange shape shared with stream transports and take files:
/// `{ type, ch, d1, d2, controller?, value }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub ch: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d1: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d2: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<i64>,
}

/// Event identity used as mapping key: `kind:channel:code` (`pitch:channel` for pitch bend)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub kind: EventKind,
    pub channel: u8,
    pub code: Option<u8>,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{}:{}:{}", self.kind, self.channel, code),
            None => write!(f, "{}:{}", self.kind, self.channel),
        }
    }
}

impl FromStr for EventKey {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MappingError::InvalidKey(s.to_string());
        let mut parts = s.trim().split(':');

        let kind = parts.next().and_then(EventKind::parse).ok_or_else(invalid)?;
        let channel = parts
            .next()
            .and_then(|c| c.parse::<u8>().ok())
            .filter(|c| (1..=16).contains(c))
            .ok_or_else(invalid)?;
        let code = match parts.next() {
            Some(c) => Some(c.parse::<u8>().ok().filter(|c| *c <= 127).ok_or_else(invalid)?),
            None => None,
        };

        if parts.next().is_some() || kind.has_code() != code.is_some() {
            return Err(invalid());
        }

        Ok(Self {
            kind,
            channel,
            code,
        })
    }
}
