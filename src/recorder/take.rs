//! Take export format
//!
//! `{ "version": 1, "speed": 1.0, "events": [ { "t": 12.5, "info": <wire event> } ] }`

use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::error::TakeError;
use crate::event::CanonicalEvent;

/// Export format version written by this build
pub const TAKE_VERSION: u64 = 1;

/// One captured event and its offset from the start of the recording
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedEvent {
    pub offset_ms: f64,
    pub event: CanonicalEvent,
}

#[derive(Serialize)]
struct TakeEventRef<'a> {
    t: f64,
    info: &'a CanonicalEvent,
}

/// A recorded session, replayable at an adjustable speed
#[derive(Debug, Clone, PartialEq)]
pub struct Take {
    pub speed_factor: f64,
    pub events: Vec<RecordedEvent>,
}

impl Default for Take {
    fn default() -> Self {
        Self {
            speed_factor: 1.0,
            events: Vec::new(),
        }
    }
}

impl Take {
    pub fn new(events: Vec<RecordedEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Offset of the last event
    pub fn duration_ms(&self) -> f64 {
        self.events.last().map(|e| e.offset_ms).unwrap_or(0.0)
    }

    pub fn to_value(&self) -> Value {
        let events: Vec<TakeEventRef<'_>> = self
            .events
            .iter()
            .map(|e| TakeEventRef {
                t: e.offset_ms,
                info: &e.event,
            })
            .collect();

        json!({
            "version": TAKE_VERSION,
            "speed": self.speed_factor,
            "events": events,
        })
    }

    /// Pretty-printed export
    pub fn to_json(&self) -> Result<String, TakeError> {
        Ok(serde_json::to_string_pretty(&self.to_value())?)
    }

    pub fn from_json(json: &str) -> Result<Self, TakeError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Validate and convert an exported take.
    ///
    /// Nothing is returned unless every event is valid. A missing `t` counts
    /// as 0 and a missing or non-positive `speed` as 1. Events are stably
    /// sorted by offset.
    pub fn from_value(value: Value) -> Result<Self, TakeError> {
        let Value::Object(mut obj) = value else {
            return Err(TakeError::MissingEvents);
        };

        if let Some(version) = obj.get("version") {
            match version.as_u64() {
                Some(TAKE_VERSION) => {}
                Some(other) => return Err(TakeError::UnsupportedVersion(other)),
                None => return Err(TakeError::UnsupportedVersion(0)),
            }
        }

        let speed_factor = obj
            .get("speed")
            .and_then(Value::as_f64)
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(1.0);

        let Some(Value::Array(raw_events)) = obj.remove("events") else {
            return Err(TakeError::MissingEvents);
        };

        let mut events = raw_events
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                let Value::Object(mut entry) = raw else {
                    return Err(TakeError::InvalidEvent { index });
                };
                let offset_ms = entry
                    .get("t")
                    .and_then(Value::as_f64)
                    .filter(|t| t.is_finite())
                    .unwrap_or(0.0);
                let info = entry.remove("info").ok_or(TakeError::InvalidEvent { index })?;
                let event: CanonicalEvent =
                    serde_json::from_value(info).map_err(|_| TakeError::InvalidEvent { index })?;
                Ok(RecordedEvent { offset_ms, event })
            })
            .collect::<Result<Vec<_>, _>>()?;
        sort_by_offset(&mut events);

        Ok(Self { speed_factor, events })
    }

    /// Write the take to a JSON file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), TakeError> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).await?;
        debug!("Take saved: {} events to {}", self.len(), path.display());
        Ok(())
    }

    /// Read a take from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TakeError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).await?;
        let take = Self::from_json(&json)?;
        debug!("Take loaded: {} events from {}", take.len(), path.display());
        Ok(take)
    }
}

/// Stable sort by offset
pub(crate) fn sort_by_offset(events: &mut [RecordedEvent]) {
    events.sort_by(|a, b| a.offset_ms.total_cmp(&b.offset_ms));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Take {
        Take {
            speed_factor: 1.5,
            events: vec![
                RecordedEvent {
                    offset_ms: 0.0,
                    event: CanonicalEvent::note_on(1, 11, 127),
                },
                RecordedEvent {
                    offset_ms: 16.700000000000003,
                    event: CanonicalEvent::control_change(1, 7, 64),
                },
                RecordedEvent {
                    offset_ms: 120.125,
                    event: CanonicalEvent::pitch_bend(2, -8192),
                },
                RecordedEvent {
                    offset_ms: 333.3333333333333,
                    event: CanonicalEvent::note_off(1, 11, 0),
                },
            ],
        }
    }

    #[test]
    fn test_export_then_load_is_identical() {
        let take = sample();
        let json = take.to_json().unwrap();
        assert_eq!(Take::from_json(&json).unwrap(), take);
    }

    #[test]
    fn test_export_shape() {
        let value = sample().to_value();
        assert_eq!(value["version"], 1);
        assert_eq!(value["speed"], 1.5);
        assert_eq!(value["events"][1]["t"], 16.700000000000003);
        assert_eq!(value["events"][1]["info"]["type"], "cc");
        // Pitch bend is stored as the raw 14-bit value
        assert_eq!(value["events"][2]["info"]["value"], 0);
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let take = Take::from_json(r#"{"events":[{"info":{"type":"noteon","ch":1,"d1":60,"d2":100}}]}"#)
            .unwrap();
        assert_eq!(take.speed_factor, 1.0);
        assert_eq!(take.events[0].offset_ms, 0.0);
        assert_eq!(take.events[0].event, CanonicalEvent::note_on(1, 60, 100));

        let take = Take::from_json(r#"{"speed":-2,"events":[]}"#).unwrap();
        assert_eq!(take.speed_factor, 1.0);
        assert!(take.is_empty());
    }

    #[test]
    fn test_events_are_ordered_by_offset() {
        let take = Take::from_json(
            r#"{"events":[
                {"t":100,"info":{"type":"cc","ch":1,"controller":7,"value":1}},
                {"t":10,"info":{"type":"cc","ch":1,"controller":7,"value":2}},
                {"t":100,"info":{"type":"cc","ch":1,"controller":7,"value":3}}
            ]}"#,
        )
        .unwrap();

        let order: Vec<(f64, i16)> = take.events.iter().map(|e| (e.offset_ms, e.event.value)).collect();
        assert_eq!(order, vec![(10.0, 2), (100.0, 1), (100.0, 3)]);
        assert_eq!(take.duration_ms(), 100.0);
    }

    #[test]
    fn test_load_failures() {
        assert!(matches!(Take::from_json("nope"), Err(TakeError::Json(_))));
        assert!(matches!(Take::from_json("[]"), Err(TakeError::MissingEvents)));
        assert!(matches!(Take::from_json(r#"{"speed":1}"#), Err(TakeError::MissingEvents)));
        assert!(matches!(
            Take::from_json(r#"{"events":{"t":1}}"#),
            Err(TakeError::MissingEvents)
        ));
        assert!(matches!(
            Take::from_json(r#"{"version":2,"events":[]}"#),
            Err(TakeError::UnsupportedVersion(2))
        ));
        assert!(matches!(
            Take::from_json(
                r#"{"events":[{"t":0,"info":{"type":"cc","ch":1,"controller":7,"value":1}},{"t":5,"info":{"type":"sysex","ch":1}}]}"#
            ),
            Err(TakeError::InvalidEvent { index: 1 })
        ));
        assert!(matches!(
            Take::from_json(r#"{"events":[{"t":0}]}"#),
            Err(TakeError::InvalidEvent { index: 0 })
        ));
    }

    #[tokio::test]
    async fn test_save_and_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("take.json");

        let take = sample();
        take.save(&path).await.unwrap();
        assert_eq!(Take::load(&path).await.unwrap(), take);

        assert!(matches!(
            Take::load(dir.path().join("missing.json")).await,
            Err(TakeError::Io(_))
        ));
    }
}
