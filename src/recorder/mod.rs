//! Take recording and replay
//!
//! The [`Recorder`] sits on the pipeline ingress and captures timestamped
//! copies of every event while a recording is active. A captured or loaded
//! take is replayed by a [`Player`] task through the same ingress.

pub mod player;
pub mod take;

pub use player::{PlayOptions, Player, MIN_SPEED};
pub use take::{RecordedEvent, Take, TAKE_VERSION};

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::event::CanonicalEvent;

/// Default window in which an identical event counts as a duplicate delivery
pub const DEFAULT_DEDUP_MS: u64 = 6;

/// Event capture with duplicate suppression.
///
/// Time is passed in by the caller so that the pipeline's arrival timestamp
/// is the one recorded.
#[derive(Debug)]
pub struct Recorder {
    installed: bool,
    recording: bool,
    started_at: Option<Instant>,
    dedup_window: Duration,
    /// Dedup key -> time of the last captured event with that key
    recent: HashMap<String, Instant>,
    events: Vec<RecordedEvent>,
    speed_factor: f64,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            installed: false,
            recording: false,
            started_at: None,
            dedup_window: Duration::from_millis(DEFAULT_DEDUP_MS),
            recent: HashMap::new(),
            events: Vec::new(),
            speed_factor: 1.0,
        }
    }

    /// Attach to the ingress so later events can be captured. Idempotent.
    pub fn install(&mut self) {
        if !self.installed {
            self.installed = true;
            info!("Recorder installed");
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Begin a new capture at `now`, discarding the previous buffer
    pub fn start(&mut self, dedup_window_ms: u64, now: Instant) {
        self.install();
        self.events.clear();
        self.recent.clear();
        self.dedup_window = Duration::from_millis(dedup_window_ms);
        self.started_at = Some(now);
        self.recording = true;
        info!("Recording (dedup window {} ms)", dedup_window_ms);
    }

    /// Capture an event that arrived at `at`. Returns whether it was kept.
    pub fn record(&mut self, event: &CanonicalEvent, at: Instant) -> bool {
        if !self.installed || !self.recording {
            return false;
        }
        let Some(started_at) = self.started_at else {
            return false;
        };

        let key = event.dedup_key();
        if let Some(&last) = self.recent.get(&key) {
            if at.saturating_duration_since(last) < self.dedup_window {
                trace!("Duplicate {} dropped", key);
                return false;
            }
        }
        self.recent.insert(key, at);

        let offset_ms = at.saturating_duration_since(started_at).as_nanos() as f64 / 1_000_000.0;
        self.events.push(RecordedEvent {
            offset_ms,
            event: *event,
        });
        true
    }

    /// End the capture and return what was recorded
    pub fn stop(&mut self) -> Vec<RecordedEvent> {
        if self.recording {
            self.recording = false;
            info!("Recording stopped: {} events", self.events.len());
        }
        self.events.clone()
    }

    /// Empty the buffer without changing the recording state
    pub fn clear(&mut self) {
        self.events.clear();
        self.recent.clear();
        debug!("Recorder buffer cleared");
    }

    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    pub fn speed_factor(&self) -> f64 {
        self.speed_factor
    }

    /// Remember the speed of the last playback so it is exported with the take
    pub fn set_speed_factor(&mut self, speed: f64) {
        if speed.is_finite() && speed > 0.0 {
            self.speed_factor = speed;
        }
    }

    pub fn export_take(&self) -> Take {
        Take {
            speed_factor: self.speed_factor,
            events: self.events.clone(),
        }
    }

    /// Replace the buffer with a loaded take
    pub fn load_take(&mut self, take: Take) {
        info!("Take loaded: {} events", take.len());
        self.speed_factor = take.speed_factor;
        self.events = take.events;
        self.recent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_not_recording_captures_nothing() {
        let t0 = Instant::now();
        let mut recorder = Recorder::new();
        assert!(!recorder.record(&CanonicalEvent::note_on(1, 1, 1), t0));

        recorder.install();
        assert!(!recorder.record(&CanonicalEvent::note_on(1, 1, 1), t0));
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_start_installs() {
        let mut recorder = Recorder::new();
        recorder.start(DEFAULT_DEDUP_MS, Instant::now());
        assert!(recorder.is_installed());
        assert!(recorder.is_recording());
    }

    #[test]
    fn test_dedup_window() {
        let t0 = Instant::now();
        let mut recorder = Recorder::new();
        recorder.start(6, t0);

        let ev = CanonicalEvent::control_change(1, 7, 64);
        assert!(recorder.record(&ev, t0 + ms(10)));
        // Same action delivered by a second transport
        assert!(!recorder.record(&ev, t0 + ms(13)));
        // Different value is a different event
        assert!(recorder.record(&CanonicalEvent::control_change(1, 7, 65), t0 + ms(14)));
        // Window measured from the last captured copy
        assert!(recorder.record(&ev, t0 + ms(16)));

        let events = recorder.stop();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].offset_ms, 10.0);
        assert_eq!(events[2].offset_ms, 16.0);
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_start_resets_buffer_and_dedup() {
        let t0 = Instant::now();
        let mut recorder = Recorder::new();
        recorder.start(6, t0);
        let ev = CanonicalEvent::note_on(1, 11, 127);
        recorder.record(&ev, t0);

        recorder.start(6, t0 + ms(1));
        assert!(recorder.events().is_empty());
        assert!(recorder.record(&ev, t0 + ms(2)));
        assert_eq!(recorder.events()[0].offset_ms, 1.0);
    }

    #[test]
    fn test_clear_keeps_recording() {
        let t0 = Instant::now();
        let mut recorder = Recorder::new();
        recorder.start(6, t0);
        recorder.record(&CanonicalEvent::note_on(1, 11, 127), t0);
        recorder.clear();
        assert!(recorder.events().is_empty());
        assert!(recorder.is_recording());
    }

    #[test]
    fn test_export_and_load_take() {
        let t0 = Instant::now();
        let mut recorder = Recorder::new();
        recorder.start(6, t0);
        recorder.record(&CanonicalEvent::note_on(1, 11, 127), t0 + ms(3));
        recorder.record(&CanonicalEvent::note_off(1, 11, 0), t0 + ms(90));
        recorder.stop();

        let take = recorder.export_take();
        let reloaded = Take::from_json(&take.to_json().unwrap()).unwrap();
        assert_eq!(reloaded, take);

        let mut other = Recorder::new();
        other.load_take(reloaded);
        assert_eq!(other.events(), take.events.as_slice());
    }
}
