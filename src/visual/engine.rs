//! Visual state engine
//!
//! Owns the per-target visual state and applies the animation rules for each
//! resolved event. The engine never sleeps: pulse reversion is requested from
//! the caller through a [`PulseDirective`] and reported back with
//! [`VisualEngine::expire_pulse`].

use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace};

use crate::event::{CanonicalEvent, EventKind};
use crate::mapping::{AnimationCategory, MappingEntry, RotationMode};

use super::rotation::{absolute_angle, accumulate_delta, normalize_angle, resolve_center};
use super::surface::RenderSurface;

/// How long a note on keeps its target lit
pub const DEFAULT_PULSE: Duration = Duration::from_millis(120);

/// Visual state of one diagram element, created on the first event addressed to it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisualElementState {
    pub lit: bool,
    /// Slide position along the entry's axis
    pub position: Option<f64>,
    /// Last applied rotation, in `[0, 360)`
    pub rotation_angle: f64,
    /// Unbounded sum of accumulate-mode steps, in degrees
    pub accumulated_angle: f64,
    /// Last raw CC value seen (accumulate mode)
    pub last_raw: Option<i16>,
    /// Epoch of the pulse timer currently allowed to unlight the element
    pub pending_pulse: Option<u64>,
}

/// Timer request produced by [`VisualEngine::apply`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PulseDirective {
    /// Start a timer; when it fires call `expire_pulse(target, epoch)`.
    /// Any earlier timer of the target is superseded.
    Schedule {
        target: String,
        epoch: u64,
        after: Duration,
    },
    /// Drop the pending timer of the target
    Cancel { target: String },
}

pub struct VisualEngine {
    surface: Box<dyn RenderSurface>,
    states: HashMap<String, VisualElementState>,
    pulse: Duration,
    next_epoch: u64,
}

impl VisualEngine {
    pub fn new(surface: Box<dyn RenderSurface>) -> Self {
        Self {
            surface,
            states: HashMap::new(),
            pulse: DEFAULT_PULSE,
            next_epoch: 0,
        }
    }

    pub fn with_pulse(mut self, pulse: Duration) -> Self {
        self.pulse = pulse;
        self
    }

    pub fn pulse_duration(&self) -> Duration {
        self.pulse
    }

    /// Apply one resolved event to its target
    pub fn apply(&mut self, event: &CanonicalEvent, entry: &MappingEntry) -> Option<PulseDirective> {
        let target = entry.target.as_str();

        if event.kind == EventKind::PitchBend {
            trace!("Pitch bend on {} has no visual effect", target);
            return None;
        }

        if !self.surface.contains(target) {
            debug!("Render target '{}' not in diagram, ignoring {}", target, event);
            return None;
        }

        match event.kind {
            EventKind::NoteOn => Some(self.light_with_pulse(target)),
            EventKind::NoteOff => self.unlight(target),
            EventKind::ControlChange => {
                self.animate_continuous(target, entry, event.value);
                None
            }
            EventKind::PitchBend => None,
        }
    }

    fn light_with_pulse(&mut self, target: &str) -> PulseDirective {
        self.next_epoch += 1;
        let epoch = self.next_epoch;

        let state = self.states.entry(target.to_string()).or_default();
        state.lit = true;
        state.pending_pulse = Some(epoch);
        self.surface.set_lit(target, true);

        PulseDirective::Schedule {
            target: target.to_string(),
            epoch,
            after: self.pulse,
        }
    }

    fn unlight(&mut self, target: &str) -> Option<PulseDirective> {
        let state = self.states.entry(target.to_string()).or_default();
        state.lit = false;
        let had_pulse = state.pending_pulse.take().is_some();
        self.surface.set_lit(target, false);

        had_pulse.then(|| PulseDirective::Cancel {
            target: target.to_string(),
        })
    }

    fn animate_continuous(&mut self, target: &str, entry: &MappingEntry, value: i16) {
        let animation = &entry.animation;
        let state = self.states.entry(target.to_string()).or_default();
        state.lit = true;
        self.surface.set_lit(target, true);

        match animation.category {
            Some(AnimationCategory::Slide) => {
                let slide = &animation.slide;
                let position = lerp(slide.min, slide.max, crate::midi::convert::to_unit_7bit(value));
                state.position = Some(position);
                self.surface.set_position(target, slide.axis, position);
            }
            Some(AnimationCategory::Rotate) => {
                let rotation = &animation.rotation;
                let angle = match rotation.mode {
                    RotationMode::Absolute => absolute_angle(rotation, value),
                    RotationMode::Accumulate => {
                        state.accumulated_angle += accumulate_delta(rotation, state.last_raw, value);
                        normalize_angle(state.accumulated_angle + rotation.angle_offset)
                    }
                };
                state.last_raw = Some(value);
                state.rotation_angle = angle;

                let target_geometry = self.surface.geometry(target);
                let pointer_geometry = rotation.pointer.as_deref().and_then(|p| self.surface.geometry(p));
                let center = resolve_center(rotation, target_geometry.as_ref(), pointer_geometry.as_ref());
                self.surface.set_rotation(target, angle, center);
            }
            Some(AnimationCategory::Lit) | None => {}
        }
    }

    /// Pulse timer fired. Unlights the target only when `epoch` is still the
    /// pending pulse; returns whether it did.
    pub fn expire_pulse(&mut self, target: &str, epoch: u64) -> bool {
        let Some(state) = self.states.get_mut(target) else {
            return false;
        };
        if state.pending_pulse != Some(epoch) {
            trace!("Stale pulse {} for {}", epoch, target);
            return false;
        }

        state.pending_pulse = None;
        state.lit = false;
        self.surface.set_lit(target, false);
        true
    }

    pub fn state(&self, target: &str) -> Option<&VisualElementState> {
        self.states.get(target)
    }

    /// Targets that have received at least one event, sorted
    pub fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.states.keys().cloned().collect();
        targets.sort();
        targets
    }

    pub fn surface(&self) -> &dyn RenderSurface {
        self.surface.as_ref()
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{Animation, Axis, RotationConfig};
    use crate::visual::geometry::{ElementGeometry, Point};
    use crate::visual::surface::DiagramSurface;

    const EPS: f64 = 1e-9;

    fn engine() -> VisualEngine {
        let surface = DiagramSurface::default()
            .with_element("fader1", ElementGeometry::rect(10.0, 0.0, 8.0, 20.0))
            .with_element("xfader", ElementGeometry::rect(0.0, 200.0, 30.0, 10.0))
            .with_element("play_a", ElementGeometry::rect(0.0, 0.0, 10.0, 10.0))
            .with_element("knob1", ElementGeometry::circle(100.0, 50.0, 12.0))
            .with_element("jog", ElementGeometry::circle(0.0, 0.0, 40.0));
        VisualEngine::new(Box::new(surface))
    }

    fn entry(key: &str, target: &str) -> MappingEntry {
        MappingEntry::keyed(key.parse().unwrap(), target)
    }

    #[test]
    fn test_fader_lerp() {
        let mut engine = engine();
        let fader = entry("cc:1:7", "fader1").with_animation(Animation::slide(Axis::Y, 0.0, 140.0));

        assert_eq!(engine.apply(&CanonicalEvent::control_change(1, 7, 64), &fader), None);

        let state = engine.state("fader1").unwrap();
        assert!(state.lit);
        let expected = 140.0 * 64.0 / 127.0;
        assert!((state.position.unwrap() - expected).abs() < EPS);

        let attrs = engine.surface().applied("fader1").unwrap();
        assert!((attrs.y.unwrap() - expected).abs() < EPS);
        assert!(attrs.lit);
    }

    #[test]
    fn test_crossfader_moves_on_x() {
        let mut engine = engine();
        let xfader = entry("cc:1:31", "xfader").with_animation(Animation::slide(Axis::X, -200.0, 200.0));

        engine.apply(&CanonicalEvent::control_change(1, 31, 127), &xfader);
        let attrs = engine.surface().applied("xfader").unwrap();
        assert_eq!(attrs.x, Some(200.0));
        assert_eq!(attrs.y, None);
    }

    #[test]
    fn test_absolute_rotation_endpoints() {
        let mut engine = engine();
        let knob = entry("cc:1:22", "knob1").with_animation(Animation::rotate(RotationConfig {
            angle_offset: 10.0,
            ..Default::default()
        }));

        engine.apply(&CanonicalEvent::control_change(1, 22, 0), &knob);
        let angle = engine.state("knob1").unwrap().rotation_angle;
        assert!((angle - normalize_angle(-135.0 + 10.0)).abs() < EPS);

        engine.apply(&CanonicalEvent::control_change(1, 22, 127), &knob);
        let angle = engine.state("knob1").unwrap().rotation_angle;
        assert!((angle - normalize_angle(135.0 + 10.0)).abs() < EPS);

        // Native circle center of the target
        let rotation = engine.surface().applied("knob1").unwrap().rotation.unwrap();
        assert_eq!(rotation.center, Point::new(100.0, 50.0));
    }

    #[test]
    fn test_accumulate_steps() {
        let mut engine = engine();
        let jog = entry("cc:1:33", "jog").with_animation(Animation::rotate(RotationConfig {
            mode: RotationMode::Accumulate,
            ..Default::default()
        }));
        let per_step = 270.0 / 127.0;

        engine.apply(&CanonicalEvent::control_change(1, 33, 10), &jog);
        let primed = engine.state("jog").unwrap().accumulated_angle;
        assert_eq!(primed, 0.0);

        engine.apply(&CanonicalEvent::control_change(1, 33, 15), &jog);
        let up = engine.state("jog").unwrap().accumulated_angle;
        assert!((up - 5.0 * per_step).abs() < EPS);

        engine.apply(&CanonicalEvent::control_change(1, 33, 12), &jog);
        let down = engine.state("jog").unwrap().accumulated_angle;
        assert!((down - 2.0 * per_step).abs() < EPS);

        // Wrap-around is a bounded step
        engine.apply(&CanonicalEvent::control_change(1, 33, 127), &jog);
        let wrapped = engine.state("jog").unwrap().accumulated_angle;
        assert!((wrapped - down - 8.0 * per_step).abs() < EPS);
    }

    #[test]
    fn test_note_on_pulses_and_note_off_cancels() {
        let mut engine = engine();
        let pad = entry("noteon:1:11", "play_a");

        let first = engine.apply(&CanonicalEvent::note_on(1, 11, 127), &pad).unwrap();
        let PulseDirective::Schedule { epoch: first_epoch, after, .. } = first else {
            panic!("expected a scheduled pulse");
        };
        assert_eq!(after, DEFAULT_PULSE);
        assert!(engine.state("play_a").unwrap().lit);

        // A second note on preempts the first pulse
        let second = engine.apply(&CanonicalEvent::note_on(1, 11, 127), &pad).unwrap();
        let PulseDirective::Schedule { epoch: second_epoch, .. } = second else {
            panic!("expected a scheduled pulse");
        };
        assert!(!engine.expire_pulse("play_a", first_epoch));
        assert!(engine.state("play_a").unwrap().lit);
        assert!(engine.expire_pulse("play_a", second_epoch));
        assert!(!engine.state("play_a").unwrap().lit);

        // Note off unlights immediately and cancels the pending pulse
        engine.apply(&CanonicalEvent::note_on(1, 11, 127), &pad);
        let cancel = engine.apply(&CanonicalEvent::note_off(1, 11, 0), &pad);
        assert_eq!(cancel, Some(PulseDirective::Cancel { target: "play_a".into() }));
        assert!(!engine.state("play_a").unwrap().lit);
        assert_eq!(engine.state("play_a").unwrap().pending_pulse, None);

        // Nothing pending: no directive
        assert_eq!(engine.apply(&CanonicalEvent::note_off(1, 11, 0), &pad), None);
    }

    #[test]
    fn test_cc_without_category_only_lights() {
        let mut engine = engine();
        let plain = entry("cc:1:7", "fader1");
        engine.apply(&CanonicalEvent::control_change(1, 7, 100), &plain);

        let state = engine.state("fader1").unwrap();
        assert!(state.lit);
        assert_eq!(state.position, None);
        assert_eq!(engine.surface().applied("fader1").unwrap().y, None);
    }

    #[test]
    fn test_missing_target_changes_nothing() {
        let mut engine = engine();
        let ghost = entry("noteon:1:1", "not_in_diagram");
        assert_eq!(engine.apply(&CanonicalEvent::note_on(1, 1, 100), &ghost), None);
        assert!(engine.state("not_in_diagram").is_none());
        assert!(engine.targets().is_empty());
    }

    #[test]
    fn test_pitch_bend_has_no_effect() {
        let mut engine = engine();
        let jog = entry("pitch:1", "jog");
        assert_eq!(engine.apply(&CanonicalEvent::pitch_bend(1, 500), &jog), None);
        assert!(engine.state("jog").is_none());
    }

    #[test]
    fn test_engines_do_not_share_state() {
        let mut a = engine();
        let b = engine();
        let jog = entry("cc:1:33", "jog").with_animation(Animation::rotate(RotationConfig {
            mode: RotationMode::Accumulate,
            ..Default::default()
        }));
        a.apply(&CanonicalEvent::control_change(1, 33, 10), &jog);
        a.apply(&CanonicalEvent::control_change(1, 33, 14), &jog);

        assert!(a.state("jog").unwrap().accumulated_angle > 0.0);
        assert!(b.state("jog").is_none());
        assert_eq!(a.targets(), vec!["jog".to_string()]);
    }
}
