//! Mapping entries and their on-disk definition format

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::MappingError;
use crate::event::{CanonicalEvent, EventKey, EventKind};
use crate::visual::geometry::Point;

/// Default travel of a vertical slide (fader) when no bounds are given
pub const DEFAULT_Y_RANGE: (f64, f64) = (0.0, 140.0);
/// Default travel of a horizontal slide (crossfader) when no bounds are given
pub const DEFAULT_X_RANGE: (f64, f64) = (-200.0, 200.0);
/// Default knob sweep in degrees
pub const DEFAULT_ANGLE_RANGE: (f64, f64) = (-135.0, 135.0);
/// Default per-step clamp for accumulate-mode rotation
pub const DEFAULT_MAX_STEP: i16 = 8;

/// How a mapped element reacts to continuous (CC) input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationCategory {
    /// Light up only
    Lit,
    /// Move along one axis (fader, crossfader)
    Slide,
    /// Rotate around a center (knob)
    Rotate,
}

impl AnimationCategory {
    /// Parse a category name, case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lit" => Some(AnimationCategory::Lit),
            "slide" => Some(AnimationCategory::Slide),
            "rotate" => Some(AnimationCategory::Rotate),
            _ => None,
        }
    }
}

/// Axis a slide moves along
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    #[default]
    Y,
}

/// Rotation mode of a knob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationMode {
    /// Value maps directly onto the angle range
    #[default]
    Absolute,
    /// Successive values are treated as relative steps (endless encoders, jog wheels)
    Accumulate,
}

/// Linear axis animation bounds
#[derive(Debug, Clone, PartialEq)]
pub struct SlideConfig {
    pub axis: Axis,
    pub min: f64,
    pub max: f64,
}

impl SlideConfig {
    /// Slide with the default bounds for the axis
    pub fn for_axis(axis: Axis) -> Self {
        let (min, max) = match axis {
            Axis::X => DEFAULT_X_RANGE,
            Axis::Y => DEFAULT_Y_RANGE,
        };
        Self { axis, min, max }
    }
}

impl Default for SlideConfig {
    fn default() -> Self {
        Self::for_axis(Axis::Y)
    }
}

/// Rotation animation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RotationConfig {
    pub angle_min: f64,
    pub angle_max: f64,
    pub angle_offset: f64,
    pub mode: RotationMode,
    /// Largest raw step applied per event in accumulate mode
    pub max_step: i16,
    /// Explicit rotation center
    pub center: Option<Point>,
    /// Child element whose bounding box center is used as rotation center
    pub pointer: Option<String>,
}

impl RotationConfig {
    /// Degrees per raw value step
    pub fn degrees_per_step(&self) -> f64 {
        (self.angle_max - self.angle_min) / 127.0
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            angle_min: DEFAULT_ANGLE_RANGE.0,
            angle_max: DEFAULT_ANGLE_RANGE.1,
            angle_offset: 0.0,
            mode: RotationMode::Absolute,
            max_step: DEFAULT_MAX_STEP,
            center: None,
            pointer: None,
        }
    }
}

/// Animation behavior of a mapping entry.
///
/// `category` is set when the mapping is authored. `None` behaves like
/// [`AnimationCategory::Lit`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Animation {
    pub category: Option<AnimationCategory>,
    pub slide: SlideConfig,
    pub rotation: RotationConfig,
}

impl Animation {
    pub fn lit() -> Self {
        Self {
            category: Some(AnimationCategory::Lit),
            ..Default::default()
        }
    }

    pub fn slide(axis: Axis, min: f64, max: f64) -> Self {
        Self {
            category: Some(AnimationCategory::Slide),
            slide: SlideConfig { axis, min, max },
            ..Default::default()
        }
    }

    pub fn rotate(rotation: RotationConfig) -> Self {
        Self {
            category: Some(AnimationCategory::Rotate),
            rotation,
            ..Default::default()
        }
    }
}

/// A rule binding an event identity to a render target and an animation
#[derive(Debug, Clone, PartialEq)]
pub struct MappingEntry {
    /// Declared `kind:channel:code` key; entries without one match structurally
    pub key: Option<String>,
    pub kind: Option<EventKind>,
    pub channel: Option<u8>,
    pub code: Option<u8>,
    /// Diagram element id
    pub target: String,
    pub display_name: Option<String>,
    pub animation: Animation,
}

impl MappingEntry {
    /// Keyless entry for a target, with no event fields and a lit-only animation
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            key: None,
            kind: None,
            channel: None,
            code: None,
            target: target.into(),
            display_name: None,
            animation: Animation::default(),
        }
    }

    /// Entry keyed by an event key, with the structural fields filled from it
    pub fn keyed(key: EventKey, target: impl Into<String>) -> Self {
        Self {
            key: Some(key.to_string()),
            ..Self::structural(key, target)
        }
    }

    /// Keyless entry matched by kind, channel and code
    pub fn structural(key: EventKey, target: impl Into<String>) -> Self {
        Self {
            kind: Some(key.kind),
            channel: Some(key.channel),
            code: key.code,
            ..Self::new(target)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_animation(mut self, animation: Animation) -> Self {
        self.animation = animation;
        self
    }

    /// Identity used when merging tables: the declared key, or one synthesized
    /// from kind/channel/code when those are complete
    pub fn group_key(&self) -> Option<String> {
        if let Some(key) = &self.key {
            return Some(key.clone());
        }

        let kind = self.kind?;
        let channel = self.channel?;
        if kind.has_code() != self.code.is_some() {
            return None;
        }

        Some(
            EventKey {
                kind,
                channel,
                code: self.code,
            }
            .to_string(),
        )
    }

    /// Structural comparison against an event's decomposed fields
    pub fn matches_fields(&self, event: &CanonicalEvent) -> bool {
        self.kind == Some(event.kind)
            && self.channel == Some(event.channel)
            && self.code == event.code
    }

    /// Build an entry from its on-disk definition
    pub fn from_definition(def: MappingDefinition, index: usize) -> Result<Self, MappingError> {
        let target = def.target.trim().to_string();
        if target.is_empty() {
            return Err(MappingError::MissingTarget { index });
        }

        // A parseable key is normalized and fills missing structural fields
        let parsed_key = match def.key.as_deref() {
            Some(raw) => match raw.parse::<EventKey>() {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("Mapping for '{}': {} (kept as opaque key)", target, e);
                    None
                }
            },
            None => None,
        };

        let key = match (&parsed_key, def.key) {
            (Some(parsed), _) => Some(parsed.to_string()),
            (None, raw) => raw,
        };

        let kind = match def.kind.as_deref() {
            Some(k) => Some(EventKind::parse(k).ok_or_else(|| MappingError::InvalidKey(k.to_string()))?),
            None => parsed_key.map(|k| k.kind),
        };
        let channel = def.ch.or(parsed_key.map(|k| k.channel));
        let code = def.code.or(parsed_key.and_then(|k| k.code));

        let category = match def.category.as_deref() {
            Some(name) => {
                let category = AnimationCategory::parse(name);
                if category.is_none() {
                    debug!("Mapping for '{}': unknown category '{}', lighting only", target, name);
                }
                category
            }
            None => None,
        };

        let axis = def.axis.unwrap_or_default();
        let defaults = SlideConfig::for_axis(axis);
        let slide = SlideConfig {
            axis,
            min: def.min.unwrap_or(defaults.min),
            max: def.max.unwrap_or(defaults.max),
        };

        let rotation_defaults = RotationConfig::default();
        let rotation = RotationConfig {
            angle_min: def.angle_min.unwrap_or(rotation_defaults.angle_min),
            angle_max: def.angle_max.unwrap_or(rotation_defaults.angle_max),
            angle_offset: def.angle_offset.unwrap_or(rotation_defaults.angle_offset),
            mode: def.rotate.unwrap_or_default(),
            max_step: def.max_step.unwrap_or(rotation_defaults.max_step).max(1),
            center: match (def.cx, def.cy) {
                (Some(x), Some(y)) => Some(Point::new(x, y)),
                _ => None,
            },
            pointer: def.pointer.filter(|p| !p.trim().is_empty()),
        };

        Ok(Self {
            key,
            kind,
            channel,
            code,
            target,
            display_name: def.name.filter(|n| !n.trim().is_empty()),
            animation: Animation {
                category,
                slide,
                rotation,
            },
        })
    }

    /// On-disk definition of this entry
    pub fn to_definition(&self) -> MappingDefinition {
        let animation = &self.animation;
        let rotation = &animation.rotation;
        let is_slide = animation.category == Some(AnimationCategory::Slide);
        let is_rotate = animation.category == Some(AnimationCategory::Rotate);

        MappingDefinition {
            key: self.key.clone(),
            kind: self.kind.map(|k| k.as_str().to_string()),
            ch: self.channel,
            code: self.code,
            target: self.target.clone(),
            name: self.display_name.clone(),
            category: animation.category.map(|c| match c {
                AnimationCategory::Lit => "lit".to_string(),
                AnimationCategory::Slide => "slide".to_string(),
                AnimationCategory::Rotate => "rotate".to_string(),
            }),
            axis: is_slide.then_some(animation.slide.axis),
            min: is_slide.then_some(animation.slide.min),
            max: is_slide.then_some(animation.slide.max),
            angle_min: is_rotate.then_some(rotation.angle_min),
            angle_max: is_rotate.then_some(rotation.angle_max),
            angle_offset: is_rotate.then_some(rotation.angle_offset),
            rotate: is_rotate.then_some(rotation.mode),
            max_step: is_rotate.then_some(rotation.max_step),
            cx: rotation.center.map(|c| c.x),
            cy: rotation.center.map(|c| c.y),
            pointer: rotation.pointer.clone(),
        }
    }
}

/// Mapping definition as stored in mapping files:
/// `{ key?, type?, ch?, code?, target, name?, <animation attributes> }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ch: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u8>,
    #[serde(default)]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis: Option<Axis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate: Option<RotationMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_step: Option<i16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(json: &str) -> MappingDefinition {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_key_fills_structural_fields() {
        let entry =
            MappingEntry::from_definition(def(r#"{"key":"cc:1:7","target":"fader1"}"#), 0).unwrap();
        assert_eq!(entry.key.as_deref(), Some("cc:1:7"));
        assert_eq!(entry.kind, Some(EventKind::ControlChange));
        assert_eq!(entry.channel, Some(1));
        assert_eq!(entry.code, Some(7));
        assert_eq!(entry.animation.category, None);
    }

    #[test]
    fn test_key_is_normalized() {
        let entry =
            MappingEntry::from_definition(def(r#"{"key":"CC:01:007","target":"fader1"}"#), 0).unwrap();
        assert_eq!(entry.key.as_deref(), Some("cc:1:7"));
    }

    #[test]
    fn test_missing_target_is_rejected() {
        let err = MappingEntry::from_definition(def(r#"{"key":"cc:1:7","target":"  "}"#), 3).unwrap_err();
        assert!(matches!(err, MappingError::MissingTarget { index: 3 }));
    }

    #[test]
    fn test_slide_defaults_per_axis() {
        let entry = MappingEntry::from_definition(
            def(r#"{"type":"cc","ch":1,"code":31,"target":"xfader","category":"slide","axis":"x"}"#),
            0,
        )
        .unwrap();
        assert_eq!(entry.animation.category, Some(AnimationCategory::Slide));
        assert_eq!(entry.animation.slide, SlideConfig { axis: Axis::X, min: -200.0, max: 200.0 });
        assert_eq!(entry.group_key().as_deref(), Some("cc:1:31"));
        assert_eq!(entry.key, None);
    }

    #[test]
    fn test_rotation_attributes() {
        let entry = MappingEntry::from_definition(
            def(r#"{"key":"cc:1:22","target":"knob_trim1","category":"rotate","angleMin":-150,
                   "angleMax":150,"angleOffset":90,"rotate":"accumulate","cx":10,"cy":20,"pointer":"knob_trim1_ptr"}"#),
            0,
        )
        .unwrap();
        let rotation = &entry.animation.rotation;
        assert_eq!(rotation.mode, RotationMode::Accumulate);
        assert_eq!(rotation.angle_offset, 90.0);
        assert_eq!(rotation.center, Some(Point::new(10.0, 20.0)));
        assert_eq!(rotation.pointer.as_deref(), Some("knob_trim1_ptr"));
        assert!((rotation.degrees_per_step() - 300.0 / 127.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_category_lights_only() {
        let entry = MappingEntry::from_definition(
            def(r#"{"key":"cc:1:3","target":"thing","category":"wobble"}"#),
            0,
        )
        .unwrap();
        assert_eq!(entry.animation.category, None);
    }

    #[test]
    fn test_incomplete_fields_have_no_group_key() {
        let entry = MappingEntry::from_definition(def(r#"{"type":"cc","target":"orphan"}"#), 0).unwrap();
        assert_eq!(entry.group_key(), None);
    }

    #[test]
    fn test_definition_round_trip_keeps_semantics() {
        let entry = MappingEntry::keyed("cc:2:9".parse().unwrap(), "knob2")
            .with_name("Filter")
            .with_animation(Animation::rotate(RotationConfig {
                mode: RotationMode::Accumulate,
                ..Default::default()
            }));
        let back = MappingEntry::from_definition(entry.to_definition(), 0).unwrap();
        assert_eq!(back, entry);
    }
}
