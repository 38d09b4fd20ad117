//! Render surface egress and the in-memory diagram

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, trace};

use crate::mapping::Axis;

use super::geometry::{ElementGeometry, Point};

/// Egress of the visual engine: imperative per-element changes on a diagram
pub trait RenderSurface: Send {
    /// Whether the diagram has an element with this id
    fn contains(&self, id: &str) -> bool;

    /// Geometry of an element, if the diagram knows it
    fn geometry(&self, id: &str) -> Option<ElementGeometry>;

    fn set_lit(&mut self, id: &str, lit: bool);

    fn set_position(&mut self, id: &str, axis: Axis, position: f64);

    fn set_rotation(&mut self, id: &str, angle: f64, center: Point);

    /// Last attributes applied to an element, for surfaces that keep them
    fn applied(&self, _id: &str) -> Option<AppliedAttributes> {
        None
    }
}

/// Rotation transform applied to an element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedRotation {
    pub angle: f64,
    pub center: Point,
}

/// Attributes a surface has applied to one element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedAttributes {
    pub lit: bool,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub rotation: Option<AppliedRotation>,
}

/// Diagram element file: `{ "elements": { id: { "bbox": [...], "circle": [...] } } }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagramFile {
    #[serde(default)]
    pub elements: HashMap<String, ElementGeometry>,
}

/// In-memory diagram that records what the engine applied to each element
#[derive(Debug, Default)]
pub struct DiagramSurface {
    elements: HashMap<String, ElementGeometry>,
    applied: HashMap<String, AppliedAttributes>,
    /// Accept every element id, with no geometry
    open: bool,
}

impl DiagramSurface {
    pub fn new(elements: HashMap<String, ElementGeometry>) -> Self {
        Self {
            elements,
            applied: HashMap::new(),
            open: false,
        }
    }

    /// Surface without a diagram that accepts any element id
    pub fn open() -> Self {
        Self {
            open: true,
            ..Default::default()
        }
    }

    pub fn with_element(mut self, id: impl Into<String>, geometry: ElementGeometry) -> Self {
        self.elements.insert(id.into(), geometry);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: DiagramFile = serde_json::from_str(json).context("Invalid diagram JSON")?;
        Ok(Self::new(file.elements))
    }

    /// Load a diagram element file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read diagram file: {}", path.display()))?;
        let surface =
            Self::from_json(&json).with_context(|| format!("Failed to parse diagram file: {}", path.display()))?;
        debug!("Diagram loaded: {} elements from {}", surface.len(), path.display());
        Ok(surface)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn attributes_mut(&mut self, id: &str) -> &mut AppliedAttributes {
        self.applied.entry(id.to_string()).or_default()
    }
}

impl RenderSurface for DiagramSurface {
    fn contains(&self, id: &str) -> bool {
        self.open || self.elements.contains_key(id)
    }

    fn geometry(&self, id: &str) -> Option<ElementGeometry> {
        self.elements.get(id).copied()
    }

    fn set_lit(&mut self, id: &str, lit: bool) {
        trace!("{} lit={}", id, lit);
        self.attributes_mut(id).lit = lit;
    }

    fn set_position(&mut self, id: &str, axis: Axis, position: f64) {
        trace!("{} {:?}={:.1}", id, axis, position);
        let attrs = self.attributes_mut(id);
        match axis {
            Axis::X => attrs.x = Some(position),
            Axis::Y => attrs.y = Some(position),
        }
    }

    fn set_rotation(&mut self, id: &str, angle: f64, center: Point) {
        trace!("{} rotate({:.2} {:.1} {:.1})", id, angle, center.x, center.y);
        self.attributes_mut(id).rotation = Some(AppliedRotation { angle, center });
    }

    fn applied(&self, id: &str) -> Option<AppliedAttributes> {
        self.applied.get(id).cloned()
    }
}
