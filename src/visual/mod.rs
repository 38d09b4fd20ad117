//! Visual state and diagram rendering
//!
//! [`VisualEngine`] turns resolved events into per-element state and pushes
//! the resulting changes to a [`RenderSurface`].

pub mod engine;
pub mod geometry;
pub mod rotation;
pub mod surface;

pub use engine::{PulseDirective, VisualElementState, VisualEngine, DEFAULT_PULSE};
pub use geometry::{Circle, ElementGeometry, Point, Rect};
pub use rotation::normalize_angle;
pub use surface::{AppliedAttributes, AppliedRotation, DiagramSurface, RenderSurface};
