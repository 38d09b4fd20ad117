//! Element geometry of a diagram

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box, serialized as `[x, y, width, height]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

impl From<[f64; 4]> for Rect {
    fn from([x, y, width, height]: [f64; 4]) -> Self {
        Self::new(x, y, width, height)
    }
}

impl From<Rect> for [f64; 4] {
    fn from(r: Rect) -> Self {
        [r.x, r.y, r.width, r.height]
    }
}

/// Native circle of an element, serialized as `[cx, cy, r]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
}

impl From<[f64; 3]> for Circle {
    fn from([cx, cy, r]: [f64; 3]) -> Self {
        Self {
            center: Point::new(cx, cy),
            radius: r,
        }
    }
}

impl From<Circle> for [f64; 3] {
    fn from(c: Circle) -> Self {
        [c.center.x, c.center.y, c.radius]
    }
}

/// What the diagram knows about an element's shape
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementGeometry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circle: Option<Circle>,
}

impl ElementGeometry {
    pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            bbox: Some(Rect::new(x, y, width, height)),
            circle: None,
        }
    }

    pub fn circle(cx: f64, cy: f64, r: f64) -> Self {
        Self {
            bbox: Some(Rect::new(cx - r, cy - r, 2.0 * r, 2.0 * r)),
            circle: Some(Circle {
                center: Point::new(cx, cy),
                radius: r,
            }),
        }
    }
}
