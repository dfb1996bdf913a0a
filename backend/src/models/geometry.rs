//! Planar geometry used by the tracker and the zone detector.
//!
//! Coordinates are image pixels (`f64`). Nothing here tries to be
//! sub-pixel exact: containment uses the even-odd rule on the raw ring.

use serde::{Deserialize, Serialize};

/// A 2-D point in image coordinates. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for Point {
    fn from(p: [f64; 2]) -> Self {
        Self::new(p[0], p[1])
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Axis-aligned bounding box in corner form `(x1, y1, x2, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Geometric center of the box.
    pub fn centroid(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }
}

/// Width and height of a video frame, used to rescale area rings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: f64,
    pub height: f64,
}

impl FrameSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Even-odd (ray casting) containment test.
///
/// A ray is cast from `p` along +x; the point is inside when it crosses an
/// odd number of edges. Horizontal edges never count as a crossing, and each
/// edge is half-open in y so a vertex shared by two edges is counted once.
/// Rings with fewer than three points contain nothing.
pub fn point_in_polygon(p: Point, ring: &[Point]) -> bool {
    if ring.len() < 3 || !p.is_finite() {
        return false;
    }

    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[j];
        // horizontal edge: (a.y > p.y) == (b.y > p.y) always holds
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Rescale a ring drawn against `from` so it lines up with `to`.
///
/// A zero-sized source frame leaves the ring untouched.
pub fn scale_ring(ring: &[Point], from: FrameSize, to: FrameSize) -> Vec<Point> {
    if from.width <= 0.0 || from.height <= 0.0 {
        return ring.to_vec();
    }
    let sx = to.width / from.width;
    let sy = to.height / from.height;
    ring.iter().map(|p| Point::new(p.x * sx, p.y * sy)).collect()
}
