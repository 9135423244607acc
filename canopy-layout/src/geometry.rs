//! Basic 2-D value types shared by every layout algorithm.

use serde::{Deserialize, Serialize};

/// Size used for nodes whose measured size is unknown.
pub const DEFAULT_NODE_SIZE: Size = Size {
    width: 200.0,
    height: 100.0,
};

/// Largest coordinate or dimension accepted from callers.
pub const MAX_COORDINATE: f64 = 1.0e7;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn minus(&self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn approx_eq(&self, other: Point) -> bool {
        (self.x - other.x).abs() < 1e-6 && (self.y - other.y).abs() < 1e-6
    }

    /// Finite and within [`MAX_COORDINATE`] of the origin on both axes.
    pub fn is_on_canvas(&self) -> bool {
        [self.x, self.y]
            .iter()
            .all(|v| v.is_finite() && v.abs() <= MAX_COORDINATE)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Both dimensions positive, finite and at most [`MAX_COORDINATE`].
    pub fn is_valid(&self) -> bool {
        is_dimension(self.width) && is_dimension(self.height)
    }
}

pub fn is_dimension(value: f64) -> bool {
    value.is_finite() && value > 0.0 && value <= MAX_COORDINATE
}

impl Default for Size {
    fn default() -> Self {
        DEFAULT_NODE_SIZE
    }
}

/// Axis-aligned rectangle in origin + size form (design-tool convention).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
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

    pub fn at(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Strict overlap: rectangles that only share an edge do not overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    pub fn inflate(&self, amount: f64) -> Rect {
        Rect::new(
            self.x - amount,
            self.y - amount,
            self.width + amount * 2.0,
            self.height + amount * 2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_edges() {
        let r = Rect::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(r.right(), 110.0);
        assert_eq!(r.bottom(), 70.0);
        assert_eq!(r.center(), Point::new(60.0, 45.0));
    }

    #[test]
    fn test_touching_rects_do_not_overlap() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(100.0, 0.0, 100.0, 100.0);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&Rect::new(99.0, 99.0, 10.0, 10.0)));
    }

    #[test]
    fn test_union_and_inflate() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 30.0, 10.0, 10.0);
        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 30.0, 40.0));
        assert_eq!(a.inflate(5.0), Rect::new(-5.0, -5.0, 20.0, 20.0));
    }

    #[test]
    fn test_canvas_bounds() {
        assert!(Point::new(-5000.0, 1.0e6).is_on_canvas());
        assert!(!Point::new(-1.0e22, 0.0).is_on_canvas());
        assert!(!Point::new(f64::NAN, 0.0).is_on_canvas());
        assert!(Size::new(200.0, 100.0).is_valid());
        assert!(!Size::new(2.0e22, 100.0).is_valid());
        assert!(!Size::new(0.0, 100.0).is_valid());
        assert!(!Size::new(100.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn test_default_size() {
        assert_eq!(Size::default(), DEFAULT_NODE_SIZE);
    }
}
