//! Integer geometry primitives shared by the region algebra, the surface
//! records and the scene.
//!
//! All coordinates are in screen pixels unless a method says otherwise.
//! Rectangles are half-open: a rectangle covers `x..x + width` and
//! `y..y + height`.

use serde::{Deserialize, Serialize};

/// A point in screen or surface-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A width/height pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// A size is empty when either dimension is zero or negative.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub const fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// Builds a rectangle from its top-left and bottom-right (exclusive) edges.
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Pixel area; empty rectangles have area zero.
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            i64::from(self.width) * i64::from(self.height)
        }
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    /// `true` when `other` lies entirely inside `self`. Empty rectangles are
    /// contained in everything.
    pub fn contains_rect(&self, other: &Self) -> bool {
        if other.is_empty() {
            return true;
        }
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersects(&self, other: &Self) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// The overlapping part of both rectangles, or an empty rectangle.
    pub fn intersection(&self, other: &Self) -> Self {
        if !self.intersects(other) {
            return Self::default();
        }
        Self::from_edges(
            self.x.max(other.x),
            self.y.max(other.y),
            self.right().min(other.right()),
            self.bottom().min(other.bottom()),
        )
    }

    /// Clips this rectangle against `clipping_rect`.
    pub fn clipped_to(&self, clipping_rect: &Self) -> Self {
        self.intersection(clipping_rect)
    }

    /// Bounding box of both rectangles; empty inputs are ignored.
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self::from_edges(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Grows (or shrinks, for negative values) every edge independently.
    pub fn adjusted(&self, left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self::from_edges(self.x + left, self.y + top, self.right() + right, self.bottom() + bottom)
    }

    /// Grows every edge by `amount`.
    pub fn inflate(&self, amount: i32) -> Self {
        self.adjusted(-amount, -amount, amount, amount)
    }

    /// Smallest integer rectangle covering this one scaled by `(sx, sy)`
    /// around the origin.
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        let left = (f64::from(self.x) * sx).floor();
        let right = (f64::from(self.right()) * sx).ceil();
        let top = (f64::from(self.y) * sy).floor();
        let bottom = (f64::from(self.bottom()) * sy).ceil();
        let (left, right) = if left <= right { (left, right) } else { (right, left) };
        let (top, bottom) = if top <= bottom { (top, bottom) } else { (bottom, top) };
        Self::from_edges(left as i32, top as i32, right as i32, bottom as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_of_disjoint_rects_is_empty() {
        let a = Rectangle::new(0, 0, 10, 10);
        let b = Rectangle::new(10, 0, 10, 10);
        assert!(!a.intersects(&b));
        assert!(a.intersection(&b).is_empty());
    }

    #[test]
    fn clipped_to_keeps_overlap() {
        let r = Rectangle::new(90, 40, 20, 15);
        assert_eq!(r.clipped_to(&Rectangle::new(0, 0, 100, 50)), Rectangle::new(90, 40, 10, 10));
    }

    #[test]
    fn union_ignores_empty() {
        let a = Rectangle::new(5, 5, 10, 10);
        assert_eq!(a.union(&Rectangle::default()), a);
        assert_eq!(Rectangle::default().union(&a), a);
        assert_eq!(a.union(&Rectangle::new(20, 0, 5, 5)), Rectangle::new(5, 0, 20, 15));
    }

    #[test]
    fn adjusted_and_inflate() {
        let r = Rectangle::new(10, 10, 100, 50);
        assert_eq!(r.inflate(15), Rectangle::new(-5, -5, 130, 80));
        assert_eq!(r.adjusted(-1, -2, 3, 4), Rectangle::new(9, 8, 104, 56));
    }

    #[test]
    fn scaled_covers_fractional_edges() {
        let r = Rectangle::new(1, 1, 3, 3);
        assert_eq!(r.scaled(0.5, 0.5), Rectangle::from_edges(0, 0, 2, 2));
        assert_eq!(r.scaled(2.0, 2.0), Rectangle::new(2, 2, 6, 6));
    }

    #[test]
    fn area_of_empty_is_zero() {
        assert_eq!(Rectangle::new(0, 0, -5, 10).area(), 0);
        assert_eq!(Rectangle::new(0, 0, 5, 10).area(), 50);
    }
}
