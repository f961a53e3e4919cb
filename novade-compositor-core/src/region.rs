//! Regions: sets of pixels described by non-overlapping rectangles.
//!
//! A [`Region`] is always kept in canonical y-x banded form:
//! - rectangles are sorted by `(y, x)`;
//! - rectangles sharing a band have the same `y` and `height`, do not
//!   overlap and do not touch horizontally;
//! - two vertically adjacent bands never have identical horizontal spans
//!   (they would have been merged into one band).
//!
//! The canonical form of a pixel set is unique, so two regions compare equal
//! exactly when they cover the same pixels. Every operation re-normalizes
//! its result, which keeps the rectangle lists handed to the display server
//! as short as the shape allows.
//!
//! [`Region::infinite`] is a sentinel meaning "everything, unclipped". It is
//! carried as a flag rather than materialized, and backends treat it as "no
//! clip at all".

use std::fmt;
use std::ops::{BitAnd, BitOr, Sub};

use crate::geometry::{Point, Rectangle};

/// Bounds used when an operation forces the infinite region to become
/// concrete (for example `infinite - rect`).
const INFINITE_MIN: i32 = i32::MIN / 2;
const INFINITE_MAX: i32 = i32::MAX / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Union,
    Intersect,
    Subtract,
}

impl Op {
    fn apply(self, in_a: bool, in_b: bool) -> bool {
        match self {
            Op::Union => in_a || in_b,
            Op::Intersect => in_a && in_b,
            Op::Subtract => in_a && !in_b,
        }
    }
}

/// A normalized set of rectangles.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Region {
    rects: Vec<Rectangle>,
    infinite: bool,
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.infinite {
            f.write_str("Region(infinite)")
        } else {
            f.debug_tuple("Region").field(&self.rects).finish()
        }
    }
}

impl Region {
    /// The empty region.
    pub fn new() -> Self {
        Self::default()
    }

    /// The "whole screen, unclipped" sentinel.
    pub fn infinite() -> Self {
        Self { rects: Vec::new(), infinite: true }
    }

    pub fn from_rect(rect: Rectangle) -> Self {
        if rect.is_empty() {
            return Self::new();
        }
        Self { rects: vec![rect], infinite: false }
    }

    /// Builds a region from arbitrary, possibly overlapping rectangles.
    pub fn from_rects<I: IntoIterator<Item = Rectangle>>(rects: I) -> Self {
        let rects: Vec<Rectangle> = rects.into_iter().filter(|r| !r.is_empty()).collect();
        Self { rects: combine(&rects, &[], Op::Union), infinite: false }
    }

    pub fn is_empty(&self) -> bool {
        !self.infinite && self.rects.is_empty()
    }

    pub fn is_infinite(&self) -> bool {
        self.infinite
    }

    /// The canonical rectangles. Empty for the infinite region; callers that
    /// need concrete rectangles for it should check [`Region::is_infinite`].
    pub fn rects(&self) -> &[Rectangle] {
        &self.rects
    }

    pub fn clear(&mut self) {
        self.rects.clear();
        self.infinite = false;
    }

    /// Smallest rectangle containing the whole region.
    pub fn bounding_rect(&self) -> Rectangle {
        if self.infinite {
            return Rectangle::from_edges(INFINITE_MIN, INFINITE_MIN, INFINITE_MAX, INFINITE_MAX);
        }
        self.rects.iter().fold(Rectangle::default(), |acc, r| acc.union(r))
    }

    /// Number of covered pixels. Saturates for the infinite region.
    pub fn area(&self) -> i64 {
        if self.infinite {
            return i64::MAX;
        }
        self.rects.iter().map(Rectangle::area).sum()
    }

    pub fn contains_point(&self, point: Point) -> bool {
        self.infinite || self.rects.iter().any(|r| r.contains_point(point))
    }

    /// `true` when every pixel of `rect` is inside the region.
    pub fn contains_rect(&self, rect: &Rectangle) -> bool {
        if self.infinite || rect.is_empty() {
            return true;
        }
        Region::from_rect(*rect).subtracted(self).is_empty()
    }

    pub fn intersects_rect(&self, rect: &Rectangle) -> bool {
        if rect.is_empty() {
            return false;
        }
        self.infinite || self.rects.iter().any(|r| r.intersects(rect))
    }

    pub fn intersects(&self, other: &Region) -> bool {
        !self.intersected(other).is_empty()
    }

    pub fn united(&self, other: &Region) -> Region {
        if self.infinite || other.infinite {
            return Region::infinite();
        }
        Region { rects: combine(&self.rects, &other.rects, Op::Union), infinite: false }
    }

    pub fn intersected(&self, other: &Region) -> Region {
        match (self.infinite, other.infinite) {
            (true, true) => Region::infinite(),
            (true, false) => other.clone(),
            (false, true) => self.clone(),
            (false, false) => Region {
                rects: combine(&self.rects, &other.rects, Op::Intersect),
                infinite: false,
            },
        }
    }

    pub fn subtracted(&self, other: &Region) -> Region {
        if other.infinite {
            return Region::new();
        }
        if other.is_empty() {
            return self.clone();
        }
        let base = if self.infinite {
            vec![self.bounding_rect()]
        } else {
            self.rects.clone()
        };
        Region { rects: combine(&base, &other.rects, Op::Subtract), infinite: false }
    }

    pub fn union_with(&mut self, other: &Region) {
        *self = self.united(other);
    }

    pub fn intersect_with(&mut self, other: &Region) {
        *self = self.intersected(other);
    }

    pub fn subtract(&mut self, other: &Region) {
        *self = self.subtracted(other);
    }

    pub fn add_rect(&mut self, rect: Rectangle) {
        if rect.is_empty() || self.infinite {
            return;
        }
        self.rects = combine(&self.rects, &[rect], Op::Union);
    }

    pub fn subtract_rect(&mut self, rect: Rectangle) {
        if rect.is_empty() {
            return;
        }
        self.subtract(&Region::from_rect(rect));
    }

    pub fn intersect_rect(&mut self, rect: Rectangle) {
        self.intersect_with(&Region::from_rect(rect));
    }

    /// Shifts every rectangle. Translation preserves the canonical form,
    /// so no re-normalization is needed and `translated(dx, dy)` followed by
    /// `translated(-dx, -dy)` restores the region exactly.
    pub fn translated(&self, dx: i32, dy: i32) -> Region {
        if self.infinite {
            return Region::infinite();
        }
        Region {
            rects: self.rects.iter().map(|r| r.translate(dx, dy)).collect(),
            infinite: false,
        }
    }

    pub fn translate(&mut self, dx: i32, dy: i32) {
        if self.infinite {
            return;
        }
        for rect in &mut self.rects {
            *rect = rect.translate(dx, dy);
        }
    }

    /// Scales the region around the origin. Each rectangle grows outward to
    /// whole pixels, so the result always covers the exact scaled shape.
    pub fn scaled(&self, sx: f64, sy: f64) -> Region {
        if self.infinite {
            return Region::infinite();
        }
        Region::from_rects(self.rects.iter().map(|r| r.scaled(sx, sy)))
    }
}

impl From<Rectangle> for Region {
    fn from(rect: Rectangle) -> Self {
        Region::from_rect(rect)
    }
}

impl BitOr for &Region {
    type Output = Region;
    fn bitor(self, rhs: Self) -> Region {
        self.united(rhs)
    }
}

impl BitAnd for &Region {
    type Output = Region;
    fn bitand(self, rhs: Self) -> Region {
        self.intersected(rhs)
    }
}

impl Sub for &Region {
    type Output = Region;
    fn sub(self, rhs: Self) -> Region {
        self.subtracted(rhs)
    }
}

/// Horizontal spans `[start, end)` covered by `rects` inside the band
/// `[top, bottom)`. The band edges come from the rectangle edges, so each
/// rectangle either covers the whole band or misses it.
fn spans_in_band(rects: &[Rectangle], top: i32, bottom: i32) -> Vec<(i32, i32)> {
    let mut spans: Vec<(i32, i32)> = rects
        .iter()
        .filter(|r| r.top() <= top && r.bottom() >= bottom)
        .map(|r| (r.left(), r.right()))
        .collect();
    spans.sort_unstable();

    let mut merged: Vec<(i32, i32)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

fn covered(spans: &[(i32, i32)], x: i32) -> bool {
    spans.iter().any(|&(start, end)| x >= start && x < end)
}

fn combine_spans(a: &[(i32, i32)], b: &[(i32, i32)], op: Op) -> Vec<(i32, i32)> {
    let mut xs: Vec<i32> = a.iter().chain(b.iter()).flat_map(|&(s, e)| [s, e]).collect();
    xs.sort_unstable();
    xs.dedup();

    let mut out: Vec<(i32, i32)> = Vec::new();
    for pair in xs.windows(2) {
        let (x0, x1) = (pair[0], pair[1]);
        if !op.apply(covered(a, x0), covered(b, x0)) {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.1 == x0 => last.1 = x1,
            _ => out.push((x0, x1)),
        }
    }
    out
}

/// Band sweep over both rectangle sets, producing canonical output.
fn combine(a: &[Rectangle], b: &[Rectangle], op: Op) -> Vec<Rectangle> {
    let mut ys: Vec<i32> = a
        .iter()
        .chain(b.iter())
        .filter(|r| !r.is_empty())
        .flat_map(|r| [r.top(), r.bottom()])
        .collect();
    ys.sort_unstable();
    ys.dedup();

    let mut out: Vec<Rectangle> = Vec::new();
    // The band currently being grown downward: (top, bottom, spans).
    let mut open: Option<(i32, i32, Vec<(i32, i32)>)> = None;

    let flush = |band: (i32, i32, Vec<(i32, i32)>), out: &mut Vec<Rectangle>| {
        let (top, bottom, spans) = band;
        out.extend(spans.into_iter().map(|(s, e)| Rectangle::from_edges(s, top, e, bottom)));
    };

    for pair in ys.windows(2) {
        let (y0, y1) = (pair[0], pair[1]);
        let spans = combine_spans(&spans_in_band(a, y0, y1), &spans_in_band(b, y0, y1), op);

        open = match open.take() {
            Some((top, bottom, prev)) if bottom == y0 && prev == spans && !spans.is_empty() => {
                Some((top, y1, prev))
            }
            Some(band) => {
                flush(band, &mut out);
                if spans.is_empty() {
                    None
                } else {
                    Some((y0, y1, spans))
                }
            }
            None if spans.is_empty() => None,
            None => Some((y0, y1, spans)),
        };
    }
    if let Some(band) = open {
        flush(band, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn r(x: i32, y: i32, w: i32, h: i32) -> Rectangle {
        Rectangle::new(x, y, w, h)
    }

    fn no_overlaps(region: &Region) -> bool {
        let rects = region.rects();
        for (i, a) in rects.iter().enumerate() {
            for b in &rects[i + 1..] {
                if a.intersects(b) {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn overlapping_union_is_normalized() {
        let region = Region::from_rects([r(0, 0, 10, 10), r(5, 5, 10, 10), r(0, 0, 10, 10)]);
        assert!(no_overlaps(&region));
        assert_eq!(region.area(), 100 + 100 - 25);
        assert_eq!(region.rects(), &[r(0, 0, 10, 5), r(0, 5, 15, 5), r(5, 10, 10, 5)]);
    }

    #[test]
    fn adjacent_rects_merge() {
        let region = Region::from_rects([r(0, 0, 10, 10), r(10, 0, 10, 10), r(0, 10, 20, 5)]);
        assert_eq!(region.rects(), &[r(0, 0, 20, 15)]);
    }

    #[test]
    fn equal_pixel_sets_compare_equal() {
        let a = Region::from_rects([r(0, 0, 20, 10), r(0, 10, 10, 10)]);
        let b = Region::from_rects([r(0, 0, 10, 20), r(10, 0, 10, 10)]);
        assert_eq!(a, b);
    }

    #[test]
    fn intersect_disjoint_is_empty() {
        let a = Region::from_rect(r(0, 0, 10, 10));
        let b = Region::from_rect(r(50, 50, 10, 10));
        assert!(a.intersected(&b).is_empty());
    }

    #[test]
    fn subtract_self_is_empty() {
        let a = Region::from_rects([r(0, 0, 10, 10), r(30, 5, 7, 9)]);
        assert!(a.subtracted(&a).is_empty());
    }

    #[test]
    fn subtract_hole_fragments() {
        let mut a = Region::from_rect(r(0, 0, 30, 30));
        a.subtract_rect(r(10, 10, 10, 10));
        assert_eq!(a.area(), 900 - 100);
        assert!(no_overlaps(&a));
        assert!(!a.contains_point(Point::new(15, 15)));
        assert!(a.contains_point(Point::new(5, 15)));
    }

    #[rstest]
    #[case(3, -7)]
    #[case(-100, 250)]
    #[case(0, 0)]
    fn translate_round_trip(#[case] dx: i32, #[case] dy: i32) {
        let a = Region::from_rects([r(0, 0, 10, 10), r(5, 5, 10, 10), r(40, 1, 2, 2)]);
        assert_eq!(a.translated(dx, dy).translated(-dx, -dy), a);
    }

    #[test]
    fn intersection_is_associative() {
        let a = Region::from_rects([r(0, 0, 50, 50), r(60, 0, 10, 80)]);
        let b = Region::from_rects([r(25, 10, 50, 20), r(0, 40, 100, 5)]);
        let c = Region::from_rects([r(30, 0, 5, 100), r(0, 42, 70, 30)]);
        assert_eq!(&(&a & &b) & &c, &a & &(&b & &c));
    }

    #[test]
    fn union_is_commutative() {
        let a = Region::from_rects([r(0, 0, 50, 50), r(60, 0, 10, 80)]);
        let b = Region::from_rects([r(25, 10, 50, 20), r(0, 40, 100, 5)]);
        assert_eq!(&a | &b, &b | &a);
    }

    #[test]
    fn infinite_sentinel_behaviour() {
        let inf = Region::infinite();
        let a = Region::from_rect(r(1, 2, 3, 4));
        assert!(inf.is_infinite());
        assert!(inf.rects().is_empty());
        assert_eq!(inf.intersected(&a), a);
        assert!(inf.united(&a).is_infinite());
        assert!(a.subtracted(&inf).is_empty());
        assert!(inf.translated(5, 5).is_infinite());
        let rest = inf.subtracted(&a);
        assert!(!rest.is_infinite());
        assert!(!rest.contains_point(Point::new(2, 3)));
        assert!(rest.contains_point(Point::new(-1000, 9000)));
    }

    #[test]
    fn scale_composes() {
        let a = Region::from_rects([r(2, 2, 4, 4), r(10, 0, 2, 8)]);
        assert_eq!(a.scaled(2.0, 2.0).scaled(0.5, 0.5), a);
        assert_eq!(a.scaled(2.0, 3.0).area(), a.area() * 6);
    }

    #[test]
    fn contains_rect_checks_coverage() {
        let a = Region::from_rects([r(0, 0, 10, 10), r(10, 0, 10, 10)]);
        assert!(a.contains_rect(&r(5, 2, 10, 5)));
        assert!(!a.contains_rect(&r(15, 5, 10, 2)));
    }
}
