//! Region sets: unions of disjoint rectangles.
//!
//! `MapData` tracks which parts of its raster hold finished and fuzzy data
//! with a [`RegionSet`] in world coordinates. Pipeline stages describe the
//! pixels they touched with a [`RegionSet`] in raster pixel coordinates.

use super::rect::{Rect, EPSILON};

/// A union of pairwise-disjoint rectangles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionSet {
    rects: Vec<Rect>,
}

impl RegionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a region covering exactly one rectangle.
    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Self::new();
        region.add_rect(rect);
        region
    }

    /// The disjoint rectangles making up this region.
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn area(&self) -> f64 {
        self.rects.iter().map(Rect::area).sum()
    }

    /// Bounding box of the whole region.
    pub fn bounds(&self) -> Option<Rect> {
        let mut iter = self.rects.iter();
        let first = *iter.next()?;
        Some(iter.fold(first, |acc, r| acc.union_bounds(r)))
    }

    /// Adds a rectangle, keeping the stored pieces disjoint.
    pub fn add_rect(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        let mut pieces = vec![rect];
        for existing in &self.rects {
            pieces = pieces
                .into_iter()
                .flat_map(|p| p.difference(existing))
                .collect();
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
    }

    pub fn add_region(&mut self, other: &RegionSet) {
        for rect in &other.rects {
            self.add_rect(*rect);
        }
    }

    pub fn subtract_rect(&mut self, rect: &Rect) {
        if rect.is_empty() {
            return;
        }
        self.rects = self
            .rects
            .iter()
            .flat_map(|r| r.difference(rect))
            .collect();
    }

    pub fn subtract_region(&mut self, other: &RegionSet) {
        for rect in &other.rects {
            self.subtract_rect(rect);
        }
    }

    /// Clips the region to `rect` in place.
    pub fn intersect_rect(&mut self, rect: &Rect) {
        self.rects = self
            .rects
            .iter()
            .filter_map(|r| r.intersection(rect))
            .collect();
    }

    /// Returns the part of this region inside `rect`.
    pub fn clipped_to(&self, rect: &Rect) -> RegionSet {
        let mut clipped = self.clone();
        clipped.intersect_rect(rect);
        clipped
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        for rect in &mut self.rects {
            *rect = rect.translate(dx, dy);
        }
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.rects.iter().any(|r| r.contains_point(x, y))
    }

    /// Returns true if the region covers all of `rect`.
    pub fn covers(&self, rect: &Rect) -> bool {
        let mut remainder = RegionSet::from_rect(*rect);
        remainder.subtract_region(self);
        remainder.area() <= EPSILON * rect.area().max(1.0)
    }

    /// Returns true if both regions cover the same area.
    pub fn is_equivalent(&self, other: &RegionSet) -> bool {
        let mut a = self.clone();
        a.subtract_region(other);
        let mut b = other.clone();
        b.subtract_region(self);
        let tolerance = EPSILON * self.area().max(other.area()).max(1.0);
        a.area() <= tolerance && b.area() <= tolerance
    }
}

impl From<Rect> for RegionSet {
    fn from(rect: Rect) -> Self {
        Self::from_rect(rect)
    }
}
