//! Axis-aligned rectangles in world or pixel space.

use std::fmt;

/// Tolerance used for containment and sliver filtering.
pub const EPSILON: f64 = 1e-9;

/// An axis-aligned rectangle with `f64` bounds.
///
/// Used both for world extents (degrees) and for raster pixel areas, where
/// the bounds hold integral values. Bounds are half-open in spirit: a point
/// on `max_x`/`max_y` is outside.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    /// Creates a rectangle from two corners, normalizing their order.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    /// Creates a rectangle from an origin and a size.
    pub fn from_origin(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    #[inline]
    pub fn area(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.width() * self.height()
        }
    }

    /// Returns true if the rectangle has no interior.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.width() > EPSILON && self.height() > EPSILON)
    }

    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
    }

    /// Returns the overlapping part of two rectangles, if any.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let r = Rect {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        };
        (!r.is_empty()).then_some(r)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersection(other).is_some()
    }

    /// Returns true if `other` lies inside this rectangle (within [`EPSILON`]).
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.min_x >= self.min_x - EPSILON
            && other.min_y >= self.min_y - EPSILON
            && other.max_x <= self.max_x + EPSILON
            && other.max_y <= self.max_y + EPSILON
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x < self.max_x && y >= self.min_y && y < self.max_y
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    /// Grows the rectangle by `amount` on every side.
    pub fn inflate(&self, amount: f64) -> Rect {
        Rect {
            min_x: self.min_x - amount,
            min_y: self.min_y - amount,
            max_x: self.max_x + amount,
            max_y: self.max_y + amount,
        }
    }

    /// Smallest rectangle containing both.
    pub fn union_bounds(&self, other: &Rect) -> Rect {
        Rect {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Returns the parts of `self` not covered by `other`.
    ///
    /// The result holds at most four disjoint rectangles: full-width bands
    /// above and below the overlap, then the left and right remainders.
    pub fn difference(&self, other: &Rect) -> Vec<Rect> {
        let Some(cut) = self.intersection(other) else {
            return vec![*self];
        };

        let pieces = [
            Rect::new(self.min_x, self.min_y, self.max_x, cut.min_y),
            Rect::new(self.min_x, cut.max_y, self.max_x, self.max_y),
            Rect::new(self.min_x, cut.min_y, cut.min_x, cut.max_y),
            Rect::new(cut.max_x, cut.min_y, self.max_x, cut.max_y),
        ];

        pieces.into_iter().filter(|r| !r.is_empty()).collect()
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] - [{}, {}]",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}
