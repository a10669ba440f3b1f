//! Pixel grid at a given resolution.
//!
//! World x maps to pixel columns as `floor(x * ppd)`. Rows grow southward:
//! row index is `floor(-y * ppd)`, so raster row 0 is the north edge of an
//! extent.

use super::rect::Rect;

/// Fraction of a pixel tolerated as floating-point noise when snapping.
const SNAP_TOLERANCE: f64 = 1e-6;

/// A half-open rectangle of global pixel indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub col0: i64,
    pub row0: i64,
    pub col1: i64,
    pub row1: i64,
}

impl PixelRect {
    pub fn new(col0: i64, row0: i64, col1: i64, row1: i64) -> Self {
        Self {
            col0,
            row0,
            col1,
            row1,
        }
    }

    /// Snaps `extent` outward to whole pixels, keeping at least one pixel per axis.
    ///
    /// The snapped world extent always contains `extent`: an edge that the
    /// noise tolerance pulled inside is pushed out by one pixel.
    pub fn outward(extent: &Rect, ppd: f64) -> Self {
        let mut col0 = (extent.min_x * ppd + SNAP_TOLERANCE).floor() as i64;
        let mut col1 = (extent.max_x * ppd - SNAP_TOLERANCE).ceil() as i64;
        let mut row0 = (-extent.max_y * ppd + SNAP_TOLERANCE).floor() as i64;
        let mut row1 = (-extent.min_y * ppd - SNAP_TOLERANCE).ceil() as i64;
        if col0 as f64 / ppd > extent.min_x {
            col0 -= 1;
        }
        if (col1 as f64 / ppd) < extent.max_x {
            col1 += 1;
        }
        if -(row0 as f64) / ppd < extent.max_y {
            row0 -= 1;
        }
        if -(row1 as f64) / ppd > extent.min_y {
            row1 += 1;
        }
        Self {
            col0,
            row0,
            col1: col1.max(col0 + 1),
            row1: row1.max(row0 + 1),
        }
    }

    /// Rounds each edge of `extent` to the nearest pixel boundary.
    ///
    /// Used for extents that are already pixel aligned up to float noise.
    pub fn nearest(extent: &Rect, ppd: f64) -> Self {
        Self {
            col0: (extent.min_x * ppd).round() as i64,
            row0: (-extent.max_y * ppd).round() as i64,
            col1: (extent.max_x * ppd).round() as i64,
            row1: (-extent.min_y * ppd).round() as i64,
        }
    }

    #[inline]
    pub fn width(&self) -> i64 {
        self.col1 - self.col0
    }

    #[inline]
    pub fn height(&self) -> i64 {
        self.row1 - self.row0
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn intersection(&self, other: &PixelRect) -> Option<PixelRect> {
        let r = PixelRect {
            col0: self.col0.max(other.col0),
            row0: self.row0.max(other.row0),
            col1: self.col1.min(other.col1),
            row1: self.row1.min(other.row1),
        };
        (!r.is_empty()).then_some(r)
    }

    pub fn translate(&self, dcol: i64, drow: i64) -> PixelRect {
        PixelRect {
            col0: self.col0 + dcol,
            row0: self.row0 + drow,
            col1: self.col1 + dcol,
            row1: self.row1 + drow,
        }
    }

    /// World extent of this pixel rectangle.
    pub fn to_world(&self, ppd: f64) -> Rect {
        Rect {
            min_x: self.col0 as f64 / ppd,
            min_y: (-self.row1) as f64 / ppd,
            max_x: self.col1 as f64 / ppd,
            max_y: (-self.row0) as f64 / ppd,
        }
    }

    /// Pixel-space rectangle, for use as a stage changed area.
    pub fn to_rect(&self) -> Rect {
        Rect::new(
            self.col0 as f64,
            self.row0 as f64,
            self.col1 as f64,
            self.row1 as f64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outward_contains_extent() {
        let extent = Rect::new(10.13, -3.77, 12.01, 4.5);
        let ppd = 8.0;
        let px = PixelRect::outward(&extent, ppd);
        assert!(px.to_world(ppd).contains_rect(&extent));
    }

    #[test]
    fn test_outward_contains_extent_at_low_resolution() {
        for (extent, ppd) in [
            (Rect::new(3999.9995, 0.0, 5000.0, 1000.0), 0.001),
            (Rect::new(0.0, -2000.0, 1000.0000004, 1000.0), 0.001),
            (Rect::new(-12.0000001, -7.0000001, 12.0000001, 7.0000001), 0.5),
        ] {
            let px = PixelRect::outward(&extent, ppd);
            assert!(px.to_world(ppd).contains_rect(&extent), "{extent} at {ppd}");
        }
    }

    #[test]
    fn test_outward_aligned_extent_is_unchanged() {
        let extent = Rect::new(0.0, 0.0, 2.0, 1.0);
        let px = PixelRect::outward(&extent, 4.0);
        assert_eq!(px, PixelRect::new(0, -4, 8, 0));
        assert_eq!(px.to_world(4.0), extent);
    }

    #[test]
    fn test_outward_degenerate_extent_has_one_pixel() {
        let extent = Rect::new(5.0, 5.0, 5.0, 5.0);
        let px = PixelRect::outward(&extent, 2.0);
        assert_eq!(px.width(), 1);
        assert_eq!(px.height(), 1);
    }

    #[test]
    fn test_rows_grow_southward() {
        let north = PixelRect::outward(&Rect::new(0.0, 10.0, 1.0, 11.0), 1.0);
        let south = PixelRect::outward(&Rect::new(0.0, -11.0, 1.0, -10.0), 1.0);
        assert!(north.row0 < south.row0);
    }

    #[test]
    fn test_nearest_absorbs_float_noise() {
        let ppd = 3.0;
        let extent = PixelRect::new(7, -9, 19, 3).to_world(ppd);
        assert_eq!(PixelRect::nearest(&extent, ppd), PixelRect::new(7, -9, 19, 3));
    }
}
