//! Tile decomposition of request extents.

use super::grid::PixelRect;
use super::projection::Projection;
use super::rect::Rect;
use std::collections::BTreeSet;

/// Key of one tile in a tiler's grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub col: i64,
    pub row: i64,
}

impl TileKey {
    pub fn new(col: i64, row: i64) -> Self {
        Self { col, row }
    }
}

/// Enumerates the tiles covering an extent.
///
/// A tiler hands out canonical keys: for a wrapping projection an extent that
/// crosses the seam (or spans the world more than once) yields each tile once,
/// with the extent of its canonical occurrence.
pub trait Tiler: Send + Sync {
    /// Keys of all tiles needed to cover `extent` at `ppd`.
    fn tiles(&self, projection: &Projection, extent: &Rect, ppd: f64) -> Vec<TileKey>;

    /// Canonical, pixel-aligned extent of one tile.
    fn tile_extent(&self, projection: &Projection, key: TileKey, ppd: f64) -> Rect;
}

/// Fixed-size square tiles on the global pixel grid.
///
/// For a wrapping projection, tile columns start at the western world edge
/// and the last column of each period is clipped at the eastern edge, so
/// every tile lies inside the world whatever the resolution. Keys then count
/// columns from the western edge.
#[derive(Debug, Clone, Copy)]
pub struct GridTiler {
    tile_pixels: u32,
}

impl GridTiler {
    pub fn new(tile_pixels: u32) -> Self {
        Self {
            tile_pixels: tile_pixels.max(1),
        }
    }

    pub fn tile_pixels(&self) -> u32 {
        self.tile_pixels
    }

    /// First pixel column and column count of one world period.
    fn world_columns(&self, projection: &Projection, ppd: f64) -> Option<(i64, i64)> {
        projection.wrap_period()?;
        let px = PixelRect::outward(&projection.world_bounds()?, ppd);
        Some((px.col0, px.width()))
    }

    fn world_rows(&self, projection: &Projection, ppd: f64) -> Option<(i64, i64)> {
        projection.world_bounds().map(|b| {
            let px = PixelRect::outward(&b, ppd);
            (px.row0, px.row1)
        })
    }

    /// Inclusive ranges of tile columns covering pixel columns `px`.
    fn column_ranges(&self, projection: &Projection, px: &PixelRect, ppd: f64) -> Vec<(i64, i64)> {
        let tp = self.tile_pixels as i64;
        let Some((seam, width)) = self.world_columns(projection, ppd) else {
            return vec![(px.col0.div_euclid(tp), (px.col1 - 1).div_euclid(tp))];
        };

        let last = (width - 1) / tp;
        if px.width() >= width {
            return vec![(0, last)];
        }
        let start = (px.col0 - seam).rem_euclid(width);
        let end = start + px.width();
        if end <= width {
            vec![(start / tp, (end - 1) / tp)]
        } else {
            vec![(start / tp, last), (0, (end - width - 1) / tp)]
        }
    }
}

impl Default for GridTiler {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Tiler for GridTiler {
    fn tiles(&self, projection: &Projection, extent: &Rect, ppd: f64) -> Vec<TileKey> {
        let mut extent = *extent;
        if let Some(bounds) = projection.world_bounds() {
            extent.min_y = extent.min_y.max(bounds.min_y);
            extent.max_y = extent.max_y.min(bounds.max_y);
            if extent.max_y <= extent.min_y {
                return Vec::new();
            }
        }

        let px = PixelRect::outward(&extent, ppd);
        let tp = self.tile_pixels as i64;
        let row_first = px.row0.div_euclid(tp);
        let row_last = (px.row1 - 1).div_euclid(tp);

        let mut keys = BTreeSet::new();
        for (col_first, col_last) in self.column_ranges(projection, &px, ppd) {
            for col in col_first..=col_last {
                for row in row_first..=row_last {
                    keys.insert(TileKey::new(col, row));
                }
            }
        }
        keys.into_iter().collect()
    }

    fn tile_extent(&self, projection: &Projection, key: TileKey, ppd: f64) -> Rect {
        let tp = self.tile_pixels as i64;
        let (col0, col1) = match self.world_columns(projection, ppd) {
            Some((seam, width)) => (seam + key.col * tp, (seam + (key.col + 1) * tp).min(seam + width)),
            None => (key.col * tp, (key.col + 1) * tp),
        };
        let mut px = PixelRect::new(col0, key.row * tp, col1, (key.row + 1) * tp);
        if let Some((row0, row1)) = self.world_rows(projection, ppd) {
            px.row0 = px.row0.max(row0);
            px.row1 = px.row1.min(row1).max(px.row0 + 1);
        }
        px.to_world(ppd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_tile() {
        let tiler = GridTiler::new(256);
        let tiles = tiler.tiles(&Projection::unrotated(), &Rect::new(0.0, 0.0, 1.0, 1.0), 16.0);
        assert_eq!(tiles.len(), 1);
    }

    #[test]
    fn test_tiles_cover_extent() {
        let tiler = GridTiler::new(64);
        let projection = Projection::unrotated();
        let extent = Rect::new(-10.0, -5.0, 10.0, 5.0);
        let ppd = 8.0;

        // Columns start at -180°, so [-10, 10] spans three 8° tile columns.
        let tiles = tiler.tiles(&projection, &extent, ppd);
        assert_eq!(tiles.len(), 3 * 2);

        let mut covered = crate::geo::RegionSet::new();
        for key in tiles {
            covered.add_rect(tiler.tile_extent(&projection, key, ppd));
        }
        assert!(covered.covers(&extent));
    }

    #[test]
    fn test_wrapping_extent_yields_canonical_tiles() {
        let tiler = GridTiler::new(90);
        let projection = Projection::unrotated();
        let ppd = 1.0;

        let tiles = tiler.tiles(&projection, &Rect::new(170.0, 0.0, 190.0, 10.0), ppd);
        assert_eq!(tiles.len(), 2);
        for key in &tiles {
            let extent = tiler.tile_extent(&projection, *key, ppd);
            assert!(extent.min_x >= -180.0 && extent.max_x <= 180.0, "{}", extent);
        }
    }

    #[test]
    fn test_seam_tiles_stay_in_world_at_any_resolution() {
        let tiler = GridTiler::new(256);
        let projection = Projection::unrotated();

        for ppd in [4.0, 3.0, 0.7] {
            let extent = Rect::new(170.0, 0.0, 200.0, 10.0);
            let tiles = tiler.tiles(&projection, &extent, ppd);

            let world = projection.world_bounds().unwrap();
            let mut covered = crate::geo::RegionSet::new();
            for key in &tiles {
                let tile = tiler.tile_extent(&projection, *key, ppd);
                assert!(tile.min_x >= world.min_x - 1.0 / ppd, "{} at {}", tile, ppd);
                assert!(tile.max_x <= world.max_x + 1.0 / ppd, "{} at {}", tile, ppd);
                covered.add_rect(tile);
                covered.add_rect(tile.translate(360.0, 0.0));
            }
            assert!(covered.covers(&Rect::new(170.0, 0.0, 200.0, 10.0)), "ppd {}", ppd);
        }
    }

    #[test]
    fn test_last_column_is_clipped_at_seam() {
        let tiler = GridTiler::new(256);
        let projection = Projection::unrotated();
        // 1440 px per period: five full columns and one of 160 px.
        let key = TileKey::new(5, 0);
        let tile = tiler.tile_extent(&projection, key, 4.0);
        assert_eq!(tile.min_x, 140.0);
        assert_eq!(tile.max_x, 180.0);

        let tiles = tiler.tiles(&projection, &Rect::new(170.0, 0.0, 200.0, 10.0), 4.0);
        let cols: BTreeSet<i64> = tiles.iter().map(|k| k.col).collect();
        assert_eq!(cols.into_iter().collect::<Vec<_>>(), vec![0, 5]);
    }

    #[test]
    fn test_extent_wider_than_world_is_deduplicated() {
        let tiler = GridTiler::new(90);
        let tiles = tiler.tiles(&Projection::unrotated(), &Rect::new(-400.0, 0.0, 400.0, 1.0), 1.0);
        assert_eq!(tiles.len(), 4);
    }

    #[test]
    fn test_rows_clamped_to_world() {
        let tiler = GridTiler::new(64);
        let projection = Projection::unrotated();
        let ppd = 1.0;
        let tiles = tiler.tiles(&projection, &Rect::new(0.0, 60.0, 10.0, 120.0), ppd);
        for key in tiles {
            assert!(tiler.tile_extent(&projection, key, ppd).max_y <= 90.0);
        }
    }

    #[test]
    fn test_planar_does_not_wrap() {
        let tiler = GridTiler::new(90);
        let tiles = tiler.tiles(&Projection::Planar, &Rect::new(-400.0, 0.0, 400.0, 1.0), 1.0);
        assert_eq!(tiles.len(), 10);
    }
}
