//! Geometry shared by requests, tiles and map data.
//!
//! World coordinates are degrees (x = longitude, y = latitude). Rasters are
//! addressed on a global pixel grid at a resolution expressed in pixels per
//! degree (`ppd`).

mod grid;
mod projection;
mod rect;
mod region;
mod tiler;

pub use grid::PixelRect;
pub use projection::Projection;
pub use rect::{Rect, EPSILON};
pub use region::RegionSet;
pub use tiler::{GridTiler, TileKey, Tiler};

/// A world-space displacement, used for per-source nudging.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Offset {
    pub dx: f64,
    pub dy: f64,
}

impl Offset {
    pub const ZERO: Offset = Offset { dx: 0.0, dy: 0.0 };

    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }
}
