//! Map projections understood by the request pipeline.

use super::rect::Rect;
use std::fmt;

const MICRO: f64 = 1_000_000.0;

/// Projection of the map domain.
///
/// Centers are stored as integer micro-degrees so projections can take part
/// in request equality and hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Projection {
    /// Simple cylindrical projection, periodic in x with a 360° period.
    Cylindrical {
        center_lon_micro: i64,
        center_lat_micro: i64,
    },
    /// Unbounded planar space without wrap-around.
    Planar,
}

impl Projection {
    /// Cylindrical projection centered on the given point.
    pub fn cylindrical(center_lon: f64, center_lat: f64) -> Self {
        Projection::Cylindrical {
            center_lon_micro: (center_lon * MICRO).round() as i64,
            center_lat_micro: (center_lat * MICRO).round() as i64,
        }
    }

    /// Cylindrical projection centered on (0, 0).
    pub fn unrotated() -> Self {
        Self::cylindrical(0.0, 0.0)
    }

    /// Projection center in degrees, if the projection has one.
    pub fn center(&self) -> Option<(f64, f64)> {
        match self {
            Projection::Cylindrical {
                center_lon_micro,
                center_lat_micro,
            } => Some((
                *center_lon_micro as f64 / MICRO,
                *center_lat_micro as f64 / MICRO,
            )),
            Projection::Planar => None,
        }
    }

    /// Period of the world domain along x, for projections that wrap.
    pub fn wrap_period(&self) -> Option<f64> {
        match self {
            Projection::Cylindrical { .. } => Some(360.0),
            Projection::Planar => None,
        }
    }

    /// Valid world domain, for bounded projections.
    pub fn world_bounds(&self) -> Option<Rect> {
        match self {
            Projection::Cylindrical { .. } => Some(Rect::new(-180.0, -90.0, 180.0, 90.0)),
            Projection::Planar => None,
        }
    }

    /// Spatial reference code sent to WMS servers.
    pub fn srs(&self) -> String {
        match self.center() {
            Some((lon, lat)) if lon == 0.0 && lat == 0.0 => "EPSG:4326".to_string(),
            Some((lon, lat)) => format!("AUTO2:42004,1,{},{}", lon, lat),
            None => "EPSG:4326".to_string(),
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::unrotated()
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.center() {
            Some((lon, lat)) => write!(f, "cylindrical({}, {})", lon, lat),
            None => write!(f, "planar"),
        }
    }
}
