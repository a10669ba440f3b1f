//! Default values and constants for all configuration settings.
//!
//! Also holds the `ConfigFile::default()` implementation.

use std::path::PathBuf;
use std::time::Duration;

use super::settings::*;
use crate::raster::RasterShape;

/// Default number of fetch attempts per tile.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default per-attempt HTTP timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default scan interval of the fetch watcher, in milliseconds.
pub const DEFAULT_WATCH_INTERVAL_MS: u64 = 100;

/// Base of the exponential retry backoff, in milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 100;

/// Default tile edge length, in pixels.
pub const DEFAULT_TILE_PIXELS: u32 = 256;

/// Smallest accepted tile edge length.
pub const MIN_TILE_PIXELS: u32 = 16;

/// Default coalescing window for view changes, in milliseconds.
pub const DEFAULT_THROTTLE_WINDOW_MS: u64 = 250;

/// Default WMS protocol version.
pub const DEFAULT_WMS_VERSION: &str = "1.1.1";

/// Default image format requested from WMS servers.
pub const DEFAULT_WMS_FORMAT: &str = "image/png";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "planetmap.log";

/// Raster shape names accepted in `[layer.*]` sections.
pub const SHAPE_NAMES: [(&str, RasterShape); 6] = [
    ("gray8", RasterShape::GRAY8),
    ("rgb8", RasterShape::RGB8),
    ("rgba8", RasterShape::RGBA8),
    ("elevation16", RasterShape::ELEVATION16),
    ("elevation_u16", RasterShape::ELEVATION_U16),
    ("elevation32", RasterShape::ELEVATION32),
];

/// Config name of a raster shape.
pub fn shape_name(shape: RasterShape) -> &'static str {
    SHAPE_NAMES
        .iter()
        .find(|(_, s)| *s == shape)
        .map(|(name, _)| *name)
        .unwrap_or("rgba8")
}

/// Raster shape for a config name.
pub fn shape_from_name(name: &str) -> Option<RasterShape> {
    let name = name.trim().to_ascii_lowercase();
    SHAPE_NAMES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, shape)| *shape)
}

/// Default directory for log files.
pub fn default_log_directory() -> PathBuf {
    super::file::config_directory().join("logs")
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            fetch: FetchSettings {
                max_retries: DEFAULT_MAX_RETRIES,
                timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
                watch_interval: Duration::from_millis(DEFAULT_WATCH_INTERVAL_MS),
            },
            tiles: TileSettings {
                tile_pixels: DEFAULT_TILE_PIXELS,
            },
            throttle: ThrottleSettings {
                window: Duration::from_millis(DEFAULT_THROTTLE_WINDOW_MS),
            },
            wms: WmsSettings {
                url: None,
                version: DEFAULT_WMS_VERSION.to_string(),
                default_layer: None,
            },
            layers: Vec::new(),
            logging: LoggingSettings {
                directory: default_log_directory(),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_names_round_trip() {
        for (name, shape) in SHAPE_NAMES {
            assert_eq!(shape_name(shape), name);
            assert_eq!(shape_from_name(name), Some(shape));
        }
        assert_eq!(shape_from_name(" RGB8 "), Some(RasterShape::RGB8));
        assert_eq!(shape_from_name("cmyk"), None);
    }
}
