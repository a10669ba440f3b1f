//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use crate::geo::Offset;
use crate::raster::RasterShape;
use std::path::PathBuf;
use std::time::Duration;

use super::channel::{ThrottleConfig, TilingConfig};
use super::fetch::FetchConfig;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Tile fetch retry and timeout settings
    pub fetch: FetchSettings,
    /// Tiling settings
    pub tiles: TileSettings,
    /// View-change coalescing settings
    pub throttle: ThrottleSettings,
    /// WMS server settings
    pub wms: WmsSettings,
    /// One entry per `[layer.<name>]` section, in file order
    pub layers: Vec<LayerSettings>,
    /// Logging settings
    pub logging: LoggingSettings,
}

impl ConfigFile {
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig::new()
            .with_max_retries(self.fetch.max_retries)
            .with_request_timeout(self.fetch.timeout)
            .with_watch_interval(self.fetch.watch_interval)
    }

    pub fn tiling_config(&self) -> TilingConfig {
        TilingConfig::new().with_tile_pixels(self.tiles.tile_pixels)
    }

    pub fn throttle_config(&self) -> ThrottleConfig {
        ThrottleConfig::new().with_window(self.throttle.window)
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Attempts per tile before giving up.
    pub max_retries: u32,
    /// Per-attempt HTTP timeout.
    pub timeout: Duration,
    /// Scan interval of the fetch watcher.
    pub watch_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct TileSettings {
    pub tile_pixels: u32,
}

#[derive(Debug, Clone)]
pub struct ThrottleSettings {
    /// Window within which view changes are merged.
    pub window: Duration,
}

/// WMS server configuration.
#[derive(Debug, Clone)]
pub struct WmsSettings {
    /// GetMap endpoint. No WMS sources are created when unset.
    pub url: Option<String>,
    pub version: String,
    /// Layer used when none is named; the first layer otherwise.
    pub default_layer: Option<String>,
}

/// One map layer served by the WMS server.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSettings {
    /// Source name used in requests.
    pub name: String,
    /// Value of the WMS `LAYERS` parameter.
    pub layers: String,
    pub format: String,
    pub styles: String,
    pub shape: RasterShape,
    /// Offset applied to every tile of this layer, in degrees.
    pub nudge: Offset,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}
