//! Tiling and view-change coalescing configuration.

use super::defaults::{DEFAULT_THROTTLE_WINDOW_MS, DEFAULT_TILE_PIXELS, MIN_TILE_PIXELS};
use std::time::Duration;

/// Configuration for splitting requests into tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingConfig {
    tile_pixels: u32,
}

impl TilingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tile edge length in pixels. Values below 16 are raised to 16.
    pub fn with_tile_pixels(mut self, pixels: u32) -> Self {
        self.tile_pixels = pixels.max(MIN_TILE_PIXELS);
        self
    }

    pub fn tile_pixels(&self) -> u32 {
        self.tile_pixels
    }
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            tile_pixels: DEFAULT_TILE_PIXELS,
        }
    }
}

/// Configuration for coalescing bursts of view changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    window: Duration,
}

impl ThrottleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Window within which requests are merged.
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(DEFAULT_THROTTLE_WINDOW_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(TilingConfig::default().tile_pixels(), 256);
        assert_eq!(ThrottleConfig::default().window(), Duration::from_millis(250));
    }

    #[test]
    fn test_tile_pixels_floor() {
        assert_eq!(TilingConfig::new().with_tile_pixels(4).tile_pixels(), MIN_TILE_PIXELS);
        assert_eq!(TilingConfig::new().with_tile_pixels(512).tile_pixels(), 512);
    }
}
