//! Configuration for planetmap components.
//!
//! Value configs ([`FetchConfig`], [`TilingConfig`], [`ThrottleConfig`]) are
//! passed to the components that use them. [`ConfigFile`] loads them, plus
//! the WMS layer list and logging settings, from an INI file.
//!
//! # Example
//!
//! ```
//! use planetmap::config::{FetchConfig, TilingConfig};
//!
//! let fetch = FetchConfig::default().with_max_retries(5);
//! let tiling = TilingConfig::default().with_tile_pixels(512);
//! assert_eq!(fetch.max_retries(), 5);
//! assert_eq!(tiling.tile_pixels(), 512);
//! ```

mod channel;
mod defaults;
mod fetch;
mod file;
mod parser;
mod settings;
mod writer;

pub use channel::{ThrottleConfig, TilingConfig};
pub use defaults::*;
pub use fetch::FetchConfig;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    ConfigFile, FetchSettings, LayerSettings, LoggingSettings, ThrottleSettings, TileSettings,
    WmsSettings,
};
