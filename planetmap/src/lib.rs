//! planetmap - tiled raster retrieval and compositing for planetary maps
//!
//! Given a region, a resolution in pixels per degree, a projection and a set
//! of processing pipelines, planetmap fetches the covering tiles from remote
//! map servers, runs each pipeline per tile, and merges the partial and final
//! tile results into one continuous raster per layer. Updates are pushed to a
//! [`channel::MapReceiver`] as tiles complete, and any view change cancels
//! outstanding work.
//!
//! # High-Level Flow
//!
//! ```ignore
//! use planetmap::catalog::{SourceCatalog, WmsServer};
//! use planetmap::channel::{FetchContext, TiledChannel};
//! use planetmap::compose::LayerComposer;
//! use planetmap::pipeline::{Pipeline, StageRegistry};
//!
//! let catalog = SourceCatalog::spawn(vec![Arc::new(server)]);
//! catalog.ready().await?;
//! let pipeline = Pipeline::for_source(&StageRegistry::standard(), catalog.default_source()?)?;
//!
//! let composer = Arc::new(LayerComposer::new(projection, extent, ppd));
//! let channel = TiledChannel::new(composer.clone(), &tiling, FetchContext::default());
//! channel.set_request(projection, extent, ppd, &[pipeline])?;
//! channel.until_finished().await;
//! ```

pub mod catalog;
pub mod channel;
pub mod compose;
pub mod config;
pub mod data;
pub mod geo;
pub mod logging;
pub mod pipeline;
pub mod raster;
pub mod request;
pub mod source;
pub mod tile;

/// Version of the planetmap library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
