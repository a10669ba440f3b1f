//! Channels: driving sources through pipelines into map data.
//!
//! # Architecture
//!
//! ```text
//! view change ─► ThrottledChannel ─► TiledChannel::set_request
//!                 (coalesces bursts)        │ tiles the extent
//!                                           ▼
//!                              Channel  Channel  Channel ...   one per tile
//!                          fetch ─► pipeline ─► MapData
//!                                           │ TileEvent
//!                                           ▼
//!                                      coordinator ─► MapReceiver::map_changed
//! ```
//!
//! Each tile [`Channel`] runs on its own task with a private pipeline clone.
//! Updates travel back to a single coordinator task owned by the
//! [`TiledChannel`], which drops updates from superseded channels and routes
//! those of cancelled requests to [`MapReceiver::map_dropped`].

mod throttle;
mod tile;
mod tiled;

#[cfg(test)]
pub(crate) mod test_support;

pub use throttle::{Coalescer, RequestSink, RunMode, ThrottledChannel, ViewParams};
pub use tile::{Channel, FetchContext};
pub use tiled::TiledChannel;

use crate::data::MapData;
use crate::request::RequestError;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// One per-tile update pushed to a receiver.
#[derive(Debug, Clone)]
pub struct MapUpdate {
    /// Name of the pipeline the data belongs to.
    pub layer: String,
    /// Request generation; bumped by every `set_request`.
    pub generation: u64,
    pub data: Arc<MapData>,
    /// Whether this tile is done.
    pub finished: bool,
}

/// Receives map updates.
///
/// Called from the coordinator task, at least once per tile per generation
/// and possibly repeatedly as fuzzy data is replaced by final data.
/// Implementations must not block.
pub trait MapReceiver: Send + Sync {
    fn map_changed(&self, update: MapUpdate);

    /// Called instead of [`map_changed`](Self::map_changed) when the update's
    /// request was cancelled while the tile was still working. The data is
    /// whatever the tile produced before it stopped.
    fn map_dropped(&self, _update: MapUpdate) {}
}

impl MapReceiver for mpsc::UnboundedSender<MapUpdate> {
    fn map_changed(&self, update: MapUpdate) {
        // A closed receiver means nobody is listening any more.
        let _ = self.send(update);
    }
}

/// Errors starting channel work.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Request(#[from] RequestError),
}
