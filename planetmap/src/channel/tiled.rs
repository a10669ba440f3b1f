//! Tiled orchestration of one logical request per pipeline.

use super::tile::{Channel, FetchContext};
use super::{ChannelError, MapReceiver, MapUpdate};
use crate::config::TilingConfig;
use crate::data::MapData;
use crate::geo::{GridTiler, Projection, Rect, TileKey, Tiler};
use crate::pipeline::Pipeline;
use crate::request::MapRequest;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Pipeline index plus tile key.
type Slot = (usize, TileKey);

struct TileEvent {
    slot: Slot,
    channel: u64,
    data: Arc<MapData>,
    finished: bool,
}

struct ActiveChannel {
    id: u64,
    channel: Arc<Channel>,
}

#[derive(Default)]
struct State {
    generation: u64,
    layers: Vec<String>,
    requests: Vec<Arc<MapRequest>>,
    active: HashMap<Slot, ActiveChannel>,
}

impl State {
    /// Cancels every channel and the requests they serve.
    fn cancel_all(&mut self) {
        for request in &self.requests {
            request.cancel();
        }
        for (_, active) in self.active.drain() {
            active.channel.cancel();
        }
    }
}

struct Shared {
    state: Mutex<State>,
    receiver: Arc<dyn MapReceiver>,
    idle: watch::Sender<bool>,
    dropped: AtomicU64,
}

/// Splits requests into tiles and runs one [`Channel`] per tile.
///
/// Every [`set_request`](Self::set_request) cancels all work of the previous
/// one first. Updates reach the receiver only while their channel still owns
/// its tile slot. Once the logical request is cancelled they go to
/// [`MapReceiver::map_dropped`] instead.
pub struct TiledChannel {
    shared: Arc<Shared>,
    tiler: Arc<dyn Tiler>,
    fetch: FetchContext,
    events: mpsc::UnboundedSender<TileEvent>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl TiledChannel {
    /// Creates a tiled channel using square tiles.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(receiver: Arc<dyn MapReceiver>, tiling: &TilingConfig, fetch: FetchContext) -> Self {
        Self::with_tiler(receiver, Arc::new(GridTiler::new(tiling.tile_pixels())), fetch)
    }

    pub fn with_tiler(receiver: Arc<dyn MapReceiver>, tiler: Arc<dyn Tiler>, fetch: FetchContext) -> Self {
        let (idle, _) = watch::channel(true);
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            receiver,
            idle,
            dropped: AtomicU64::new(0),
        });
        let (events, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        tokio::spawn(run_coordinator(Arc::clone(&shared), rx, shutdown.clone()));

        Self {
            shared,
            tiler,
            fetch,
            events,
            next_id: AtomicU64::new(1),
            shutdown,
        }
    }

    /// Replaces the current request.
    ///
    /// Cancels all active channels, then tiles `extent` and starts one
    /// channel per tile and pipeline, each with its own pipeline clone.
    /// Pipelines without legs are skipped. Returns the new generation.
    pub fn set_request(
        &self,
        projection: Projection,
        extent: Rect,
        ppd: f64,
        pipelines: &[Pipeline],
    ) -> Result<u64, ChannelError> {
        let mut state = self.shared.state.lock();
        state.cancel_all();
        state.generation += 1;
        state.layers.clear();
        state.requests.clear();
        let generation = state.generation;

        let requests = pipelines
            .iter()
            .map(|p| MapRequest::new(p.name(), extent, ppd, projection).map(Arc::new))
            .collect::<Result<Vec<_>, _>>();
        let requests = match requests {
            Ok(requests) => requests,
            Err(e) => {
                self.shared.idle.send_replace(true);
                return Err(e.into());
            }
        };

        // Every tile request is built before any channel starts, so a bad
        // tile leaves nothing running.
        let mut planned = Vec::new();
        for (layer, (pipeline, request)) in pipelines.iter().zip(&requests).enumerate() {
            state.layers.push(pipeline.name().to_string());
            state.requests.push(Arc::clone(request));

            if pipeline.legs().is_empty() {
                debug!(pipeline = pipeline.name(), "Skipping pipeline without legs");
                continue;
            }

            for key in self.tiler.tiles(&projection, &request.extent(), ppd) {
                let tile_extent = self.tiler.tile_extent(&projection, key, ppd);
                match MapRequest::new(pipeline.name(), tile_extent, ppd, projection) {
                    Ok(tile_request) => planned.push(((layer, key), pipeline, Arc::new(tile_request))),
                    Err(e) => {
                        warn!(pipeline = pipeline.name(), ?key, error = %e, "Tile request rejected");
                        for request in &state.requests {
                            request.cancel();
                        }
                        self.shared.idle.send_replace(true);
                        return Err(e.into());
                    }
                }
            }
        }

        for (slot, pipeline, tile_request) in planned {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let channel = Arc::new(Channel::new(id, tile_request, pipeline.clone(), self.fetch.clone()));
            state.active.insert(
                slot,
                ActiveChannel {
                    id,
                    channel: Arc::clone(&channel),
                },
            );
            self.spawn_channel(slot, channel);
        }

        info!(
            generation,
            extent = %extent,
            ppd,
            tiles = state.active.len(),
            "Request started"
        );
        self.shared.idle.send_replace(state.active.is_empty());
        Ok(generation)
    }

    fn spawn_channel(&self, slot: Slot, channel: Arc<Channel>) {
        let events = self.events.clone();
        tokio::spawn(async move {
            let id = channel.id();
            channel
                .run(move |data, finished| {
                    // The coordinator outlives every channel it is told about.
                    let _ = events.send(TileEvent {
                        slot,
                        channel: id,
                        data,
                        finished,
                    });
                })
                .await;
        });
    }

    /// Cancels all work. Safe to call repeatedly or with nothing active.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        if !state.active.is_empty() {
            debug!(channels = state.active.len(), "Cancelling tiled request");
        }
        state.cancel_all();
        self.shared.idle.send_replace(true);
    }

    /// Whether no tile channel is active.
    pub fn is_finished(&self) -> bool {
        self.shared.state.lock().active.is_empty()
    }

    /// Waits until no tile channel is active.
    pub async fn until_finished(&self) {
        let mut idle = self.shared.idle.subscribe();
        // The sender lives in `self`, so the wait cannot fail.
        let _ = idle.wait_for(|idle| *idle).await;
    }

    /// Number of active tile channels.
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().active.len()
    }

    pub fn generation(&self) -> u64 {
        self.shared.state.lock().generation
    }

    /// Logical request of pipeline `layer` in the current generation.
    pub fn current_request(&self, layer: usize) -> Option<Arc<MapRequest>> {
        self.shared.state.lock().requests.get(layer).cloned()
    }

    /// Updates discarded because their channel was superseded or their
    /// request cancelled.
    pub fn dropped_updates(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for TiledChannel {
    fn drop(&mut self) {
        self.shared.state.lock().cancel_all();
        self.shutdown.cancel();
    }
}

/// Routes channel updates to the receiver.
async fn run_coordinator(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<TileEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let (update, cancelled) = {
            let mut state = shared.state.lock();
            let owner = state.active.get(&event.slot).map(|a| a.id);
            if owner != Some(event.channel) {
                trace!(channel = event.channel, "Dropping update of superseded channel");
                shared.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            if event.finished {
                state.active.remove(&event.slot);
                if state.active.is_empty() {
                    shared.idle.send_replace(true);
                }
            }

            let (layer, _) = event.slot;
            let cancelled = state.requests[layer].is_cancelled();
            if cancelled {
                debug!(channel = event.channel, "Dropping update of cancelled request");
                shared.dropped.fetch_add(1, Ordering::Relaxed);
            }

            let update = MapUpdate {
                layer: state.layers[layer].clone(),
                generation: state.generation,
                data: event.data,
                finished: event.finished,
            };
            (update, cancelled)
        };

        if cancelled {
            shared.receiver.map_dropped(update);
        } else {
            shared.receiver.map_changed(update);
        }
    }
    debug!("Tile coordinator stopped");
}
