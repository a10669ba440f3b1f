//! Per-tile channel: fetch, run the pipeline, update map data.

use crate::config::FetchConfig;
use crate::data::MapData;
use crate::geo::RegionSet;
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::raster::Raster;
use crate::request::MapRequest;
use crate::source::{fetch_fuzzy, fetch_with_retry, FetchError, FetchWatcher};
use crate::tile::{MapTile, TileState};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

/// Fetch configuration plus the watcher shared by all channels.
#[derive(Clone)]
pub struct FetchContext {
    watcher: Arc<FetchWatcher>,
    config: FetchConfig,
}

impl FetchContext {
    pub fn new(config: FetchConfig) -> Self {
        Self {
            watcher: Arc::new(FetchWatcher::new(config.watch_interval())),
            config,
        }
    }

    pub fn with_watcher(config: FetchConfig, watcher: Arc<FetchWatcher>) -> Self {
        Self { watcher, config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn watcher(&self) -> &Arc<FetchWatcher> {
        &self.watcher
    }
}

impl Default for FetchContext {
    fn default() -> Self {
        Self::new(FetchConfig::default())
    }
}

enum FinalOutcome {
    Raster(Raster, RegionSet),
    Failed(String),
    Cancelled,
}

/// Drives one tile of one pipeline.
///
/// A fuzzy pass runs first if any source offers fuzzy data, then the final
/// pass. Every leg is fetched concurrently; a failure of any leg marks the
/// whole tile errored.
pub struct Channel {
    id: u64,
    request: Arc<MapRequest>,
    pipeline: Arc<Pipeline>,
    tile: Mutex<MapTile>,
    data: Mutex<MapData>,
    fetch: FetchContext,
}

impl Channel {
    /// Creates a channel for `request`, which must be private to it: the
    /// channel is cancelled by cancelling the request.
    ///
    /// The channel's map data covers the tile footprint shifted by the
    /// pipeline's nudge, so no nudged pixels are clipped at tile seams.
    pub fn new(id: u64, request: Arc<MapRequest>, pipeline: Pipeline, fetch: FetchContext) -> Self {
        let nudge = pipeline.nudge();
        let data_request = if nudge.is_zero() {
            Arc::clone(&request)
        } else {
            match request.with_extent(request.extent().translate(nudge.dx, nudge.dy)) {
                Ok(nudged) => Arc::new(nudged),
                Err(e) => {
                    warn!(error = %e, "Cannot shift tile by nudge");
                    Arc::clone(&request)
                }
            }
        };
        let data = MapData::new(data_request).with_nudge(nudge);
        Self {
            id,
            tile: Mutex::new(MapTile::new(Arc::clone(&request))),
            request,
            pipeline: Arc::new(pipeline),
            data: Mutex::new(data),
            fetch,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request(&self) -> &Arc<MapRequest> {
        &self.request
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Snapshot of the channel's map data.
    pub fn data(&self) -> MapData {
        self.data.lock().get_deep_copy()
    }

    pub fn state(&self) -> TileState {
        self.tile.lock().state()
    }

    /// Stops the channel; in-flight fetches are aborted by the watcher.
    pub fn cancel(&self) {
        self.request.cancel();
    }

    /// Runs the tile to completion, calling `notify(data, finished)` after
    /// each change.
    ///
    /// The last call has `finished` set. A cancelled channel stops without
    /// a finishing call.
    #[instrument(skip_all, fields(tile = %self.request, channel = self.id))]
    pub async fn run<F>(&self, notify: F)
    where
        F: Fn(Arc<MapData>, bool) + Send + Sync,
    {
        if self.request.is_cancelled() {
            return;
        }

        if let Some(output) = self.fuzzy_pass().await {
            let snapshot = {
                let mut tile = self.tile.lock();
                let mut data = self.data.lock();
                (tile.set_fuzzy_with_area(output.raster, Some(output.changed)) && data.add_tile(&tile))
                    .then(|| Arc::new(data.get_deep_copy()))
            };
            if let Some(data) = snapshot {
                notify(data, false);
            }
        }

        let outcome = self.final_pass().await;
        let snapshot = {
            let mut tile = self.tile.lock();
            let mut data = self.data.lock();
            match outcome {
                FinalOutcome::Cancelled => {
                    debug!("Channel cancelled");
                    return;
                }
                FinalOutcome::Raster(raster, changed) => {
                    tile.set_final_with_area(raster, Some(changed));
                    data.add_tile(&tile);
                }
                FinalOutcome::Failed(message) => {
                    warn!(error = %message, "Tile failed");
                    tile.set_error(message);
                    data.mark_errored(&self.request.extent());
                }
            }
            data.mark_finished();
            Arc::new(data.get_deep_copy())
        };
        notify(snapshot, true);
    }

    async fn fuzzy_pass(&self) -> Option<PipelineOutput> {
        let mut set = JoinSet::new();
        for (i, leg) in self.pipeline.legs().iter().enumerate() {
            let source = Arc::clone(leg.source());
            let request = self.request.with_source(source.id().clone());
            let ctx = self.fetch.clone();
            set.spawn(async move {
                let raster = fetch_fuzzy(source.as_ref(), &request, &ctx.watcher, &ctx.config).await;
                (i, raster)
            });
        }

        let mut inputs = vec![None; self.pipeline.legs().len()];
        while let Some(joined) = set.join_next().await {
            if let Ok((i, raster)) = joined {
                inputs[i] = raster;
            }
        }
        if inputs.iter().all(Option::is_none) || self.request.is_cancelled() {
            return None;
        }

        match self.execute(inputs).await {
            Ok(output) => Some(output),
            Err(message) => {
                debug!(error = %message, "Fuzzy pipeline failed");
                None
            }
        }
    }

    async fn final_pass(&self) -> FinalOutcome {
        let mut set = JoinSet::new();
        for (i, leg) in self.pipeline.legs().iter().enumerate() {
            let source = Arc::clone(leg.source());
            let request = self.request.with_source(source.id().clone());
            let ctx = self.fetch.clone();
            set.spawn(async move {
                let result = fetch_with_retry(source.as_ref(), &request, &ctx.watcher, &ctx.config).await;
                (i, result)
            });
        }

        let mut inputs = vec![None; self.pipeline.legs().len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((i, Ok(raster))) => inputs[i] = Some(raster),
                Ok((_, Err(FetchError::Cancelled))) => return FinalOutcome::Cancelled,
                Ok((i, Err(e))) => {
                    let source = self.pipeline.legs()[i].source().id();
                    return FinalOutcome::Failed(format!("{}: {}", source, e));
                }
                Err(e) => return FinalOutcome::Failed(format!("fetch task failed: {}", e)),
            }
        }
        if self.request.is_cancelled() {
            return FinalOutcome::Cancelled;
        }

        match self.execute(inputs).await {
            Ok(output) => FinalOutcome::Raster(output.raster, output.changed),
            Err(message) => FinalOutcome::Failed(message),
        }
    }

    /// Runs the pipeline on the blocking pool.
    async fn execute(&self, inputs: Vec<Option<Raster>>) -> Result<PipelineOutput, String> {
        let pipeline = Arc::clone(&self.pipeline);
        let output = tokio::task::spawn_blocking(move || pipeline.execute(inputs))
            .await
            .map_err(|e| format!("pipeline task failed: {}", e))?
            .map_err(|e| e.to_string())?;

        if !output.dropped_legs.is_empty() {
            debug!(dropped = ?output.dropped_legs, "Legs dropped from tile");
        }
        Ok(output)
    }
}
