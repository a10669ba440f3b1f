//! Composition of per-tile updates into one map per layer.

use crate::channel::{MapReceiver, MapUpdate};
use crate::data::MapData;
use crate::geo::{Projection, Rect};
use crate::request::MapRequest;
use image::RgbaImage;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy)]
struct View {
    projection: Projection,
    extent: Rect,
    ppd: f64,
}

struct Layer {
    data: MapData,
    finished_tiles: usize,
    errored_tiles: usize,
}

struct State {
    view: View,
    generation: u64,
    layers: BTreeMap<String, Layer>,
    updates: u64,
}

/// Per-layer progress of the current generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerProgress {
    pub finished_tiles: usize,
    pub errored_tiles: usize,
}

/// A receiver keeping one continuous [`MapData`] per layer.
///
/// Updates of a newer generation discard everything composed so far;
/// updates of an older one are ignored.
pub struct LayerComposer {
    state: Mutex<State>,
}

impl LayerComposer {
    pub fn new(projection: Projection, extent: Rect, ppd: f64) -> Self {
        Self {
            state: Mutex::new(State {
                view: View {
                    projection,
                    extent,
                    ppd,
                },
                generation: 0,
                layers: BTreeMap::new(),
                updates: 0,
            }),
        }
    }

    /// Changes the composed view and discards the current layers.
    pub fn set_view(&self, projection: Projection, extent: Rect, ppd: f64) {
        let mut state = self.state.lock();
        state.view = View {
            projection,
            extent,
            ppd,
        };
        state.layers.clear();
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Number of updates merged so far.
    pub fn update_count(&self) -> u64 {
        self.state.lock().updates
    }

    /// Names of the layers with data, in order.
    pub fn layers(&self) -> Vec<String> {
        self.state.lock().layers.keys().cloned().collect()
    }

    /// Snapshot of a layer's composed data.
    pub fn layer(&self, name: &str) -> Option<MapData> {
        self.state.lock().layers.get(name).map(|l| l.data.get_deep_copy())
    }

    pub fn progress(&self, name: &str) -> Option<LayerProgress> {
        self.state.lock().layers.get(name).map(|l| LayerProgress {
            finished_tiles: l.finished_tiles,
            errored_tiles: l.errored_tiles,
        })
    }

    /// Marks every layer finished; call once the channel reports done.
    pub fn mark_finished(&self) {
        for layer in self.state.lock().layers.values_mut() {
            layer.data.mark_finished();
        }
    }

    pub fn render(&self, name: &str) -> Option<RgbaImage> {
        self.state.lock().layers.get(name).map(|l| l.data.render_rgba())
    }
}

impl MapReceiver for LayerComposer {
    fn map_changed(&self, update: MapUpdate) {
        let mut state = self.state.lock();
        if update.generation < state.generation {
            trace!(
                layer = %update.layer,
                generation = update.generation,
                current = state.generation,
                "Ignoring stale update"
            );
            return;
        }
        if update.generation > state.generation {
            debug!(generation = update.generation, "New generation, discarding composed layers");
            state.generation = update.generation;
            state.layers.clear();
        }

        let view = state.view;
        if !state.layers.contains_key(&update.layer) {
            match MapRequest::new(update.layer.as_str(), view.extent, view.ppd, view.projection) {
                Ok(request) => {
                    let layer = Layer {
                        data: MapData::new(Arc::new(request)),
                        finished_tiles: 0,
                        errored_tiles: 0,
                    };
                    state.layers.insert(update.layer.clone(), layer);
                }
                Err(e) => {
                    warn!(layer = %update.layer, error = %e, "Cannot compose layer");
                    return;
                }
            }
        }

        state.updates += 1;
        let Some(layer) = state.layers.get_mut(&update.layer) else {
            return;
        };
        layer.data.merge_from(&update.data);
        if update.finished {
            layer.finished_tiles += 1;
            if !update.data.errored_area().is_empty() {
                layer.errored_tiles += 1;
            }
        }
    }
}
