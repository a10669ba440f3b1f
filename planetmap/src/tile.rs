//! Outcome of fetching and processing one tile.

use crate::geo::RegionSet;
use crate::raster::Raster;
use crate::request::MapRequest;
use std::sync::Arc;

/// Lifecycle of a tile's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Empty,
    Fuzzy,
    Final,
}

/// Holder for one tile's outcome.
///
/// A tile moves from no data to fuzzy data to final data. Once the final
/// raster is set it is never replaced and fuzzy data is ignored. The error is
/// recorded independently of the data state.
///
/// Each raster may come with the region, in its own pixel coordinates, that
/// processing actually wrote. Without one the whole raster counts.
#[derive(Debug, Clone)]
pub struct MapTile {
    request: Arc<MapRequest>,
    fuzzy: Option<Raster>,
    final_raster: Option<Raster>,
    changed: Option<RegionSet>,
    error: Option<String>,
}

impl MapTile {
    pub fn new(request: Arc<MapRequest>) -> Self {
        Self {
            request,
            fuzzy: None,
            final_raster: None,
            changed: None,
            error: None,
        }
    }

    pub fn request(&self) -> &Arc<MapRequest> {
        &self.request
    }

    pub fn state(&self) -> TileState {
        if self.final_raster.is_some() {
            TileState::Final
        } else if self.fuzzy.is_some() {
            TileState::Fuzzy
        } else {
            TileState::Empty
        }
    }

    /// Stores fuzzy data. Returns `false` (and drops `raster`) once final
    /// data exists.
    pub fn set_fuzzy(&mut self, raster: Raster) -> bool {
        self.set_fuzzy_with_area(raster, None)
    }

    /// Stores fuzzy data of which only `changed` was written.
    pub fn set_fuzzy_with_area(&mut self, raster: Raster, changed: Option<RegionSet>) -> bool {
        if self.final_raster.is_some() {
            return false;
        }
        self.fuzzy = Some(raster);
        self.changed = changed;
        true
    }

    /// Stores final data. Returns `false` if final data was already set; the
    /// first final raster is kept.
    pub fn set_final(&mut self, raster: Raster) -> bool {
        self.set_final_with_area(raster, None)
    }

    /// Stores final data of which only `changed` was written.
    pub fn set_final_with_area(&mut self, raster: Raster, changed: Option<RegionSet>) -> bool {
        if self.final_raster.is_some() {
            return false;
        }
        self.final_raster = Some(raster);
        self.fuzzy = None;
        self.changed = changed;
        true
    }

    /// Written region of [`Self::raster`] in its pixel coordinates; `None`
    /// means all of it.
    pub fn changed_area(&self) -> Option<&RegionSet> {
        self.changed.as_ref()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_final(&self) -> bool {
        self.final_raster.is_some()
    }

    pub fn fuzzy(&self) -> Option<&Raster> {
        self.fuzzy.as_ref()
    }

    pub fn final_raster(&self) -> Option<&Raster> {
        self.final_raster.as_ref()
    }

    /// The best raster available: final if present, else fuzzy.
    pub fn raster(&self) -> Option<&Raster> {
        self.final_raster.as_ref().or(self.fuzzy.as_ref())
    }
}
