//! Sources and helpers shared by the channel tests.

use crate::geo::{Offset, Projection, Rect};
use crate::pipeline::{Pipeline, StageRegistry};
use crate::raster::{Raster, RasterShape};
use crate::request::{MapRequest, SourceId};
use crate::source::{FetchError, MapSource};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A source serving uniform rasters.
pub(crate) struct FixedSource {
    id: SourceId,
    shape: RasterShape,
    value: f64,
    fuzzy: Option<f64>,
    failure: Option<FetchError>,
    gate: Option<Arc<Notify>>,
    nudge: Offset,
    pub fetches: AtomicUsize,
}

impl FixedSource {
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            id: SourceId::new(name),
            shape: RasterShape::GRAY8,
            value,
            fuzzy: None,
            failure: None,
            gate: None,
            nudge: Offset::ZERO,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_shape(mut self, shape: RasterShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_fuzzy(mut self, value: f64) -> Self {
        self.fuzzy = Some(value);
        self
    }

    pub fn with_nudge(mut self, nudge: Offset) -> Self {
        self.nudge = nudge;
        self
    }

    pub fn failing(mut self, error: FetchError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Final fetches wait until the gate is opened or the fetch is aborted.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Notify::new()));
        self
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    fn raster(&self, request: &MapRequest, value: f64) -> Raster {
        let values = vec![value; self.shape.bands as usize];
        Raster::filled(request.width(), request.height(), self.shape, &values)
    }
}

impl MapSource for FixedSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn shape(&self) -> RasterShape {
        self.shape
    }

    fn nudge(&self) -> Offset {
        self.nudge
    }

    fn fetch_tile<'a>(
        &'a self,
        request: &'a MapRequest,
        abort: CancellationToken,
    ) -> BoxFuture<'a, Result<Raster, FetchError>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                tokio::select! {
                    _ = abort.cancelled() => return Err(FetchError::Cancelled),
                    _ = gate.notified() => {}
                }
            }
            match &self.failure {
                Some(error) => Err(error.clone()),
                None => Ok(self.raster(request, self.value)),
            }
        })
    }

    fn fetch_fuzzy<'a>(
        &'a self,
        request: &'a MapRequest,
        _abort: CancellationToken,
    ) -> BoxFuture<'a, Result<Option<Raster>, FetchError>> {
        let raster = self.fuzzy.map(|v| self.raster(request, v));
        Box::pin(async move { Ok(raster) })
    }
}

/// One-leg pipeline over `source`.
pub(crate) fn gray_pipeline(source: Arc<FixedSource>) -> Pipeline {
    let source: Arc<dyn MapSource> = source;
    Pipeline::for_source(&StageRegistry::standard(), source).unwrap()
}

/// A 4 × 4 pixel request covering one square degree.
pub(crate) fn tile_request() -> Arc<MapRequest> {
    let extent = Rect::new(0.0, -1.0, 1.0, 0.0);
    Arc::new(MapRequest::new("tile", extent, 4.0, Projection::unrotated()).unwrap())
}
