//! Integration tests for tiled channels.
//!
//! These tests drive the public channel API end to end:
//! - Tile completion and error reporting through a composing receiver
//! - Dropping of updates for cancelled requests
//! - Cancellation and reuse of a tiled channel
//! - Coalescing of rapid view changes

use futures::future::BoxFuture;
use parking_lot::Mutex;
use planetmap::channel::{
    FetchContext, MapReceiver, MapUpdate, RunMode, ThrottledChannel, TiledChannel,
};
use planetmap::compose::LayerComposer;
use planetmap::config::{FetchConfig, ThrottleConfig, TilingConfig};
use planetmap::data::MapData;
use planetmap::geo::{Projection, Rect, RegionSet};
use planetmap::pipeline::{Pipeline, StageRegistry};
use planetmap::raster::{Raster, RasterShape};
use planetmap::request::{MapRequest, SourceId};
use planetmap::source::{FetchError, MapSource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Helpers
// =============================================================================

const PPD: f64 = 16.0;

/// Tile A of the two-tile request.
const TILE_A: Rect = Rect {
    min_x: 0.0,
    min_y: -1.0,
    max_x: 1.0,
    max_y: 0.0,
};

/// Two degrees wide: two 16 px tiles side by side at 16 ppd.
fn two_tiles() -> Rect {
    Rect::new(0.0, -1.0, 2.0, 0.0)
}

fn tiling() -> TilingConfig {
    TilingConfig::new().with_tile_pixels(16)
}

fn single_attempt() -> FetchContext {
    FetchContext::new(FetchConfig::default().with_max_retries(1))
}

/// Serves uniform gray tiles, failing east of `fail_from_x`.
struct GraySource {
    id: SourceId,
    value: f64,
    fuzzy: Option<f64>,
    fail_from_x: Option<f64>,
    gate: Option<Arc<Notify>>,
}

impl GraySource {
    fn new(name: &str, value: f64) -> Self {
        Self {
            id: SourceId::new(name),
            value,
            fuzzy: None,
            fail_from_x: None,
            gate: None,
        }
    }
}

impl MapSource for GraySource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn shape(&self) -> RasterShape {
        RasterShape::GRAY8
    }

    fn fetch_tile<'a>(
        &'a self,
        request: &'a MapRequest,
        abort: CancellationToken,
    ) -> BoxFuture<'a, Result<Raster, FetchError>> {
        Box::pin(async move {
            if let Some(gate) = &self.gate {
                tokio::select! {
                    _ = abort.cancelled() => return Err(FetchError::Cancelled),
                    _ = gate.notified() => {}
                }
            }
            if let Some(x) = self.fail_from_x {
                if request.extent().min_x >= x {
                    return Err(FetchError::NonRetryable("HTTP 404".to_string()));
                }
            }
            Ok(Raster::filled(
                request.width(),
                request.height(),
                RasterShape::GRAY8,
                &[self.value],
            ))
        })
    }

    fn fetch_fuzzy<'a>(
        &'a self,
        request: &'a MapRequest,
        _abort: CancellationToken,
    ) -> BoxFuture<'a, Result<Option<Raster>, FetchError>> {
        let raster = self
            .fuzzy
            .map(|v| Raster::filled(request.width(), request.height(), RasterShape::GRAY8, &[v]));
        Box::pin(async move { Ok(raster) })
    }
}

fn pipeline(source: GraySource) -> Pipeline {
    Pipeline::for_source(&StageRegistry::standard(), Arc::new(source)).unwrap()
}

/// Counts updates and forwards them to a composer.
struct CountingComposer {
    composer: LayerComposer,
    calls: AtomicUsize,
    updates: Mutex<Vec<MapUpdate>>,
    dropped: Mutex<Vec<MapUpdate>>,
}

impl CountingComposer {
    fn new(extent: Rect) -> Arc<Self> {
        Arc::new(Self {
            composer: LayerComposer::new(Projection::unrotated(), extent, PPD),
            calls: AtomicUsize::new(0),
            updates: Mutex::new(Vec::new()),
            dropped: Mutex::new(Vec::new()),
        })
    }
}

impl MapReceiver for CountingComposer {
    fn map_changed(&self, update: MapUpdate) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.updates.lock().push(update.clone());
        self.composer.map_changed(update);
    }

    fn map_dropped(&self, update: MapUpdate) {
        self.dropped.lock().push(update);
    }
}

async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_final_and_errored_tiles_compose() {
    let receiver = CountingComposer::new(two_tiles());
    let tiled = TiledChannel::new(receiver.clone(), &tiling(), single_attempt());
    let source = GraySource {
        fail_from_x: Some(1.0),
        ..GraySource::new("base", 120.0)
    };

    tiled
        .set_request(Projection::unrotated(), two_tiles(), PPD, &[pipeline(source)])
        .unwrap();
    tiled.until_finished().await;
    eventually(|| receiver.calls.load(Ordering::SeqCst) == 2).await;

    assert!(tiled.is_finished());
    assert_eq!(receiver.calls.load(Ordering::SeqCst), 2);

    let composed = receiver.composer.layer("base").unwrap();
    assert!(composed
        .finished_area()
        .is_equivalent(&RegionSet::from_rect(TILE_A)));
    assert!(composed.errored_area().covers(&Rect::new(1.0, -1.0, 2.0, 0.0)));
}

#[tokio::test]
async fn test_cancelled_request_drops_final_update() {
    let receiver = CountingComposer::new(TILE_A);
    let tiled = TiledChannel::new(receiver.clone(), &tiling(), single_attempt());
    let gate = Arc::new(Notify::new());
    let source = GraySource {
        fuzzy: Some(10.0),
        gate: Some(Arc::clone(&gate)),
        ..GraySource::new("base", 200.0)
    };

    tiled
        .set_request(Projection::unrotated(), TILE_A, PPD, &[pipeline(source)])
        .unwrap();
    eventually(|| receiver.calls.load(Ordering::SeqCst) == 1).await;
    assert!(!receiver.updates.lock()[0].finished);

    tiled.current_request(0).unwrap().cancel();
    gate.notify_one();
    tiled.until_finished().await;
    eventually(|| receiver.dropped.lock().len() == 1).await;

    assert_eq!(tiled.dropped_updates(), 1);
    assert_eq!(receiver.calls.load(Ordering::SeqCst), 1);
    assert!(tiled.is_finished());

    // The tile finished its final fetch even though nobody was shown it.
    let dropped = receiver.dropped.lock()[0].clone();
    assert!(dropped.finished);
    assert!(dropped.data.finished_area().covers(&TILE_A));
    let raster = dropped.data.raster().unwrap();
    assert_eq!(raster.sample(0, 0, 0), 200.0);
}

#[tokio::test]
async fn test_cancel_twice_then_reuse() {
    let receiver = CountingComposer::new(two_tiles());
    let tiled = TiledChannel::new(receiver.clone(), &tiling(), single_attempt());

    tiled.cancel();
    tiled.cancel();
    assert!(tiled.is_finished());

    let gate = Arc::new(Notify::new());
    let slow = GraySource {
        gate: Some(Arc::clone(&gate)),
        ..GraySource::new("slow", 1.0)
    };
    tiled
        .set_request(Projection::unrotated(), two_tiles(), PPD, &[pipeline(slow)])
        .unwrap();
    assert!(!tiled.is_finished());

    tiled.cancel();
    tiled.cancel();
    assert!(tiled.is_finished());
    assert_eq!(tiled.active_count(), 0);

    tiled
        .set_request(
            Projection::unrotated(),
            two_tiles(),
            PPD,
            &[pipeline(GraySource::new("base", 5.0))],
        )
        .unwrap();
    tiled.until_finished().await;
    eventually(|| receiver.composer.layer("base").is_some_and(|d| d.finished_area().covers(&two_tiles()))).await;
}

#[tokio::test]
async fn test_throttled_channel_settles_on_latest_view() {
    let receiver = CountingComposer::new(two_tiles());
    let tiled = Arc::new(TiledChannel::new(receiver.clone(), &tiling(), single_attempt()));
    let config = ThrottleConfig::new().with_window(Duration::from_millis(50));
    let throttled = ThrottledChannel::new(Arc::clone(&tiled), &config);
    let layers = vec![pipeline(GraySource::new("base", 64.0))];

    for i in 0..10 {
        let extent = Rect::new(0.0, -1.0, 1.0 + (i % 2) as f64, 0.0);
        throttled.set_request(Projection::unrotated(), extent, PPD, layers.clone(), RunMode::Deferred);
    }
    assert!(!throttled.is_finished());

    eventually(|| throttled.is_finished() && tiled.generation() > 0).await;
    assert!(tiled.generation() <= 2);

    // The last view requested was two tiles wide.
    let request = tiled.current_request(0).unwrap();
    assert_eq!(request.extent(), two_tiles());
}

#[test]
fn test_convert_to_identical_request_is_same_object() {
    let request = Arc::new(MapRequest::new("base", TILE_A, PPD, Projection::unrotated()).unwrap());
    let data = Arc::new(MapData::new(Arc::clone(&request)));
    let same = MapRequest::new("base", TILE_A, PPD, Projection::unrotated()).unwrap();

    let converted = data.convert_to_request(Arc::new(same));

    assert!(Arc::ptr_eq(&data, &converted));
}
