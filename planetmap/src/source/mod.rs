//! Map sources and the tile fetch substrate.
//!
//! A [`MapSource`] fetches the raster for one [`MapRequest`]. Fetching is
//! cooperative: sources race their network call against an abort token that
//! the shared [`FetchWatcher`] cancels once the request's owner is cancelled.
//! [`fetch_with_retry`] adds retries with exponential backoff on top.

mod error;
mod fetch;
mod http;
mod watch;
mod wms;

pub use error::{status_error, FetchError, HttpError};
pub use fetch::{fetch_fuzzy, fetch_with_retry};
pub use http::{HttpClient, HttpResponse, ReqwestHttpClient};
pub use watch::{FetchWatcher, WatchGuard, DEFAULT_WATCH_INTERVAL};
pub use wms::{WmsLayer, WmsSource, SERVICE_EXCEPTION_TYPE};

#[cfg(test)]
pub(crate) use http::mock::MockHttpClient;

use crate::geo::Offset;
use crate::raster::{Raster, RasterShape};
use crate::request::{MapRequest, SourceId};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// A source of map rasters.
pub trait MapSource: Send + Sync {
    /// Name of the source, as used in requests.
    fn id(&self) -> &SourceId;

    /// Shape of the rasters this source produces.
    fn shape(&self) -> RasterShape;

    /// World offset applied when placing this source's tiles.
    fn nudge(&self) -> Offset {
        Offset::ZERO
    }

    /// Fetches the raster for `request`.
    ///
    /// Implementations must stop and return [`FetchError::Cancelled`] promptly
    /// once `abort` is cancelled.
    fn fetch_tile<'a>(
        &'a self,
        request: &'a MapRequest,
        abort: CancellationToken,
    ) -> BoxFuture<'a, Result<Raster, FetchError>>;

    /// Fetches lower-confidence data to show before the final raster, if the
    /// source has any.
    fn fetch_fuzzy<'a>(
        &'a self,
        request: &'a MapRequest,
        abort: CancellationToken,
    ) -> BoxFuture<'a, Result<Option<Raster>, FetchError>> {
        let _ = (request, abort);
        Box::pin(async { Ok(None) })
    }
}
