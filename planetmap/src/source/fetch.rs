//! Retrying tile fetch.

use super::{FetchError, FetchWatcher, MapSource};
use crate::config::FetchConfig;
use crate::raster::Raster;
use crate::request::MapRequest;
use tracing::{debug, instrument, warn};

/// Fetches the raster for `request`, retrying retryable failures.
///
/// Each attempt registers with `watcher` under the request's cancellation
/// token and is bounded by the configured timeout; a timeout is not retried.
/// Retryable failures back off exponentially, and cancellation is observed
/// during the backoff.
#[instrument(skip_all, fields(tile = %request))]
pub async fn fetch_with_retry(
    source: &dyn MapSource,
    request: &MapRequest,
    watcher: &FetchWatcher,
    config: &FetchConfig,
) -> Result<Raster, FetchError> {
    let owner = request.cancellation_token();
    let max_retries = config.max_retries();
    let mut last_error = FetchError::Cancelled;

    for attempt in 1..=max_retries {
        if owner.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let guard = watcher.watch(owner.clone());
        let result = tokio::time::timeout(
            config.request_timeout(),
            source.fetch_tile(request, guard.connection().clone()),
        )
        .await;
        drop(guard);

        let error = match result {
            Ok(Ok(raster)) => return Ok(raster),
            Ok(Err(e)) => e,
            Err(_) => FetchError::NonRetryable(format!(
                "timed out after {}ms",
                config.request_timeout().as_millis()
            )),
        };

        if error.is_cancelled() || owner.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if !error.is_retryable() {
            warn!(attempt, error = %error, "Fetch failed");
            return Err(error);
        }

        debug!(attempt, max_retries, error = %error, "Fetch attempt failed");
        last_error = error;

        if attempt < max_retries {
            tokio::select! {
                biased;
                _ = owner.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(config.backoff(attempt)) => {}
            }
        }
    }

    warn!(attempts = max_retries, error = %last_error, "Fetch failed after retries");
    Err(last_error)
}

/// Fetches fuzzy data for `request`, once and without retries.
///
/// Failures are logged and reported as no data.
pub async fn fetch_fuzzy(
    source: &dyn MapSource,
    request: &MapRequest,
    watcher: &FetchWatcher,
    config: &FetchConfig,
) -> Option<Raster> {
    let guard = watcher.watch(request.cancellation_token());
    let result = tokio::time::timeout(
        config.request_timeout(),
        source.fetch_fuzzy(request, guard.connection().clone()),
    )
    .await;

    match result {
        Ok(Ok(raster)) => raster,
        Ok(Err(FetchError::Cancelled)) => None,
        Ok(Err(e)) => {
            debug!(source = %request.source(), error = %e, "Fuzzy fetch failed");
            None
        }
        Err(_) => None,
    }
}
