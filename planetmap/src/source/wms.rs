//! WMS GetMap map source.

use super::error::status_error;
use super::http::{HttpClient, HttpResponse, ReqwestHttpClient};
use super::{FetchError, MapSource};
use crate::geo::Offset;
use crate::raster::{decode_bil, decode_image, Raster, RasterShape, SampleType};
use crate::request::{MapRequest, SourceId};
use futures::future::BoxFuture;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Content type of a structured WMS service error.
pub const SERVICE_EXCEPTION_TYPE: &str = "application/vnd.ogc.se_xml";

/// Media type prefix of raw band-interleaved elevation payloads.
const BIL_PREFIX: &str = "application/bil";

/// Longest excerpt of an unparseable service error kept in messages.
const EXCERPT_LEN: usize = 200;

/// Matches the code and text of a `<ServiceException>` element.
fn service_exception_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(ServiceException\s+code\s*=\s*"[^"]*")\s*>\s*([^<]*)"#).unwrap()
    })
}

/// Builds the error message for a service exception document.
fn service_exception_message(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match service_exception_pattern().captures(&text) {
        Some(caps) => {
            let detail = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            if detail.is_empty() {
                format!("WMS service error: {}", &caps[1])
            } else {
                format!("WMS service error: {}: {}", &caps[1], detail)
            }
        }
        None => {
            let excerpt: String = text.chars().take(EXCERPT_LEN).collect();
            format!("WMS service error: {}", excerpt.trim())
        }
    }
}

/// Layer parameters of a WMS source.
#[derive(Debug, Clone, PartialEq)]
pub struct WmsLayer {
    /// Value of the `LAYERS` parameter.
    pub layers: String,
    /// Value of the `FORMAT` parameter.
    pub format: String,
    pub styles: String,
    pub version: String,
    /// Shape rasters are delivered in.
    pub shape: RasterShape,
    pub nudge: Offset,
}

/// A map source backed by one WMS layer.
pub struct WmsSource<C = ReqwestHttpClient> {
    id: SourceId,
    endpoint: String,
    layer: WmsLayer,
    client: Arc<C>,
}

impl<C: HttpClient> WmsSource<C> {
    pub fn new(id: impl Into<SourceId>, endpoint: impl Into<String>, layer: WmsLayer, client: Arc<C>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            layer,
            client,
        }
    }

    pub fn layer(&self) -> &WmsLayer {
        &self.layer
    }

    /// GetMap URL for `request`.
    pub fn get_map_url(&self, request: &MapRequest) -> Result<String, FetchError> {
        let extent = request.extent();
        let bbox = format!(
            "{},{},{},{}",
            extent.min_x, extent.min_y, extent.max_x, extent.max_y
        );
        let width = request.width().to_string();
        let height = request.height().to_string();
        let srs = request.projection().srs();

        let params = [
            ("SERVICE", "WMS"),
            ("REQUEST", "GetMap"),
            ("FORMAT", self.layer.format.as_str()),
            ("SRS", srs.as_str()),
            ("STYLES", self.layer.styles.as_str()),
            ("VERSION", self.layer.version.as_str()),
            ("LAYERS", self.layer.layers.as_str()),
            ("WIDTH", width.as_str()),
            ("HEIGHT", height.as_str()),
            ("BBOX", bbox.as_str()),
        ];

        reqwest::Url::parse_with_params(&self.endpoint, &params)
            .map(String::from)
            .map_err(|e| FetchError::NonRetryable(format!("malformed URL '{}': {}", self.endpoint, e)))
    }

    /// Turns a GetMap response into a raster of the layer's shape.
    fn decode_response(
        &self,
        request: &MapRequest,
        response: HttpResponse,
        url: &str,
    ) -> Result<Raster, FetchError> {
        let media_type = response.media_type().unwrap_or_default();

        if media_type == SERVICE_EXCEPTION_TYPE {
            return Err(FetchError::NonRetryable(service_exception_message(&response.body)));
        }
        if !response.is_success() {
            return Err(status_error(response.status, url));
        }

        let raster = if let Some(bits) = media_type.strip_prefix(BIL_PREFIX) {
            let bits = match bits {
                "" | "16" => 16,
                "32" => 32,
                other => {
                    return Err(FetchError::NonRetryable(format!(
                        "unsupported content type '{}{}'",
                        BIL_PREFIX, other
                    )))
                }
            };
            decode_bil(&response.body, request.width(), request.height(), bits)
                .map_err(|e| FetchError::Retryable(e.to_string()))?
        } else if media_type.starts_with("image/") {
            decode_image(&response.body).map_err(|e| FetchError::Retryable(e.to_string()))?
        } else {
            return Err(FetchError::NonRetryable(format!(
                "unexpected content type '{}' from {}",
                media_type, url
            )));
        };

        if raster.width() < request.width() || raster.height() < request.height() {
            return Err(FetchError::Retryable(format!(
                "undersized image {}x{}, expected {}x{}",
                raster.width(),
                raster.height(),
                request.width(),
                request.height()
            )));
        }

        self.conform(raster)
    }

    /// Brings a decoded raster to the layer's declared shape.
    fn conform(&self, raster: Raster) -> Result<Raster, FetchError> {
        let shape = self.layer.shape;
        if raster.shape() == shape {
            return Ok(raster);
        }
        if shape.sample == SampleType::U8 {
            if let Some(converted) = raster.to_u8_bands(shape.bands) {
                return Ok(converted);
            }
        }
        Err(FetchError::NonRetryable(format!(
            "server delivered {} rasters, layer expects {}",
            raster.shape(),
            shape
        )))
    }
}

impl<C: HttpClient + 'static> MapSource for WmsSource<C> {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn shape(&self) -> RasterShape {
        self.layer.shape
    }

    fn nudge(&self) -> Offset {
        self.layer.nudge
    }

    fn fetch_tile<'a>(
        &'a self,
        request: &'a MapRequest,
        abort: CancellationToken,
    ) -> BoxFuture<'a, Result<Raster, FetchError>> {
        Box::pin(async move {
            let url = self.get_map_url(request)?;
            trace!(source = %self.id, url = %url, "GetMap");

            let response = tokio::select! {
                biased;
                _ = abort.cancelled() => {
                    debug!(source = %self.id, "GetMap aborted");
                    return Err(FetchError::Cancelled);
                }
                response = self.client.get(&url) => response?,
            };

            self.decode_response(request, response, &url)
        })
    }
}
