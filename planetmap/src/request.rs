//! Map request types.
//!
//! A [`MapRequest`] identifies one canonical, pixel-aligned piece of a map:
//! which source, which extent, at what resolution and in which projection.
//! It also carries a cancellation flag that any thread may set once.
//!
//! # Example
//!
//! ```
//! use planetmap::geo::{Projection, Rect};
//! use planetmap::request::MapRequest;
//!
//! let request = MapRequest::new("mola", Rect::new(0.1, 0.1, 0.9, 0.9), 4.0, Projection::unrotated())?;
//! assert_eq!(request.extent(), Rect::new(0.0, 0.0, 1.0, 1.0));
//! assert_eq!((request.width(), request.height()), (4, 4));
//! # Ok::<(), planetmap::request::RequestError>(())
//! ```

use crate::geo::{PixelRect, Projection, Rect};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Name of a logical map source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Arc<str>);

impl SourceId {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SourceId {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors constructing a request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("resolution must be a positive finite number of pixels per degree, got {0}")]
    InvalidResolution(f64),

    #[error("extent {0} is not finite")]
    InvalidExtent(Rect),
}

/// An immutable request for one extent of one source.
///
/// Equality and hashing are structural over source, pixel-aligned extent,
/// resolution and projection; the cancellation flag does not take part.
/// Clones share the cancellation flag.
#[derive(Debug, Clone)]
pub struct MapRequest {
    source: SourceId,
    requested: Rect,
    pixels: PixelRect,
    ppd: f64,
    projection: Projection,
    cancel: CancellationToken,
}

impl MapRequest {
    /// Creates a request, rounding `extent` outward to the pixel grid.
    ///
    /// The stored extent always contains `extent` and is at least one pixel
    /// wide and tall.
    pub fn new(
        source: impl Into<SourceId>,
        extent: Rect,
        ppd: f64,
        projection: Projection,
    ) -> Result<Self, RequestError> {
        if !(ppd.is_finite() && ppd > 0.0) {
            return Err(RequestError::InvalidResolution(ppd));
        }
        if !extent.is_finite() {
            return Err(RequestError::InvalidExtent(extent));
        }

        Ok(Self {
            source: source.into(),
            requested: extent,
            pixels: PixelRect::outward(&extent, ppd),
            ppd,
            projection,
            cancel: CancellationToken::new(),
        })
    }

    /// A new request for another extent of the same source, resolution and
    /// projection, with its own cancellation flag.
    pub fn with_extent(&self, extent: Rect) -> Result<Self, RequestError> {
        Self::new(self.source.clone(), extent, self.ppd, self.projection)
    }

    /// The same extent for another source. Shares the cancellation flag, so
    /// cancelling either cancels both.
    pub fn with_source(&self, source: impl Into<SourceId>) -> Self {
        Self {
            source: source.into(),
            ..self.clone()
        }
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// The pixel-aligned extent.
    pub fn extent(&self) -> Rect {
        self.pixels.to_world(self.ppd)
    }

    /// The extent originally asked for.
    pub fn requested_extent(&self) -> Rect {
        self.requested
    }

    /// The extent as global pixel indices.
    pub fn pixel_rect(&self) -> PixelRect {
        self.pixels
    }

    /// Resolution in pixels per degree.
    pub fn ppd(&self) -> f64 {
        self.ppd
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn width(&self) -> u32 {
        self.pixels.width() as u32
    }

    pub fn height(&self) -> u32 {
        self.pixels.height() as u32
    }

    /// Marks the request cancelled. Idempotent and safe from any thread.
    ///
    /// Cancellation is advisory: work in flight observes it by polling
    /// [`Self::is_cancelled`] or by waiting on [`Self::cancellation_token`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl PartialEq for MapRequest {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.pixels == other.pixels
            && self.ppd.to_bits() == other.ppd.to_bits()
            && self.projection == other.projection
    }
}

impl Eq for MapRequest {}

impl Hash for MapRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.pixels.hash(state);
        self.ppd.to_bits().hash(state);
        self.projection.hash(state);
    }
}

impl fmt::Display for MapRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {} ppd ({})",
            self.source,
            self.extent(),
            self.ppd,
            self.projection
        )
    }
}
