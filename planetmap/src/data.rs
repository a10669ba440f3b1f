//! Per-source raster accumulation.
//!
//! [`MapData`] is bound to one [`MapRequest`] and collects tile rasters into a
//! single raster covering the request extent. Two region sets record which
//! parts hold finished and fuzzy data; a third records where tiles failed so
//! renderers can show the error fill.
//!
//! A pixel only ever moves from unset to fuzzy to finished. Finished pixels
//! are never overwritten by fuzzy data.

use crate::geo::{Offset, PixelRect, Rect, RegionSet};
use crate::raster::Raster;
use crate::request::MapRequest;
use crate::tile::MapTile;
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Fill colors for pixels covered by failed tiles.
const ERROR_FILL: [Rgba<u8>; 2] = [Rgba([255, 0, 255, 255]), Rgba([0, 0, 0, 255])];

/// Edge length of one error-fill checker square, in pixels.
const ERROR_CHECKER: i64 = 8;

/// Relative aspect difference above which a tile is reported as distorted.
const ASPECT_TOLERANCE: f64 = 0.01;

/// Raster accumulator for one request.
#[derive(Debug, Clone)]
pub struct MapData {
    request: Arc<MapRequest>,
    raster: Option<Raster>,
    finished_area: RegionSet,
    fuzzy_area: RegionSet,
    errored_area: RegionSet,
    finished: bool,
    nudge: Offset,
}

impl MapData {
    pub fn new(request: Arc<MapRequest>) -> Self {
        Self {
            request,
            raster: None,
            finished_area: RegionSet::new(),
            fuzzy_area: RegionSet::new(),
            errored_area: RegionSet::new(),
            finished: false,
            nudge: Offset::ZERO,
        }
    }

    /// Sets the offset applied to every tile footprint before placement.
    pub fn with_nudge(mut self, nudge: Offset) -> Self {
        self.nudge = nudge;
        self
    }

    pub fn request(&self) -> &Arc<MapRequest> {
        &self.request
    }

    pub fn extent(&self) -> Rect {
        self.request.extent()
    }

    pub fn raster(&self) -> Option<&Raster> {
        self.raster.as_ref()
    }

    pub fn finished_area(&self) -> &RegionSet {
        &self.finished_area
    }

    pub fn fuzzy_area(&self) -> &RegionSet {
        &self.fuzzy_area
    }

    pub fn errored_area(&self) -> &RegionSet {
        &self.errored_area
    }

    pub fn nudge(&self) -> Offset {
        self.nudge
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Marks the data finished. Returns `false` if it already was.
    pub fn mark_finished(&mut self) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        true
    }

    /// Records that the tile covering `extent` failed.
    pub fn mark_errored(&mut self, extent: &Rect) {
        let footprint = extent.translate(self.nudge.dx, self.nudge.dy);
        for (_, clipped) in self.occurrences(&footprint) {
            self.errored_area.add_rect(clipped);
        }
    }

    /// Places a tile's best raster into this data.
    ///
    /// Tiles whose request was cancelled and errored tiles are ignored. The
    /// tile footprint is placed at every wrapped occurrence inside the
    /// extent. Only the tile's changed area is copied and recorded. Returns
    /// `true` if any pixels were written.
    pub fn add_tile(&mut self, tile: &MapTile) -> bool {
        if tile.request().is_cancelled() {
            debug!(request = %tile.request(), "Ignoring tile of cancelled request");
            return false;
        }
        if tile.is_errored() {
            return false;
        }
        let Some(src) = tile.raster() else {
            return false;
        };

        let footprint = tile
            .request()
            .extent()
            .translate(self.nudge.dx, self.nudge.dy);
        check_aspect(src, &footprint);

        let is_final = tile.is_final();
        let written = written_footprint(tile, src, &footprint);
        let mut applied = false;
        for (shift, _) in self.occurrences(&footprint) {
            let placed = footprint.translate(shift, 0.0);
            for target in &written {
                if let Some(px) = self.blit(src, &placed, &target.translate(shift, 0.0), !is_final) {
                    self.record(px, is_final);
                    applied = true;
                }
            }
        }

        trace!(
            tile = %tile.request(),
            is_final,
            applied,
            "Added tile"
        );
        applied
    }

    /// Merges another data's finished, fuzzy and errored regions into this
    /// one. Both must share resolution and projection.
    pub fn merge_from(&mut self, other: &MapData) {
        if other.request.ppd().to_bits() != self.request.ppd().to_bits()
            || other.request.projection() != self.request.projection()
        {
            warn!(
                from = %other.request,
                into = %self.request,
                "Cannot merge map data with a different grid"
            );
            return;
        }

        for rect in other.errored_area.rects() {
            for (_, clipped) in self.occurrences(rect) {
                self.errored_area.add_rect(clipped);
            }
        }

        let Some(src) = other.raster.as_ref() else {
            return;
        };
        let src_extent = other.extent();

        for (rects, is_final) in [
            (other.finished_area.rects(), true),
            (other.fuzzy_area.rects(), false),
        ] {
            for rect in rects {
                for (shift, clipped) in self.occurrences(rect) {
                    let placed = src_extent.translate(shift, 0.0);
                    if let Some(px) = self.blit(src, &placed, &clipped, !is_final) {
                        self.record(px, is_final);
                    }
                }
            }
        }
    }

    /// Returns this data resampled and cropped to `request`.
    ///
    /// An equal request yields the same allocation. The new extent must lie
    /// inside the current one; otherwise the result has no raster and no
    /// regions.
    pub fn convert_to_request(self: &Arc<Self>, request: Arc<MapRequest>) -> Arc<MapData> {
        if *self.request == *request {
            return Arc::clone(self);
        }

        let old_extent = self.extent();
        let new_extent = request.extent();
        let mut converted = MapData {
            request: Arc::clone(&request),
            raster: None,
            finished_area: RegionSet::new(),
            fuzzy_area: RegionSet::new(),
            errored_area: self.errored_area.clipped_to(&new_extent),
            finished: self.finished,
            nudge: self.nudge,
        };

        if !old_extent.contains_rect(&new_extent) {
            warn!(
                from = %old_extent,
                to = %new_extent,
                "Requested extent is not inside the data; dropping raster"
            );
            converted.errored_area = RegionSet::new();
            return Arc::new(converted);
        }

        converted.finished_area = self.finished_area.clipped_to(&new_extent);
        converted.fuzzy_area = self.fuzzy_area.clipped_to(&new_extent);
        converted.raster = self
            .raster
            .as_ref()
            .map(|src| resample(src, &self.request, &request));
        Arc::new(converted)
    }

    /// An isolated copy with independent raster and regions.
    pub fn get_deep_copy(&self) -> MapData {
        self.clone()
    }

    /// An isolated copy of the regions around a caller-supplied raster.
    pub fn get_deep_copy_shell(&self, raster: Option<Raster>) -> MapData {
        MapData {
            request: Arc::clone(&self.request),
            raster,
            finished_area: self.finished_area.clone(),
            fuzzy_area: self.fuzzy_area.clone(),
            errored_area: self.errored_area.clone(),
            finished: self.finished,
            nudge: self.nudge,
        }
    }

    /// Renders the data as RGBA, with the error fill over failed tiles.
    ///
    /// Pixels without data are transparent.
    pub fn render_rgba(&self) -> RgbaImage {
        let px = self.request.pixel_rect();
        let ppd = self.request.ppd();
        let mut img = match &self.raster {
            Some(raster) => raster.to_rgba_image(),
            None => RgbaImage::new(self.request.width(), self.request.height()),
        };

        let has_data = |x: f64, y: f64| {
            self.finished_area.contains_point(x, y) || self.fuzzy_area.contains_point(x, y)
        };
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let col = px.col0 + x as i64;
            let row = px.row0 + y as i64;
            let (wx, wy) = pixel_center(col, row, ppd);
            if self.errored_area.contains_point(wx, wy) && !self.finished_area.contains_point(wx, wy) {
                let checker = (col.div_euclid(ERROR_CHECKER) + row.div_euclid(ERROR_CHECKER)).rem_euclid(2);
                *pixel = ERROR_FILL[checker as usize];
            } else if !has_data(wx, wy) {
                *pixel = Rgba([0, 0, 0, 0]);
            }
        }
        img
    }

    /// Wrapped occurrences of `rect` that overlap the extent, as
    /// `(x shift, clipped rect)` pairs.
    fn occurrences(&self, rect: &Rect) -> Vec<(f64, Rect)> {
        let extent = self.extent();
        let shifts: Vec<f64> = match self.request.projection().wrap_period() {
            Some(period) => {
                let first = ((extent.min_x - rect.max_x) / period).floor() as i64;
                let last = ((extent.max_x - rect.min_x) / period).ceil() as i64;
                (first..=last).map(|k| k as f64 * period).collect()
            }
            None => vec![0.0],
        };

        shifts
            .into_iter()
            .filter_map(|shift| {
                rect.translate(shift, 0.0)
                    .intersection(&extent)
                    .map(|clipped| (shift, clipped))
            })
            .collect()
    }

    /// Copies the part of `src` (covering `src_extent`) that falls inside
    /// `target`. Returns the global pixel rectangle written.
    ///
    /// With `skip_finished`, pixels already finished are left alone.
    fn blit(
        &mut self,
        src: &Raster,
        src_extent: &Rect,
        target: &Rect,
        skip_finished: bool,
    ) -> Option<PixelRect> {
        let ppd = self.request.ppd();
        let dst_px = self.request.pixel_rect();
        let overlap = PixelRect::nearest(target, ppd).intersection(&dst_px)?;

        if let Some(raster) = &self.raster {
            if raster.shape() != src.shape() {
                warn!(
                    expected = %raster.shape(),
                    actual = %src.shape(),
                    "Tile raster shape does not match map data"
                );
                return None;
            }
        }
        let (width, height) = (self.request.width(), self.request.height());
        let dst = self
            .raster
            .get_or_insert_with(|| Raster::new(width, height, src.shape()));

        let dx = (overlap.col0 - dst_px.col0) as u32;
        let dy = (overlap.row0 - dst_px.row0) as u32;
        let (w, h) = (overlap.width() as u32, overlap.height() as u32);

        if !skip_finished || self.finished_area.is_empty() {
            if let Some(src_px) = aligned_pixels(src_extent, ppd, src) {
                let sx = (overlap.col0 - src_px.col0) as u32;
                let sy = (overlap.row0 - src_px.row0) as u32;
                if dst.copy_block_from(src, sx, sy, w, h, dx, dy).is_ok() {
                    return Some(overlap);
                }
            }
        }

        let sw = src.width() as f64;
        let sh = src.height() as f64;
        for row in 0..h {
            for col in 0..w {
                let (wx, wy) = pixel_center(overlap.col0 + col as i64, overlap.row0 + row as i64, ppd);
                if skip_finished && self.finished_area.contains_point(wx, wy) {
                    continue;
                }
                let u = (wx - src_extent.min_x) / src_extent.width() * sw;
                let v = (src_extent.max_y - wy) / src_extent.height() * sh;
                let sx = (u.floor().max(0.0) as u32).min(src.width() - 1);
                let sy = (v.floor().max(0.0) as u32).min(src.height() - 1);
                dst.copy_pixel_from(src, sx, sy, dx + col, dy + row);
            }
        }
        Some(overlap)
    }

    fn record(&mut self, px: PixelRect, is_final: bool) {
        let rect = px.to_world(self.request.ppd());
        if is_final {
            self.finished_area.add_rect(rect);
            self.fuzzy_area.subtract_rect(&rect);
        } else {
            let mut pieces = RegionSet::from_rect(rect);
            pieces.subtract_region(&self.finished_area);
            self.fuzzy_area.add_region(&pieces);
        }
    }
}

/// World rectangles of `footprint` covered by the tile's changed area.
fn written_footprint(tile: &MapTile, src: &Raster, footprint: &Rect) -> Vec<Rect> {
    let Some(changed) = tile.changed_area() else {
        return vec![*footprint];
    };
    if src.width() == 0 || src.height() == 0 {
        return Vec::new();
    }
    let sx = footprint.width() / src.width() as f64;
    let sy = footprint.height() / src.height() as f64;
    changed
        .rects()
        .iter()
        .filter_map(|r| {
            Rect::new(
                footprint.min_x + r.min_x * sx,
                footprint.max_y - r.max_y * sy,
                footprint.min_x + r.max_x * sx,
                footprint.max_y - r.min_y * sy,
            )
            .intersection(footprint)
        })
        .collect()
}

fn pixel_center(col: i64, row: i64, ppd: f64) -> (f64, f64) {
    ((col as f64 + 0.5) / ppd, -(row as f64 + 0.5) / ppd)
}

/// Pixel rectangle of `extent` if it sits on the grid and matches the
/// raster's size, so a straight block copy is exact.
fn aligned_pixels(extent: &Rect, ppd: f64, raster: &Raster) -> Option<PixelRect> {
    let px = PixelRect::nearest(extent, ppd);
    let snapped = px.to_world(ppd);
    let tolerance = 1e-6 / ppd;
    let aligned = (snapped.min_x - extent.min_x).abs() < tolerance
        && (snapped.max_x - extent.max_x).abs() < tolerance
        && (snapped.min_y - extent.min_y).abs() < tolerance
        && (snapped.max_y - extent.max_y).abs() < tolerance;
    (aligned && px.width() == raster.width() as i64 && px.height() == raster.height() as i64)
        .then_some(px)
}

fn check_aspect(raster: &Raster, footprint: &Rect) {
    if raster.width() == 0 || raster.height() == 0 || footprint.height() <= 0.0 {
        return;
    }
    let raster_aspect = raster.width() as f64 / raster.height() as f64;
    let world_aspect = footprint.width() / footprint.height();
    if ((raster_aspect - world_aspect) / world_aspect).abs() > ASPECT_TOLERANCE {
        warn!(
            width = raster.width(),
            height = raster.height(),
            extent = %footprint,
            "Tile raster aspect ratio does not match its extent"
        );
    }
}

/// Row-major affine map `(x, y) -> (a*x + b*y + c, d*x + e*y + f)`.
#[derive(Debug, Clone, Copy)]
struct Affine {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Affine {
    /// Raster pixel space to world space for a request.
    fn raster_to_world(request: &MapRequest) -> Self {
        let extent = request.extent();
        let ppd = request.ppd();
        Self {
            a: 1.0 / ppd,
            b: 0.0,
            c: extent.min_x,
            d: 0.0,
            e: -1.0 / ppd,
            f: extent.max_y,
        }
    }

    fn invert(&self) -> Option<Self> {
        let det = self.a * self.e - self.b * self.d;
        if !det.is_finite() || det.abs() < f64::EPSILON * f64::EPSILON {
            return None;
        }
        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;
        Some(Self {
            a,
            b,
            c: -(a * self.c + b * self.f),
            d,
            e,
            f: -(d * self.c + e * self.f),
        })
    }

    /// `self` applied after `first`.
    fn then(&self, first: &Affine) -> Self {
        Self {
            a: self.a * first.a + self.b * first.d,
            b: self.a * first.b + self.b * first.e,
            c: self.a * first.c + self.b * first.f + self.c,
            d: self.d * first.a + self.e * first.d,
            e: self.d * first.b + self.e * first.e,
            f: self.d * first.c + self.e * first.f + self.f,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.c,
            self.d * x + self.e * y + self.f,
        )
    }
}

/// Nearest-neighbor resample of `src` (covering `from`) onto the grid of `to`.
fn resample(src: &Raster, from: &MapRequest, to: &MapRequest) -> Raster {
    let mut dst = Raster::new(to.width(), to.height(), src.shape());
    let clamp = |v: f64, len: u32| (v.floor().max(0.0) as u32).min(len.saturating_sub(1));

    let to_world = Affine::raster_to_world(to);
    match Affine::raster_to_world(from).invert() {
        Some(from_world) => {
            let transform = from_world.then(&to_world);
            for y in 0..dst.height() {
                for x in 0..dst.width() {
                    let (u, v) = transform.apply(x as f64 + 0.5, y as f64 + 0.5);
                    dst.copy_pixel_from(src, clamp(u, src.width()), clamp(v, src.height()), x, y);
                }
            }
        }
        None => {
            debug!(request = %from, "Singular raster transform; resampling per pixel");
            let from_extent = from.extent();
            for y in 0..dst.height() {
                for x in 0..dst.width() {
                    let (wx, wy) = to_world.apply(x as f64 + 0.5, y as f64 + 0.5);
                    let u = (wx - from_extent.min_x) / from_extent.width() * src.width() as f64;
                    let v = (from_extent.max_y - wy) / from_extent.height() * src.height() as f64;
                    dst.copy_pixel_from(src, clamp(u, src.width()), clamp(v, src.height()), x, y);
                }
            }
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Projection;
    use crate::raster::RasterShape;

    fn request(extent: Rect, ppd: f64) -> Arc<MapRequest> {
        Arc::new(MapRequest::new("t", extent, ppd, Projection::unrotated()).unwrap())
    }

    fn tile(extent: Rect, ppd: f64, value: f64, is_final: bool) -> MapTile {
        let req = request(extent, ppd);
        let raster = Raster::filled(req.width(), req.height(), RasterShape::GRAY8, &[value]);
        let mut tile = MapTile::new(req);
        if is_final {
            tile.set_final(raster);
        } else {
            tile.set_fuzzy(raster);
        }
        tile
    }

    fn value_at(data: &MapData, x: f64, y: f64) -> f64 {
        let ppd = data.request().ppd();
        let px = data.request().pixel_rect();
        let col = (x * ppd).floor() as i64 - px.col0;
        let row = (-y * ppd).floor() as i64 - px.row0;
        data.raster().unwrap().sample(col as u32, row as u32, 0)
    }

    #[test]
    fn test_final_tile_fills_footprint() {
        let mut data = MapData::new(request(Rect::new(0.0, 0.0, 2.0, 1.0), 4.0));
        let t = tile(Rect::new(0.0, 0.0, 1.0, 1.0), 4.0, 9.0, true);

        assert!(data.add_tile(&t));
        assert!(data
            .finished_area()
            .is_equivalent(&RegionSet::from_rect(Rect::new(0.0, 0.0, 1.0, 1.0))));
        assert!(data.fuzzy_area().is_empty());
        assert_eq!(value_at(&data, 0.5, 0.5), 9.0);
        assert_eq!(value_at(&data, 1.5, 0.5), 0.0);
    }

    #[test]
    fn test_fuzzy_never_overwrites_finished() {
        let mut data = MapData::new(request(Rect::new(0.0, 0.0, 2.0, 1.0), 4.0));
        data.add_tile(&tile(Rect::new(0.0, 0.0, 1.0, 1.0), 4.0, 9.0, true));
        data.add_tile(&tile(Rect::new(0.0, 0.0, 2.0, 1.0), 4.0, 3.0, false));

        assert_eq!(value_at(&data, 0.5, 0.5), 9.0);
        assert_eq!(value_at(&data, 1.5, 0.5), 3.0);
        assert!(data
            .fuzzy_area()
            .is_equivalent(&RegionSet::from_rect(Rect::new(1.0, 0.0, 2.0, 1.0))));
    }

    #[test]
    fn test_finished_area_never_shrinks() {
        let mut data = MapData::new(request(Rect::new(0.0, 0.0, 3.0, 1.0), 2.0));
        let steps = [
            tile(Rect::new(1.0, 0.0, 2.0, 1.0), 2.0, 1.0, true),
            tile(Rect::new(0.0, 0.0, 3.0, 1.0), 2.0, 2.0, false),
            tile(Rect::new(0.0, 0.0, 1.0, 1.0), 2.0, 3.0, true),
            tile(Rect::new(0.0, 0.0, 3.0, 1.0), 2.0, 4.0, false),
        ];

        let mut previous = RegionSet::new();
        for t in &steps {
            data.add_tile(t);
            let mut lost = previous.clone();
            lost.subtract_region(data.finished_area());
            assert!(lost.area() < 1e-9);
            previous = data.finished_area().clone();
        }
        assert_eq!(value_at(&data, 1.5, 0.5), 1.0);
        assert_eq!(value_at(&data, 2.5, 0.5), 4.0);
    }

    #[test]
    fn test_cancelled_and_errored_tiles_are_ignored() {
        let mut data = MapData::new(request(Rect::new(0.0, 0.0, 1.0, 1.0), 4.0));

        let cancelled = tile(Rect::new(0.0, 0.0, 1.0, 1.0), 4.0, 1.0, true);
        cancelled.request().cancel();
        assert!(!data.add_tile(&cancelled));

        let mut errored = tile(Rect::new(0.0, 0.0, 1.0, 1.0), 4.0, 1.0, true);
        errored.set_error("boom");
        assert!(!data.add_tile(&errored));

        assert!(data.finished_area().is_empty());
        assert!(data.raster().is_none());
    }

    #[test]
    fn test_tile_placed_at_every_wrapped_occurrence() {
        let mut data = MapData::new(request(Rect::new(-20.0, 0.0, 20.0, 10.0), 1.0));
        let t = tile(Rect::new(-190.0, 0.0, -170.0, 10.0), 1.0, 5.0, true);
        assert!(!data.add_tile(&t));

        let mut data = MapData::new(request(Rect::new(170.0, 0.0, 370.0, 10.0), 1.0));
        let t = tile(Rect::new(0.0, 0.0, 10.0, 10.0), 1.0, 5.0, true);
        assert!(data.add_tile(&t));
        assert_eq!(value_at(&data, 365.0, 5.0), 5.0);
        assert_eq!(value_at(&data, 175.0, 5.0), 0.0);
        assert!((data.finished_area().area() - 100.0).abs() < 1e-9);

        let mut wide = MapData::new(request(Rect::new(-180.0, 0.0, 540.0, 10.0), 1.0));
        wide.add_tile(&t);
        assert_eq!(value_at(&wide, 5.0, 5.0), 5.0);
        assert_eq!(value_at(&wide, 365.0, 5.0), 5.0);
        assert!((wide.finished_area().area() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_lower_resolution_tile_is_resampled() {
        let mut data = MapData::new(request(Rect::new(0.0, 0.0, 1.0, 1.0), 8.0));
        let t = tile(Rect::new(0.0, 0.0, 1.0, 1.0), 2.0, 7.0, true);
        assert!(data.add_tile(&t));
        assert_eq!(value_at(&data, 0.9, 0.1), 7.0);
        assert!(data.finished_area().covers(&Rect::new(0.0, 0.0, 1.0, 1.0)));
    }

    #[test]
    fn test_nudge_shifts_footprint() {
        let mut data = MapData::new(request(Rect::new(0.0, 0.0, 2.0, 1.0), 1.0))
            .with_nudge(Offset::new(1.0, 0.0));
        data.add_tile(&tile(Rect::new(0.0, 0.0, 1.0, 1.0), 1.0, 4.0, true));
        assert_eq!(value_at(&data, 1.5, 0.5), 4.0);
        assert_eq!(value_at(&data, 0.5, 0.5), 0.0);
    }

    #[test]
    fn test_only_changed_area_is_recorded() {
        let mut data = MapData::new(request(Rect::new(0.0, 0.0, 2.0, 1.0), 4.0));
        let req = request(Rect::new(0.0, 0.0, 2.0, 1.0), 4.0);
        let mut t = MapTile::new(req);
        // Left half of an 8x4 raster.
        let changed = RegionSet::from_rect(Rect::new(0.0, 0.0, 4.0, 4.0));
        t.set_final_with_area(Raster::filled(8, 4, RasterShape::GRAY8, &[5.0]), Some(changed));

        assert!(data.add_tile(&t));
        assert!(data
            .finished_area()
            .is_equivalent(&RegionSet::from_rect(Rect::new(0.0, 0.0, 1.0, 1.0))));
        assert_eq!(value_at(&data, 0.5, 0.5), 5.0);
        assert_eq!(value_at(&data, 1.5, 0.5), 0.0);
    }

    #[test]
    fn test_empty_changed_area_writes_nothing() {
        let mut data = MapData::new(request(Rect::new(0.0, 0.0, 1.0, 1.0), 4.0));
        let mut t = MapTile::new(request(Rect::new(0.0, 0.0, 1.0, 1.0), 4.0));
        t.set_fuzzy_with_area(Raster::filled(4, 4, RasterShape::GRAY8, &[5.0]), Some(RegionSet::new()));

        assert!(!data.add_tile(&t));
        assert!(data.fuzzy_area().is_empty());
    }

    #[test]
    fn test_shape_mismatch_is_skipped() {
        let mut data = MapData::new(request(Rect::new(0.0, 0.0, 1.0, 1.0), 2.0));
        data.add_tile(&tile(Rect::new(0.0, 0.0, 1.0, 1.0), 2.0, 1.0, false));

        let req = request(Rect::new(0.0, 0.0, 1.0, 1.0), 2.0);
        let mut rgb = MapTile::new(req);
        rgb.set_final(Raster::new(2, 2, RasterShape::RGB8));
        assert!(!data.add_tile(&rgb));
        assert!(data.finished_area().is_empty());
    }

    #[test]
    fn test_convert_to_equal_request_is_identity() {
        let data = Arc::new(MapData::new(request(Rect::new(0.0, 0.0, 1.0, 1.0), 4.0)));
        let same = request(Rect::new(0.0, 0.0, 1.0, 1.0), 4.0);
        assert!(Arc::ptr_eq(&data, &data.convert_to_request(same)));
    }

    #[test]
    fn test_convert_crops_and_resamples() {
        let mut data = MapData::new(request(Rect::new(0.0, 0.0, 2.0, 2.0), 2.0));
        data.add_tile(&tile(Rect::new(1.0, 0.0, 2.0, 1.0), 2.0, 6.0, true));
        let data = Arc::new(data);

        let converted = data.convert_to_request(request(Rect::new(1.0, 0.0, 2.0, 1.0), 4.0));
        assert!(!Arc::ptr_eq(&data, &converted));
        let raster = converted.raster().unwrap();
        assert_eq!((raster.width(), raster.height()), (4, 4));
        assert_eq!(raster.sample(3, 3, 0), 6.0);
        assert!(converted
            .finished_area()
            .is_equivalent(&RegionSet::from_rect(Rect::new(1.0, 0.0, 2.0, 1.0))));
    }

    #[test]
    fn test_convert_outside_degrades_to_no_raster() {
        let mut data = MapData::new(request(Rect::new(0.0, 0.0, 1.0, 1.0), 2.0));
        data.add_tile(&tile(Rect::new(0.0, 0.0, 1.0, 1.0), 2.0, 6.0, true));
        let data = Arc::new(data);

        let converted = data.convert_to_request(request(Rect::new(0.0, 0.0, 2.0, 1.0), 2.0));
        assert!(converted.raster().is_none());
        assert!(converted.finished_area().is_empty());
    }

    #[test]
    fn test_deep_copy_is_isolated() {
        let mut data = MapData::new(request(Rect::new(0.0, 0.0, 2.0, 1.0), 2.0));
        data.add_tile(&tile(Rect::new(0.0, 0.0, 1.0, 1.0), 2.0, 6.0, true));
        let copy = data.get_deep_copy();
        data.add_tile(&tile(Rect::new(1.0, 0.0, 2.0, 1.0), 2.0, 6.0, true));

        assert!((copy.finished_area().area() - 1.0).abs() < 1e-9);
        assert!((data.finished_area().area() - 2.0).abs() < 1e-9);

        let shell = data.get_deep_copy_shell(None);
        assert!(shell.raster().is_none());
        assert!(shell.finished_area().is_equivalent(data.finished_area()));
    }

    #[test]
    fn test_mark_finished_once() {
        let mut data = MapData::new(request(Rect::new(0.0, 0.0, 1.0, 1.0), 2.0));
        assert!(data.mark_finished());
        assert!(!data.mark_finished());
        assert!(data.is_finished());
    }

    #[test]
    fn test_merge_from_tiles() {
        let mut whole = MapData::new(request(Rect::new(0.0, 0.0, 2.0, 1.0), 2.0));

        let mut left = MapData::new(request(Rect::new(0.0, 0.0, 1.0, 1.0), 2.0));
        left.add_tile(&tile(Rect::new(0.0, 0.0, 1.0, 1.0), 2.0, 8.0, true));
        let mut right = MapData::new(request(Rect::new(1.0, 0.0, 2.0, 1.0), 2.0));
        right.mark_errored(&Rect::new(1.0, 0.0, 2.0, 1.0));

        whole.merge_from(&left);
        whole.merge_from(&right);

        assert_eq!(value_at(&whole, 0.25, 0.75), 8.0);
        assert!(whole
            .finished_area()
            .is_equivalent(&RegionSet::from_rect(Rect::new(0.0, 0.0, 1.0, 1.0))));
        assert!(whole
            .errored_area()
            .is_equivalent(&RegionSet::from_rect(Rect::new(1.0, 0.0, 2.0, 1.0))));
    }

    #[test]
    fn test_render_shows_error_fill() {
        let mut data = MapData::new(request(Rect::new(0.0, 0.0, 2.0, 1.0), 4.0));
        data.add_tile(&tile(Rect::new(0.0, 0.0, 1.0, 1.0), 4.0, 200.0, true));
        data.mark_errored(&Rect::new(1.0, 0.0, 2.0, 1.0));

        let img = data.render_rgba();
        assert_eq!(img.get_pixel(0, 0).0, [200, 200, 200, 255]);
        let fill = img.get_pixel(5, 0);
        assert!(ERROR_FILL.contains(fill));
    }
}
