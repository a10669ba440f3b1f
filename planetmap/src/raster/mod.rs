//! Multi-band raster buffers.
//!
//! A [`Raster`] is a width × height grid of pixels, each holding
//! `shape.bands` samples of one numeric [`SampleType`]. Samples are stored
//! band-interleaved, row-major, with row 0 at the north edge.

mod codec;

pub use codec::{decode_bil, decode_image, CodecError};

use image::{Rgba, RgbaImage};
use std::fmt;
use thiserror::Error;

/// Numeric type of raster samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    U8,
    I16,
    U16,
    F32,
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleType::U8 => "u8",
            SampleType::I16 => "i16",
            SampleType::U16 => "u16",
            SampleType::F32 => "f32",
        };
        f.write_str(name)
    }
}

/// Band count plus sample type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterShape {
    pub bands: u8,
    pub sample: SampleType,
}

impl RasterShape {
    pub const GRAY8: RasterShape = RasterShape::new(1, SampleType::U8);
    pub const RGB8: RasterShape = RasterShape::new(3, SampleType::U8);
    pub const RGBA8: RasterShape = RasterShape::new(4, SampleType::U8);
    pub const ELEVATION16: RasterShape = RasterShape::new(1, SampleType::I16);
    pub const ELEVATION_U16: RasterShape = RasterShape::new(1, SampleType::U16);
    pub const ELEVATION32: RasterShape = RasterShape::new(1, SampleType::F32);

    pub const fn new(bands: u8, sample: SampleType) -> Self {
        Self { bands, sample }
    }
}

impl fmt::Display for RasterShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.bands, self.sample)
    }
}

/// Errors from raster construction and copies.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RasterError {
    #[error("sample buffer has {actual} values, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("raster shape {actual} does not match {expected}")]
    ShapeMismatch {
        expected: RasterShape,
        actual: RasterShape,
    },

    #[error("block {w}x{h} at ({x}, {y}) is outside a {width}x{height} raster")]
    OutOfBounds {
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        width: u32,
        height: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Samples {
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

/// Applies `$body` to the typed sample vector of `$samples`, bound as `$v`.
macro_rules! with_samples {
    ($samples:expr, $v:ident => $body:expr) => {
        match $samples {
            Samples::U8($v) => $body,
            Samples::I16($v) => $body,
            Samples::U16($v) => $body,
            Samples::F32($v) => $body,
        }
    };
}

/// Applies `$body` to a pair of same-typed sample vectors. Mismatched types
/// evaluate to `$mismatch`.
macro_rules! with_sample_pair {
    ($dst:expr, $src:expr, ($d:ident, $s:ident) => $body:expr, $mismatch:expr) => {
        match ($dst, $src) {
            (Samples::U8($d), Samples::U8($s)) => $body,
            (Samples::I16($d), Samples::I16($s)) => $body,
            (Samples::U16($d), Samples::U16($s)) => $body,
            (Samples::F32($d), Samples::F32($s)) => $body,
            _ => $mismatch,
        }
    };
}

/// A multi-band raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: u32,
    height: u32,
    shape: RasterShape,
    samples: Samples,
}

impl Raster {
    /// Creates a zero-filled raster.
    pub fn new(width: u32, height: u32, shape: RasterShape) -> Self {
        let len = width as usize * height as usize * shape.bands as usize;
        let samples = match shape.sample {
            SampleType::U8 => Samples::U8(vec![0; len]),
            SampleType::I16 => Samples::I16(vec![0; len]),
            SampleType::U16 => Samples::U16(vec![0; len]),
            SampleType::F32 => Samples::F32(vec![0.0; len]),
        };
        Self {
            width,
            height,
            shape,
            samples,
        }
    }

    fn checked(
        width: u32,
        height: u32,
        bands: u8,
        sample: SampleType,
        len: usize,
        samples: Samples,
    ) -> Result<Self, RasterError> {
        let expected = width as usize * height as usize * bands as usize;
        if len != expected {
            return Err(RasterError::LengthMismatch {
                expected,
                actual: len,
            });
        }
        Ok(Self {
            width,
            height,
            shape: RasterShape::new(bands, sample),
            samples,
        })
    }

    pub fn from_u8(width: u32, height: u32, bands: u8, data: Vec<u8>) -> Result<Self, RasterError> {
        let len = data.len();
        Self::checked(width, height, bands, SampleType::U8, len, Samples::U8(data))
    }

    pub fn from_i16(width: u32, height: u32, bands: u8, data: Vec<i16>) -> Result<Self, RasterError> {
        let len = data.len();
        Self::checked(width, height, bands, SampleType::I16, len, Samples::I16(data))
    }

    pub fn from_u16(width: u32, height: u32, bands: u8, data: Vec<u16>) -> Result<Self, RasterError> {
        let len = data.len();
        Self::checked(width, height, bands, SampleType::U16, len, Samples::U16(data))
    }

    pub fn from_f32(width: u32, height: u32, bands: u8, data: Vec<f32>) -> Result<Self, RasterError> {
        let len = data.len();
        Self::checked(width, height, bands, SampleType::F32, len, Samples::F32(data))
    }

    /// Creates a single-colored raster.
    pub fn filled(width: u32, height: u32, shape: RasterShape, value: &[f64]) -> Self {
        let mut raster = Self::new(width, height, shape);
        for y in 0..height {
            for x in 0..width {
                raster.set_pixel(x, y, value);
            }
        }
        raster
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn shape(&self) -> RasterShape {
        self.shape
    }

    #[inline]
    pub fn bands(&self) -> usize {
        self.shape.bands as usize
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.bands()
    }

    /// Reads one sample as `f64`.
    pub fn sample(&self, x: u32, y: u32, band: usize) -> f64 {
        let i = self.offset(x, y) + band;
        with_samples!(&self.samples, v => v[i] as f64)
    }

    /// Writes one sample, saturating to the sample type's range.
    pub fn set_sample(&mut self, x: u32, y: u32, band: usize, value: f64) {
        let i = self.offset(x, y) + band;
        match &mut self.samples {
            Samples::U8(v) => v[i] = value.round().clamp(0.0, u8::MAX as f64) as u8,
            Samples::I16(v) => v[i] = value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16,
            Samples::U16(v) => v[i] = value.round().clamp(0.0, u16::MAX as f64) as u16,
            Samples::F32(v) => v[i] = value as f32,
        }
    }

    /// Writes all bands of one pixel; extra values are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, values: &[f64]) {
        for (band, value) in values.iter().take(self.bands()).enumerate() {
            self.set_sample(x, y, band, *value);
        }
    }

    /// Copies one pixel from a raster of the same shape.
    ///
    /// Callers check shapes up front; a mismatched pair is ignored.
    #[inline]
    pub fn copy_pixel_from(&mut self, src: &Raster, sx: u32, sy: u32, dx: u32, dy: u32) {
        let bands = self.bands();
        let si = src.offset(sx, sy);
        let di = self.offset(dx, dy);
        with_sample_pair!(
            &mut self.samples,
            &src.samples,
            (d, s) => d[di..di + bands].copy_from_slice(&s[si..si + bands]),
            ()
        )
    }

    /// Copies a `w` × `h` block from `src` at (`sx`, `sy`) to (`dx`, `dy`).
    #[allow(clippy::too_many_arguments)]
    pub fn copy_block_from(
        &mut self,
        src: &Raster,
        sx: u32,
        sy: u32,
        w: u32,
        h: u32,
        dx: u32,
        dy: u32,
    ) -> Result<(), RasterError> {
        if src.shape != self.shape {
            return Err(RasterError::ShapeMismatch {
                expected: self.shape,
                actual: src.shape,
            });
        }
        if sx + w > src.width || sy + h > src.height {
            return Err(RasterError::OutOfBounds {
                x: sx,
                y: sy,
                w,
                h,
                width: src.width,
                height: src.height,
            });
        }
        if dx + w > self.width || dy + h > self.height {
            return Err(RasterError::OutOfBounds {
                x: dx,
                y: dy,
                w,
                h,
                width: self.width,
                height: self.height,
            });
        }

        let row_len = w as usize * self.bands();
        for row in 0..h {
            let si = src.offset(sx, sy + row);
            let di = self.offset(dx, dy + row);
            with_sample_pair!(
                &mut self.samples,
                &src.samples,
                (d, s) => d[di..di + row_len].copy_from_slice(&s[si..si + row_len]),
                ()
            );
        }
        Ok(())
    }

    /// Raw 8-bit samples, if this is an 8-bit raster.
    pub fn as_u8(&self) -> Option<&[u8]> {
        match &self.samples {
            Samples::U8(v) => Some(v),
            _ => None,
        }
    }

    /// Minimum and maximum over all samples of one band.
    pub fn band_range(&self, band: usize) -> Option<(f64, f64)> {
        let bands = self.bands();
        if band >= bands {
            return None;
        }
        with_samples!(&self.samples, v => {
            v.iter()
                .skip(band)
                .step_by(bands)
                .map(|s| *s as f64)
                .filter(|s| s.is_finite())
                .fold(None, |acc: Option<(f64, f64)>, s| match acc {
                    Some((lo, hi)) => Some((lo.min(s), hi.max(s))),
                    None => Some((s, s)),
                })
        })
    }

    /// Converts an 8-bit raster between 1, 3 and 4 bands.
    ///
    /// Gray expands to equal color channels, alpha is added opaque or
    /// dropped, and color reduces to gray by luma. Returns `None` for other
    /// sample types or band counts.
    pub fn to_u8_bands(&self, bands: u8) -> Option<Raster> {
        let src = self.as_u8()?;
        if self.shape.bands == bands {
            return Some(self.clone());
        }
        let from = self.bands();
        if !matches!(from, 1 | 3 | 4) || !matches!(bands, 1 | 3 | 4) {
            return None;
        }

        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * bands as usize);
        for px in src.chunks_exact(from) {
            let (r, g, b, a) = match from {
                1 => (px[0], px[0], px[0], 255),
                3 => (px[0], px[1], px[2], 255),
                _ => (px[0], px[1], px[2], px[3]),
            };
            match bands {
                1 => out.push(luma(r, g, b)),
                3 => out.extend_from_slice(&[r, g, b]),
                _ => out.extend_from_slice(&[r, g, b, a]),
            }
        }
        Raster::from_u8(self.width, self.height, bands, out).ok()
    }

    /// Converts an RGBA image into a 4-band 8-bit raster.
    pub fn from_rgba_image(img: &RgbaImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            shape: RasterShape::RGBA8,
            samples: Samples::U8(img.as_raw().clone()),
        }
    }

    /// Renders the raster for display.
    ///
    /// 8-bit rasters map bands directly (1 band gray, 3 RGB, 4 RGBA). Other
    /// sample types are stretched to their value range and shown as gray.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let stretch = match self.shape.sample {
            SampleType::U8 => None,
            _ => self.band_range(0),
        };
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            if let Some((lo, hi)) = stretch {
                let span = (hi - lo).max(f64::EPSILON);
                let g = ((self.sample(x, y, 0) - lo) / span * 255.0).round() as u8;
                return Rgba([g, g, g, 255]);
            }
            match self.bands() {
                1 | 2 => {
                    let g = self.sample(x, y, 0) as u8;
                    Rgba([g, g, g, 255])
                }
                3 => Rgba([
                    self.sample(x, y, 0) as u8,
                    self.sample(x, y, 1) as u8,
                    self.sample(x, y, 2) as u8,
                    255,
                ]),
                _ => Rgba([
                    self.sample(x, y, 0) as u8,
                    self.sample(x, y, 1) as u8,
                    self.sample(x, y, 2) as u8,
                    self.sample(x, y, 3) as u8,
                ]),
            }
        })
    }
}

/// Rec. 601 luma of an 8-bit color.
pub(crate) fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64).round() as u8
}
