//! Decoding of fetched map payloads into rasters.

use super::Raster;
use image::DynamicImage;
use thiserror::Error;

/// Errors decoding a payload.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("payload has {actual} bytes, expected {expected}")]
    Truncated { expected: usize, actual: usize },

    #[error("unsupported BIL sample size {0} bits")]
    UnsupportedBil(u8),

    #[error(transparent)]
    Raster(#[from] super::RasterError),
}

/// Decodes an encoded image (PNG, JPEG, TIFF).
///
/// Gray images keep a single band: 8-bit as `u8`, 16-bit as `u16`. RGB stays
/// 3 bands. Everything else is converted to 8-bit RGBA.
pub fn decode_image(bytes: &[u8]) -> Result<Raster, CodecError> {
    let img = image::load_from_memory(bytes)?;
    let (w, h) = (img.width(), img.height());
    let raster = match img {
        DynamicImage::ImageLuma8(buf) => Raster::from_u8(w, h, 1, buf.into_raw())?,
        DynamicImage::ImageLuma16(buf) => Raster::from_u16(w, h, 1, buf.into_raw())?,
        DynamicImage::ImageRgb8(buf) => Raster::from_u8(w, h, 3, buf.into_raw())?,
        other => Raster::from_rgba_image(&other.to_rgba8()),
    };
    Ok(raster)
}

/// Decodes a raw little-endian band-interleaved-by-line payload of one band.
///
/// `bits` is 16 for signed 16-bit integers or 32 for 32-bit floats. Trailing
/// bytes beyond `width * height` samples are ignored.
pub fn decode_bil(bytes: &[u8], width: u32, height: u32, bits: u8) -> Result<Raster, CodecError> {
    let count = width as usize * height as usize;
    let size = match bits {
        16 => 2,
        32 => 4,
        other => return Err(CodecError::UnsupportedBil(other)),
    };
    let expected = count * size;
    if bytes.len() < expected {
        return Err(CodecError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }

    let payload = &bytes[..expected];
    let raster = if size == 2 {
        let samples = payload
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        Raster::from_i16(width, height, 1, samples)?
    } else {
        let samples = payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Raster::from_f32(width, height, 1, samples)?
    };
    Ok(raster)
}
