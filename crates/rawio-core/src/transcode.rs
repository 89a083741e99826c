//! Conversion of decoder output into the canonical 4-channel 8-bit buffer.

use std::io::Cursor;

use image::ImageReader;
use tracing::warn;

use crate::backend::{ProcessedOutput, RawBitmap};
use crate::buffer::{CanonicalImage, BYTES_PER_PIXEL};
use crate::error::DecodeError;
use crate::options::{Quality, Size};
use crate::scale::{scale_to, FilterType};
use crate::LOG_TARGET;

/// Fourth byte of every transcoded pixel.
const FILL_ALPHA: u8 = 0xFF;

/// Convert one decoder output into a canonical buffer.
///
/// `preview_target` is the size an encoded preview is decoded at, in the
/// preview's own (stored) orientation. Bitmaps are converted at their own
/// size.
pub fn transcode(
    output: &ProcessedOutput,
    preview_target: Size,
    quality: Quality,
) -> Result<CanonicalImage, DecodeError> {
    match output {
        ProcessedOutput::EncodedPreview { bytes } => decode_preview(bytes, preview_target, quality),
        ProcessedOutput::RawBitmap(bitmap) => transcode_bitmap(bitmap),
    }
}

/// Decode an embedded preview with the general image codec.
///
/// # Arguments
///
/// * `bytes` - Encoded preview bytes (normally JPEG)
/// * `target` - Size to decode at; an invalid size keeps the native size
/// * `quality` - Decode quality, used to pick the resampling filter
///
/// # Errors
///
/// Returns `DecodeError::PreviewDecode` if the bytes are not a decodable image.
pub fn decode_preview(
    bytes: &[u8],
    target: Size,
    quality: Quality,
) -> Result<CanonicalImage, DecodeError> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| preview_failed(e.to_string()))?
        .decode()
        .map_err(|e| preview_failed(e.to_string()))?;

    let decoded = CanonicalImage::from_rgba_image(img.into_rgba8());
    if !target.is_valid() {
        return Ok(decoded);
    }
    scale_to(decoded, target, FilterType::for_request(quality, true))
}

fn preview_failed(message: String) -> DecodeError {
    warn!(target: LOG_TARGET, "error decoding preview: {message}");
    DecodeError::PreviewDecode(message)
}

/// Convert a decoder bitmap into a new canonical buffer.
///
/// Each output byte is the most significant byte of the source sample, so
/// 16-bit data loses its low byte. Three-channel pixels are read as B, G, R
/// and written as R, G, B; single-channel pixels are replicated into all
/// three colour bytes. The fourth byte is always `0xFF`.
///
/// # Errors
///
/// Returns `DecodeError::UnsupportedChannelLayout` for channel counts other
/// than 1 and 3, `DecodeError::UnsupportedSampleDepth` for samples that are
/// not 8 or 16 bits, and `DecodeError::TruncatedBitmap` when the data is
/// shorter than the header promises.
pub fn transcode_bitmap(bitmap: &RawBitmap) -> Result<CanonicalImage, DecodeError> {
    let colors = bitmap.colors as usize;
    if colors != 1 && colors != 3 {
        return Err(DecodeError::UnsupportedChannelLayout {
            colors: bitmap.colors,
        });
    }
    let sample_bytes = match bitmap.bits {
        8 => 1,
        16 => 2,
        bits => return Err(DecodeError::UnsupportedSampleDepth { bits }),
    };
    if bitmap.width == 0 || bitmap.height == 0 {
        return Err(DecodeError::InvalidSize {
            width: bitmap.width,
            height: bitmap.height,
        });
    }

    let pixel_count = bitmap.width as usize * bitmap.height as usize;
    let stride = colors * sample_bytes;
    let expected = pixel_count * stride;
    let data = bitmap
        .data
        .get(..expected)
        .ok_or(DecodeError::TruncatedBitmap {
            expected,
            actual: bitmap.data.len(),
        })?;

    // Offset of the most significant byte within a native-endian sample.
    let msb = if sample_bytes == 2 && cfg!(target_endian = "little") {
        1
    } else {
        0
    };

    let mut pixels = Vec::with_capacity(pixel_count * BYTES_PER_PIXEL);
    for px in data.chunks_exact(stride) {
        let sample = |channel: usize| px[channel * sample_bytes + msb];
        if colors == 3 {
            pixels.extend_from_slice(&[sample(2), sample(1), sample(0), FILL_ALPHA]);
        } else {
            let v = sample(0);
            pixels.extend_from_slice(&[v, v, v, FILL_ALPHA]);
        }
    }

    Ok(CanonicalImage::new(bitmap.width, bitmap.height, pixels))
}
