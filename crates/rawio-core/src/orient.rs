//! Orientation correction for the embedded-preview path.
//!
//! Size queries are corrected in [`crate::metadata`]; this module rotates
//! preview pixels. Full decodes arrive already oriented by the backend.

use image::RgbaImage;

use crate::buffer::CanonicalImage;
use crate::error::DecodeError;
use crate::metadata::FlipCode;
use crate::options::Size;

/// Rotate a decoded preview into display orientation.
///
/// | flip | rotation |
/// |------|----------|
/// | 0    | none |
/// | 3    | 180° |
/// | 4    | mirror across the main diagonal |
/// | 5    | 90° counter-clockwise |
/// | 6    | 90° clockwise |
/// | 7    | mirror across the anti-diagonal |
///
/// Other codes leave the image untouched.
pub fn orient_preview(image: CanonicalImage, flip: FlipCode) -> Result<CanonicalImage, DecodeError> {
    if matches!(flip, FlipCode::None | FlipCode::Other(_)) {
        return Ok(image);
    }

    let expected = image.width as usize * image.height as usize * crate::buffer::BYTES_PER_PIXEL;
    let actual = image.pixels.len();
    let rgba = image
        .into_rgba_image()
        .ok_or(DecodeError::TruncatedBitmap { expected, actual })?;

    Ok(CanonicalImage::from_rgba_image(apply_flip(&rgba, flip)))
}

fn apply_flip(img: &RgbaImage, flip: FlipCode) -> RgbaImage {
    use image::imageops::{flip_horizontal, flip_vertical, rotate180, rotate270, rotate90};

    match flip {
        FlipCode::Rotate180 => rotate180(img),
        FlipCode::RotateCcw90 => rotate270(img),
        FlipCode::RotateCw90 => rotate90(img),
        FlipCode::Transpose => flip_horizontal(&rotate90(img)),
        FlipCode::Transverse => flip_vertical(&rotate90(img)),
        FlipCode::None | FlipCode::Other(_) => img.clone(),
    }
}

/// The stored (pre-rotation) size that becomes `display` after orienting.
pub fn stored_size(display: Size, flip: FlipCode) -> Size {
    if flip.transposes() {
        display.transposed()
    } else {
        display
    }
}
