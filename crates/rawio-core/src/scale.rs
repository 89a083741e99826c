//! Resampling to the exact requested output size.
//!
//! The output always has the requested width and height; aspect ratio is
//! not preserved.

use crate::buffer::CanonicalImage;
use crate::error::DecodeError;
use crate::options::{Quality, Size};
use crate::HIGH_QUALITY_THRESHOLD;

/// Filter type for image resizing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    /// Nearest neighbor interpolation (fastest, lowest quality).
    Nearest,
    /// Bilinear interpolation (smooth).
    #[default]
    Bilinear,
}

impl FilterType {
    /// Convert to the image crate's FilterType.
    pub fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            FilterType::Nearest => image::imageops::FilterType::Nearest,
            FilterType::Bilinear => image::imageops::FilterType::Triangle,
        }
    }

    /// The filter for a decode: smooth at high quality or when the
    /// embedded preview was used, nearest otherwise.
    pub fn for_request(quality: Quality, used_thumbnail: bool) -> Self {
        if used_thumbnail || quality.value() >= HIGH_QUALITY_THRESHOLD {
            FilterType::Bilinear
        } else {
            FilterType::Nearest
        }
    }
}

/// Resize an image to exact dimensions.
///
/// # Arguments
///
/// * `image` - The source image, consumed
/// * `size` - Target size in pixels
/// * `filter` - Interpolation filter to use
///
/// # Returns
///
/// The image itself when it already has the target size, otherwise a new
/// image with exactly that size.
///
/// # Errors
///
/// Returns `DecodeError::InvalidSize` if either target dimension is zero.
/// Returns `DecodeError::TruncatedBitmap` if the source buffer is shorter
/// than its dimensions require.
pub fn scale_to(
    image: CanonicalImage,
    size: Size,
    filter: FilterType,
) -> Result<CanonicalImage, DecodeError> {
    if !size.is_valid() {
        return Err(DecodeError::InvalidSize {
            width: size.width,
            height: size.height,
        });
    }

    if image.width == size.width && image.height == size.height {
        return Ok(image);
    }

    let expected = image.width as usize * image.height as usize * crate::buffer::BYTES_PER_PIXEL;
    let actual = image.pixels.len();
    let rgba = image
        .into_rgba_image()
        .ok_or(DecodeError::TruncatedBitmap { expected, actual })?;

    let resized = image::imageops::resize(&rgba, size.width, size.height, filter.to_image_filter());
    Ok(CanonicalImage::from_rgba_image(resized))
}
