//! The canonical pixel buffer handed to callers.

use image::RgbaImage;

/// Bytes per pixel in a [`CanonicalImage`].
pub const BYTES_PER_PIXEL: usize = 4;

/// A decoded image with 4 bytes per pixel (R, G, B, A) in row-major order.
///
/// This is the only pixel representation that leaves the pipeline. The
/// fourth byte carries no meaning for RAW sources; the pipeline fills it
/// with `0xFF`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalImage {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// RGBA pixel data, `width * height * 4` bytes.
    pub pixels: Vec<u8>,
}

impl CanonicalImage {
    /// Create a new CanonicalImage with the given dimensions and pixel data.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(
            pixels.len(),
            width as usize * height as usize * BYTES_PER_PIXEL,
            "Pixel buffer size mismatch"
        );
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Create a CanonicalImage from an image::RgbaImage without copying.
    pub fn from_rgba_image(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            pixels: img.into_raw(),
        }
    }

    /// Convert into an image::RgbaImage, reusing the pixel allocation.
    pub fn into_rgba_image(self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels)
    }

    /// Dimensions as a `(width, height)` pair.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The four bytes of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let px = self.pixels.get(offset..offset + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Check if this is an empty/invalid image.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.pixels.is_empty()
    }
}
