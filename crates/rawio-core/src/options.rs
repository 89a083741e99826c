//! Decode options and the handler's option surface.

use serde::{Deserialize, Serialize};

use crate::DEFAULT_QUALITY;

/// A width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A size is usable as a resample target only when both sides are non-zero.
    pub fn is_valid(self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Swap width and height.
    pub fn transposed(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// Component-wise `<=`.
    pub fn fits_within(self, other: Size) -> bool {
        self.width <= other.width && self.height <= other.height
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Decode quality in `0..=100`.
///
/// `-1` is the "use the default" sentinel and normalizes to 75. Any other
/// out-of-range value is clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub struct Quality(i32);

impl Quality {
    pub fn new(value: i32) -> Self {
        if value == -1 {
            return Self::default();
        }
        Self(value.clamp(0, 100))
    }

    pub fn value(self) -> i32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(DEFAULT_QUALITY)
    }
}

impl From<i32> for Quality {
    fn from(value: i32) -> Self {
        Self::new(value)
    }
}

impl From<Quality> for i32 {
    fn from(quality: Quality) -> Self {
        quality.0
    }
}

/// Options settable before a decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Exact output size. `None` (or an invalid size) means the native
    /// display size.
    #[serde(default)]
    pub target_size: Option<Size>,
    /// Decode quality.
    #[serde(default)]
    pub quality: Quality,
}

impl DecodeOptions {
    /// The size the pipeline must produce, given the image's display size.
    pub fn final_size(&self, default_size: Size) -> Size {
        match self.target_size {
            Some(size) if size.is_valid() => size,
            _ => default_size,
        }
    }
}

/// Pixel layout of decoded images. Fixed for this pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Four 8-bit channels: red, green, blue and an unused fourth byte.
    Rgbx8888,
}

impl PixelFormat {
    pub fn channels(self) -> u32 {
        4
    }

    pub fn bits_per_channel(self) -> u32 {
        8
    }
}

/// Option keys understood by [`crate::RawImageHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOption {
    /// Output pixel format (read-only).
    ImageFormat,
    /// Native display size (read-only, opens the stream if needed).
    Size,
    /// Requested output size.
    ScaledSize,
    /// Decode quality.
    Quality,
}

/// Values carried by [`ImageOption`] queries and updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionValue {
    Format(PixelFormat),
    Size(Size),
    Int(i32),
}
