//! Sensor metadata captured when a session opens.

use serde::{Deserialize, Serialize};

use crate::options::Size;

/// Sensor-reported orientation, using the RAW decoder's flip numbering.
///
/// Codes carrying the transpose bit (4) swap width and height. Only the codes
/// the pipeline acts on get their own variant; mirror-only codes are carried
/// through as [`FlipCode::Other`] and treated like no flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlipCode {
    /// No transformation needed (code 0).
    #[default]
    None,
    /// Rotate 180 degrees (code 3).
    Rotate180,
    /// Mirror across the main diagonal; width and height swap (code 4).
    Transpose,
    /// Rotate 90 degrees counter-clockwise; width and height swap (code 5).
    RotateCcw90,
    /// Rotate 90 degrees clockwise; width and height swap (code 6).
    RotateCw90,
    /// Mirror across the anti-diagonal; width and height swap (code 7).
    Transverse,
    /// Any other code reported by the decoder.
    Other(i32),
}

impl FlipCode {
    /// Returns true if this flip swaps the image dimensions.
    #[inline]
    pub fn transposes(self) -> bool {
        matches!(
            self,
            FlipCode::Transpose
                | FlipCode::RotateCcw90
                | FlipCode::RotateCw90
                | FlipCode::Transverse
        )
    }

    /// The numeric code as the decoder reports it.
    pub fn code(self) -> i32 {
        match self {
            FlipCode::None => 0,
            FlipCode::Rotate180 => 3,
            FlipCode::Transpose => 4,
            FlipCode::RotateCcw90 => 5,
            FlipCode::RotateCw90 => 6,
            FlipCode::Transverse => 7,
            FlipCode::Other(code) => code,
        }
    }
}

impl From<i32> for FlipCode {
    fn from(value: i32) -> Self {
        match value {
            0 => FlipCode::None,
            3 => FlipCode::Rotate180,
            4 => FlipCode::Transpose,
            5 => FlipCode::RotateCcw90,
            6 => FlipCode::RotateCw90,
            7 => FlipCode::Transverse,
            other => FlipCode::Other(other),
        }
    }
}

/// Metadata extracted when a RAW stream is opened.
///
/// `width`/`height` and `preview` are as stored in the file, before any
/// orientation correction. Use [`ImageMetadata::default_size`] and
/// [`ImageMetadata::preview_size`] for anything compared against a
/// requested size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Sensor image width in pixels (before orientation correction).
    pub width: u32,
    /// Sensor image height in pixels (before orientation correction).
    pub height: u32,
    /// Orientation reported by the decoder.
    pub flip: FlipCode,
    /// Embedded preview size (before orientation correction); 0x0 if the
    /// file carries none.
    pub preview: Size,
    /// Camera make (e.g., "Sony").
    pub make: Option<String>,
    /// Camera model (e.g., "ILCE-6600").
    pub model: Option<String>,
}

impl ImageMetadata {
    /// The native display size: sensor size, transposed when the flip
    /// swaps dimensions.
    pub fn default_size(&self) -> Size {
        orient_size(Size::new(self.width, self.height), self.flip)
    }

    /// The embedded preview's display size.
    pub fn preview_size(&self) -> Size {
        orient_size(self.preview, self.flip)
    }
}

fn orient_size(size: Size, flip: FlipCode) -> Size {
    if flip.transposes() {
        size.transposed()
    } else {
        size
    }
}
