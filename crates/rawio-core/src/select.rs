//! Thumbnail-versus-full-decode decision.

use crate::options::{Quality, Size};
use crate::DEFAULT_QUALITY;

/// Where the pixels of a decode come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePath {
    /// Decode the embedded preview.
    UseThumbnail,
    /// Unpack and process the sensor data.
    UseFullDecode,
}

impl DecodePath {
    pub fn is_thumbnail(self) -> bool {
        self == DecodePath::UseThumbnail
    }
}

/// Pick the decode path for a request.
///
/// The embedded preview is used when it would not need enlarging, or when
/// quality is at most the default and the preview matches the final size in
/// hundreds of pixels. The hundreds comparison truncates, so 1599 and 1500
/// match while 1599 and 1600 do not.
///
/// `final_size` and `preview` must both be display sizes.
pub fn select_path(final_size: Size, quality: Quality, preview: Size) -> DecodePath {
    let same_bucket = final_size.width / 100 == preview.width / 100
        && final_size.height / 100 == preview.height / 100;

    if (quality.value() <= DEFAULT_QUALITY && same_bucket) || final_size.fits_within(preview) {
        DecodePath::UseThumbnail
    } else {
        DecodePath::UseFullDecode
    }
}
