//! rawio Core - camera RAW decode pipeline
//!
//! This crate turns a camera sensor file into a canonical RGBA buffer at a
//! caller-requested size and quality. The heavy lifting (demosaicing,
//! decompression) belongs to an external RAW decoder behind the
//! [`backend::RawBackend`] trait; this crate owns the decisions around it:
//!
//! - opening a stream and caching its metadata ([`session`])
//! - choosing between the embedded preview and a full decode ([`select`])
//! - converting decoder output to the canonical buffer ([`transcode`])
//! - correcting sensor orientation on the preview path ([`orient`])
//! - resampling to the exact requested size ([`scale`])
//!
//! [`handler::RawImageHandler`] wires these together for one logical image.
//!
//! # Example
//!
//! ```ignore
//! use rawio_core::{RawImageHandler, Size};
//!
//! let file = std::fs::File::open("photo.ARW")?;
//! let mut handler = RawImageHandler::new();
//! handler.set_device(file);
//! handler.set_target_size(Some(Size::new(800, 600)));
//! let image = handler.read().expect("decode failed");
//! assert_eq!((image.width, image.height), (800, 600));
//! ```

pub mod backend;
pub mod buffer;
pub mod capability;
pub mod error;
pub mod handler;
pub mod metadata;
pub mod options;
pub mod orient;
pub mod scale;
pub mod select;
pub mod session;
pub mod transcode;

pub use backend::{BackendFactory, ByteSource, RawBackend, RawloaderBackend};
pub use buffer::CanonicalImage;
pub use capability::{can_read_format, capabilities, RAW_EXTENSIONS};
pub use error::{DecodeError, ErrorKind, StatusCode};
pub use handler::{DecodeSummary, RawImageHandler};
pub use metadata::{FlipCode, ImageMetadata};
pub use options::{DecodeOptions, ImageOption, OptionValue, PixelFormat, Quality, Size};
pub use scale::FilterType;
pub use select::{select_path, DecodePath};
pub use session::DecodeSession;

/// Logging target shared by every component of the pipeline.
pub const LOG_TARGET: &str = "rawio::io";

/// Quality used when none was requested (same as the JPEG reader default).
pub const DEFAULT_QUALITY: i32 = 75;

/// At or above this quality the smooth resampling filter is used.
pub const HIGH_QUALITY_THRESHOLD: i32 = 50;
