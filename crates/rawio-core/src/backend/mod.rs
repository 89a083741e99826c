//! The seam between the pipeline and the external RAW decoder.
//!
//! A backend is created per decode session, opened once on a
//! [`StreamAdapter`], and asked for at most one [`ProcessedImage`]. Dropping
//! the backend releases every native resource it holds; dropping a
//! `ProcessedImage` releases the output buffer.
//!
//! The call order mirrors the usual RAW library lifecycle:
//!
//! ```text
//! open ─┬─ unpack_preview ─ make_preview ──► ProcessedImage
//!       └─ unpack ─ process ─ make_image ──► ProcessedImage
//! ```

mod embedded;
#[cfg(test)]
pub(crate) mod mock;
mod rawloader_backend;

use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::error::StatusCode;
use crate::metadata::ImageMetadata;

pub use self::embedded::{find_embedded_preview, is_tiff_container};
pub use self::rawloader_backend::RawloaderBackend;

/// A caller-supplied byte stream. Seekability is checked at open time.
pub trait ByteSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> ByteSource for T {}

/// Random-access view of a stream's contents handed to the decoder.
///
/// Cloning is cheap; clones share the same bytes.
#[derive(Debug, Clone)]
pub struct StreamAdapter {
    data: Arc<[u8]>,
}

impl StreamAdapter {
    /// Read the whole stream, starting from its beginning.
    pub fn from_stream(stream: &mut (dyn ByteSource + '_)) -> io::Result<Self> {
        stream.seek(SeekFrom::Start(0))?;
        let mut data = Vec::new();
        stream.read_to_end(&mut data)?;
        Ok(Self::from_bytes(data))
    }

    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A fresh reader positioned at the start of the data.
    pub fn cursor(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.data[..])
    }
}

/// A multi-channel bitmap rendered by the decoder.
///
/// Samples are interleaved per pixel, `bits / 8` bytes each in native byte
/// order. Three-channel bitmaps store their samples in library-native
/// order: index 0 is blue, 1 green, 2 red.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBitmap {
    pub width: u32,
    pub height: u32,
    /// Number of channels per pixel.
    pub colors: u16,
    /// Bits per channel sample.
    pub bits: u16,
    pub data: Vec<u8>,
}

/// The two shapes of decoder output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessedOutput {
    /// An encoded image (normally JPEG) exactly as embedded in the file.
    EncodedPreview { bytes: Vec<u8> },
    /// A decoded bitmap.
    RawBitmap(RawBitmap),
}

impl ProcessedOutput {
    pub fn is_encoded(&self) -> bool {
        matches!(self, ProcessedOutput::EncodedPreview { .. })
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Decoder output for exactly one request, released when dropped.
///
/// Backends whose output lives in foreign memory attach a release action;
/// it runs exactly once, whether the pipeline consumed the output or bailed
/// out early.
pub struct ProcessedImage {
    output: ProcessedOutput,
    release: Option<ReleaseFn>,
}

impl ProcessedImage {
    pub fn new(output: ProcessedOutput) -> Self {
        Self {
            output,
            release: None,
        }
    }

    pub fn with_release(output: ProcessedOutput, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            output,
            release: Some(Box::new(release)),
        }
    }

    pub fn output(&self) -> &ProcessedOutput {
        &self.output
    }
}

impl Drop for ProcessedImage {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for ProcessedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessedImage")
            .field("output", &self.output)
            .field("release", &self.release.is_some())
            .finish()
    }
}

/// Trait for external RAW decoders.
///
/// Each method returns the decoder's status code on failure. Implementations
/// release their handles in `Drop`.
pub trait RawBackend: Send {
    /// Parse the stream and report its metadata.
    fn open(&mut self, source: &StreamAdapter) -> Result<ImageMetadata, StatusCode>;

    /// Load the embedded preview.
    fn unpack_preview(&mut self) -> Result<(), StatusCode>;

    /// Hand out the embedded preview loaded by [`RawBackend::unpack_preview`].
    fn make_preview(&mut self) -> Result<ProcessedImage, StatusCode>;

    /// Load the sensor data.
    fn unpack(&mut self) -> Result<(), StatusCode>;

    /// Render the sensor data loaded by [`RawBackend::unpack`].
    fn process(&mut self) -> Result<(), StatusCode>;

    /// Hand out the image rendered by [`RawBackend::process`], already in
    /// display orientation.
    fn make_image(&mut self) -> Result<ProcessedImage, StatusCode>;
}

/// Creates one backend per decode session.
pub trait BackendFactory: Send + Sync {
    fn create(&self) -> Box<dyn RawBackend>;
}

impl<F> BackendFactory for F
where
    F: Fn() -> Box<dyn RawBackend> + Send + Sync,
{
    fn create(&self) -> Box<dyn RawBackend> {
        self()
    }
}

/// The factory used when the caller does not pick a backend.
pub fn default_factory() -> Arc<dyn BackendFactory> {
    Arc::new(|| Box::new(RawloaderBackend::new()) as Box<dyn RawBackend>)
}
