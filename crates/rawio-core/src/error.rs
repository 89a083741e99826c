//! Error types for the decode pipeline.

use std::fmt;

use thiserror::Error;

/// A numeric status returned by the external RAW decoder.
///
/// Negative values are decoder errors with a fixed message table, positive
/// values are operating-system error numbers, and zero is success. The
/// numbering follows LibRaw so that backends wrapping it can pass codes
/// through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const SUCCESS: StatusCode = StatusCode(0);
    pub const UNSPECIFIED_ERROR: StatusCode = StatusCode(-1);
    pub const FILE_UNSUPPORTED: StatusCode = StatusCode(-2);
    pub const REQUEST_FOR_NONEXISTENT_IMAGE: StatusCode = StatusCode(-3);
    pub const OUT_OF_ORDER_CALL: StatusCode = StatusCode(-4);
    pub const NO_THUMBNAIL: StatusCode = StatusCode(-5);
    pub const UNSUPPORTED_THUMBNAIL: StatusCode = StatusCode(-6);
    pub const INPUT_CLOSED: StatusCode = StatusCode(-7);
    pub const NOT_IMPLEMENTED: StatusCode = StatusCode(-8);
    pub const INSUFFICIENT_MEMORY: StatusCode = StatusCode(-100007);
    pub const DATA_ERROR: StatusCode = StatusCode(-100008);
    pub const IO_ERROR: StatusCode = StatusCode(-100009);
    pub const CANCELLED_BY_CALLBACK: StatusCode = StatusCode(-100010);
    pub const BAD_CROP: StatusCode = StatusCode(-100011);
    pub const TOO_BIG: StatusCode = StatusCode(-100012);

    pub fn code(self) -> i32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Human-readable description of the code.
    pub fn message(self) -> String {
        match self.0 {
            0 => "No error".to_string(),
            code if code > 0 => std::io::Error::from_raw_os_error(code).to_string(),
            code => decoder_message(code).to_string(),
        }
    }

    /// Map an I/O failure onto a status: its OS error number when it has
    /// one, otherwise the decoder's generic I/O error.
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) if code > 0 => StatusCode(code),
            _ => StatusCode::IO_ERROR,
        }
    }
}

fn decoder_message(code: i32) -> &'static str {
    match code {
        -1 => "Unspecified error",
        -2 => "Unsupported file format or not RAW file",
        -3 => "Request for nonexisting image number",
        -4 => "Out of order call of libraw function",
        -5 => "No thumbnail in file",
        -6 => "Unsupported thumbnail format",
        -7 => "No input stream, or input stream closed",
        -8 => "Decoder not implemented for this data format",
        -100007 => "Unsufficient memory",
        -100008 => "Corrupted data or unexpected EOF",
        -100009 => "Input/output error",
        -100010 => "Cancelled by user callback",
        -100011 => "Bad crop box",
        -100012 => "Image too big for processing",
        _ => "Unknown error code",
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.0)
    }
}

/// Error types for RAW decode operations.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The source stream is absent, not seekable or unreadable.
    #[error("Stream error: {0}")]
    Stream(String),

    /// The external decoder rejected the stream.
    #[error("Opening file failed: {0}")]
    DecoderOpen(StatusCode),

    /// Unpacking the preview or the sensor data failed.
    #[error("Unpacking failed: {0}")]
    DecoderUnpack(StatusCode),

    /// Processing or rendering the decoder output failed.
    #[error("Processing failed: {0}")]
    DecoderProcess(StatusCode),

    /// The embedded preview bytes could not be decoded as an image.
    #[error("Preview decode failed: {0}")]
    PreviewDecode(String),

    /// The decoder produced a bitmap with a channel count other than 1 or 3.
    #[error("Unsupported channel layout: {colors} channels")]
    UnsupportedChannelLayout { colors: u16 },

    /// The decoder produced samples that are not 8 or 16 bits wide.
    #[error("Unsupported sample depth: {bits} bits")]
    UnsupportedSampleDepth { bits: u16 },

    /// The bitmap holds fewer bytes than its header promises.
    #[error("Truncated bitmap: expected {expected} bytes, got {actual}")]
    TruncatedBitmap { expected: usize, actual: usize },

    /// A zero-sized image or target.
    #[error("Invalid size: {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    /// An operation that needs an opened session was called without one.
    #[error("Decode session is not open")]
    NotOpened,
}

impl DecodeError {
    /// The coarse error state exposed at the handler boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::Stream(_) => ErrorKind::DeviceError,
            DecodeError::UnsupportedChannelLayout { .. }
            | DecodeError::UnsupportedSampleDepth { .. } => ErrorKind::UnsupportedFormat,
            DecodeError::DecoderOpen(_)
            | DecodeError::DecoderUnpack(_)
            | DecodeError::DecoderProcess(_)
            | DecodeError::PreviewDecode(_)
            | DecodeError::TruncatedBitmap { .. }
            | DecodeError::InvalidSize { .. }
            | DecodeError::NotOpened => ErrorKind::InvalidData,
        }
    }
}

/// Observable failure state of the last handler operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The device was missing, not seekable or failed to read.
    DeviceError,
    /// The data could not be decoded.
    InvalidData,
    /// The data is in a layout this pipeline does not handle.
    UnsupportedFormat,
}
