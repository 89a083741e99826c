//! Decode session: one opened stream and its decoder handle.

use std::io::{Seek, SeekFrom};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::backend::{BackendFactory, ByteSource, ProcessedImage, RawBackend, StreamAdapter};
use crate::error::{DecodeError, StatusCode};
use crate::metadata::ImageMetadata;
use crate::select::DecodePath;
use crate::LOG_TARGET;

/// Everything a successful open leaves behind.
struct OpenedSession {
    metadata: ImageMetadata,
    backend: Box<dyn RawBackend>,
    source: StreamAdapter,
}

enum SessionState {
    Unopened,
    Opened(OpenedSession),
    /// The decoder rejected the last stream; a new `open` may retry.
    Failed(DecodeError),
}

/// Owns the decoder handle and stream adapter for one logical image.
///
/// Opening is idempotent: once opened, further `open` calls return the
/// cached metadata without touching the decoder again. Native resources are
/// released on [`DecodeSession::close`], on a failed open, and on drop.
pub struct DecodeSession {
    factory: Arc<dyn BackendFactory>,
    state: SessionState,
}

impl DecodeSession {
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            state: SessionState::Unopened,
        }
    }

    /// Open `stream` and capture its metadata.
    ///
    /// Returns the cached metadata if the session is already open. A missing
    /// or unseekable stream fails with [`DecodeError::Stream`] and leaves the
    /// session untouched; a decoder rejection fails with
    /// [`DecodeError::DecoderOpen`] and leaves it `Failed`.
    pub fn open(
        &mut self,
        stream: Option<&mut (dyn ByteSource + '_)>,
    ) -> Result<&ImageMetadata, DecodeError> {
        if !self.is_open() {
            let stream =
                stream.ok_or_else(|| DecodeError::Stream("no device set".to_string()))?;
            match open_stream(self.factory.as_ref(), stream) {
                Ok(opened) => {
                    debug!(
                        target: LOG_TARGET,
                        "opened {}x{} image, flip {}, preview {}",
                        opened.metadata.width,
                        opened.metadata.height,
                        opened.metadata.flip.code(),
                        opened.metadata.preview
                    );
                    self.state = SessionState::Opened(opened);
                }
                Err(err @ DecodeError::Stream(_)) => return Err(err),
                Err(err) => {
                    self.state = SessionState::Failed(err.clone());
                    return Err(err);
                }
            }
        }
        self.metadata().ok_or(DecodeError::NotOpened)
    }

    /// Cached metadata, if the session is open.
    pub fn metadata(&self) -> Option<&ImageMetadata> {
        match &self.state {
            SessionState::Opened(opened) => Some(&opened.metadata),
            _ => None,
        }
    }

    /// The stream contents the decoder reads from, if the session is open.
    pub fn source(&self) -> Option<&StreamAdapter> {
        match &self.state {
            SessionState::Opened(opened) => Some(&opened.source),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Opened(_))
    }

    /// The error that left the session `Failed`, if any.
    pub fn failure(&self) -> Option<&DecodeError> {
        match &self.state {
            SessionState::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Ask the decoder for one processed image along `path`.
    pub fn produce(&mut self, path: DecodePath) -> Result<ProcessedImage, DecodeError> {
        let opened = match &mut self.state {
            SessionState::Opened(opened) => opened,
            _ => return Err(DecodeError::NotOpened),
        };
        let backend = opened.backend.as_mut();

        match path {
            DecodePath::UseThumbnail => {
                backend
                    .unpack_preview()
                    .map_err(|code| unpack_failed("preview", code))?;
                backend
                    .make_preview()
                    .map_err(|code| process_failed("preview", code))
            }
            DecodePath::UseFullDecode => {
                backend
                    .unpack()
                    .map_err(|code| unpack_failed("image", code))?;
                backend
                    .process()
                    .map_err(|code| process_failed("image", code))?;
                backend
                    .make_image()
                    .map_err(|code| process_failed("image", code))
            }
        }
    }

    /// Release the decoder handle and stream adapter. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.is_open() {
            trace!(target: LOG_TARGET, "closing decode session");
        }
        self.state = SessionState::Unopened;
    }
}

impl std::fmt::Debug for DecodeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            SessionState::Unopened => "Unopened",
            SessionState::Opened(_) => "Opened",
            SessionState::Failed(_) => "Failed",
        };
        f.debug_struct("DecodeSession")
            .field("state", &state)
            .field("metadata", &self.metadata())
            .finish()
    }
}

fn open_stream(
    factory: &dyn BackendFactory,
    stream: &mut (dyn ByteSource + '_),
) -> Result<OpenedSession, DecodeError> {
    let start = stream
        .stream_position()
        .map_err(|err| DecodeError::Stream(format!("device is not seekable: {err}")))?;

    let result = buffer_stream(stream).and_then(|source| {
        let mut backend = factory.create();
        match backend.open(&source) {
            Ok(metadata) => Ok(OpenedSession {
                metadata,
                backend,
                source,
            }),
            Err(code) => {
                debug!(target: LOG_TARGET, "error opening file: {code}");
                Err(DecodeError::DecoderOpen(code))
            }
        }
    });

    if result.is_err() {
        // Best effort; the open error is what the caller needs to see.
        let _ = stream.seek(SeekFrom::Start(start));
    }
    result
}

fn buffer_stream(stream: &mut (dyn ByteSource + '_)) -> Result<StreamAdapter, DecodeError> {
    StreamAdapter::from_stream(stream)
        .map_err(|err| DecodeError::Stream(format!("failed to read device: {err}")))
}

fn unpack_failed(what: &str, code: StatusCode) -> DecodeError {
    warn!(target: LOG_TARGET, "error unpacking {what}: {code}");
    DecodeError::DecoderUnpack(code)
}

fn process_failed(what: &str, code: StatusCode) -> DecodeError {
    warn!(target: LOG_TARGET, "error processing {what}: {code}");
    DecodeError::DecoderProcess(code)
}
