//! Format capability queries.

use std::io::SeekFrom;
use std::sync::Arc;

use tracing::debug;

use crate::backend::{BackendFactory, ByteSource};
use crate::session::DecodeSession;
use crate::LOG_TARGET;

/// File extensions answered with "can read" without looking at the data.
pub const RAW_EXTENSIONS: &[&str] = &[
    "arw", "crw", "cr2", "dng", "nef", "raf", "kderaw", "dcr", "k25", "kdc", "mrw", "nrw", "orf",
    "raw", "raw2", "rw", "rw2", "pef", "srw", "x3f", "sr2", "srf", "tif", "tiff",
];

/// Answer a capability query from the format token alone.
///
/// Returns `None` for an empty token, meaning the stream has to be probed.
/// Matching ignores case and a leading dot.
pub fn can_read_format(format: &str) -> Option<bool> {
    let token = format.trim().trim_start_matches('.');
    if token.is_empty() {
        return None;
    }
    Some(
        RAW_EXTENSIONS
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(token)),
    )
}

/// Try opening `device` with a throwaway session.
///
/// The device is left at the position it had before the probe.
pub fn probe(device: &mut (dyn ByteSource + '_), factory: Arc<dyn BackendFactory>) -> bool {
    let Ok(start) = device.stream_position() else {
        debug!(target: LOG_TARGET, "cannot probe unseekable device");
        return false;
    };

    let mut session = DecodeSession::new(factory);
    let opened = session.open(Some(&mut *device)).is_ok();
    session.close();

    if device.seek(SeekFrom::Start(start)).is_err() {
        debug!(target: LOG_TARGET, "failed to restore device position after probe");
    }
    opened
}

/// Whether the pipeline can read `format`, probing `device` when the
/// format token is empty.
pub fn capabilities(
    device: Option<&mut (dyn ByteSource + '_)>,
    format: &str,
    factory: Arc<dyn BackendFactory>,
) -> bool {
    if let Some(known) = can_read_format(format) {
        return known;
    }
    match device {
        Some(device) => probe(device, factory),
        None => false,
    }
}
