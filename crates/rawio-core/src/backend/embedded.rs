//! Locating the embedded JPEG preview inside a RAW container.
//!
//! Most RAW formats are TIFF-based and keep a large preview in a SubIFD, a
//! smaller one in IFD1, and sometimes one referenced straight from IFD0.
//! Those are tried in that order; as a last resort the file is scanned for
//! JPEG markers, which also covers non-TIFF containers.

use std::ops::Range;

const TIFF_MAGIC_LE: [u8; 4] = [0x49, 0x49, 0x2A, 0x00]; // II + 42
const TIFF_MAGIC_BE: [u8; 4] = [0x4D, 0x4D, 0x00, 0x2A]; // MM + 42

const TAG_COMPRESSION: u16 = 0x0103;
const TAG_STRIP_OFFSETS: u16 = 0x0111;
const TAG_STRIP_BYTE_COUNTS: u16 = 0x0117;
const TAG_SUBIFD: u16 = 0x014A;
const TAG_JPEG_OFFSET: u16 = 0x0201; // JpegInterchangeFormat
const TAG_JPEG_LENGTH: u16 = 0x0202; // JpegInterchangeFormatLength

const COMPRESSION_JPEG: u32 = 6;
const COMPRESSION_JPEG_OLD: u32 = 7;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

const IFD_ENTRY_SIZE: usize = 12;
const MAX_IFD_ENTRIES: usize = 1000;

/// A SubIFD JPEG smaller than this is a thumbnail, not the preview.
const MIN_SUBIFD_PREVIEW: usize = 10_000;
/// Marker scanning skips the TIFF structure at the start of the file.
const SCAN_SKIP: usize = 8192;
/// Marker scanning only accepts JPEGs at least this large.
const MIN_SCANNED_PREVIEW: usize = 50_000;

/// Check for a TIFF header (used by most RAW formats).
pub fn is_tiff_container(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && (bytes[..4] == TIFF_MAGIC_LE || bytes[..4] == TIFF_MAGIC_BE)
}

/// Find the byte range of the embedded JPEG preview, if any.
pub fn find_embedded_preview(bytes: &[u8]) -> Option<Range<usize>> {
    if is_tiff_container(bytes) {
        if let Some(range) = find_in_tiff(bytes) {
            return Some(range);
        }
    }
    scan_for_jpeg(bytes)
}

fn find_in_tiff(bytes: &[u8]) -> Option<Range<usize>> {
    let tiff = Tiff {
        bytes,
        little_endian: bytes[..4] == TIFF_MAGIC_LE,
    };
    let ifd0 = tiff.read_ifd(tiff.u32_at(4)? as usize)?;

    if let Some(subifd) = ifd0.entry(TAG_SUBIFD).filter(|e| e.count > 0) {
        let preview = tiff
            .read_ifd(subifd.value as usize)
            .and_then(|ifd| tiff.jpeg_in(&ifd));
        if let Some(range) = preview.filter(|r| r.len() > MIN_SUBIFD_PREVIEW) {
            return Some(range);
        }
    }

    if ifd0.next != 0 {
        if let Some(range) = tiff
            .read_ifd(ifd0.next as usize)
            .and_then(|ifd| tiff.jpeg_in(&ifd))
        {
            return Some(range);
        }
    }

    tiff.jpeg_in(&ifd0)
}

#[derive(Debug, Clone, Copy)]
struct IfdEntry {
    tag: u16,
    count: u32,
    value: u32,
}

#[derive(Debug)]
struct Ifd {
    entries: Vec<IfdEntry>,
    next: u32,
}

impl Ifd {
    fn entry(&self, tag: u16) -> Option<IfdEntry> {
        self.entries.iter().copied().find(|e| e.tag == tag)
    }

    fn value(&self, tag: u16) -> Option<u32> {
        self.entry(tag).map(|e| e.value)
    }
}

struct Tiff<'a> {
    bytes: &'a [u8],
    little_endian: bool,
}

impl Tiff<'_> {
    fn u16_at(&self, offset: usize) -> Option<u16> {
        let raw: [u8; 2] = self.bytes.get(offset..offset.checked_add(2)?)?.try_into().ok()?;
        Some(if self.little_endian {
            u16::from_le_bytes(raw)
        } else {
            u16::from_be_bytes(raw)
        })
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        let raw: [u8; 4] = self.bytes.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
        Some(if self.little_endian {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        })
    }

    fn read_ifd(&self, offset: usize) -> Option<Ifd> {
        let count = self.u16_at(offset)? as usize;
        if count > MAX_IFD_ENTRIES {
            return None;
        }

        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let at = offset + 2 + i * IFD_ENTRY_SIZE;
            let tag = self.u16_at(at)?;
            let count = self.u32_at(at + 4)?;
            let value = match self.u16_at(at + 2)? {
                // SHORT values sit in the first two bytes of the value field
                3 if count == 1 => self.u16_at(at + 8)? as u32,
                _ => self.u32_at(at + 8)?,
            };
            entries.push(IfdEntry { tag, count, value });
        }

        let next = self
            .u32_at(offset + 2 + count * IFD_ENTRY_SIZE)
            .unwrap_or(0);
        Some(Ifd { entries, next })
    }

    fn jpeg_in(&self, ifd: &Ifd) -> Option<Range<usize>> {
        if let (Some(offset), Some(length)) =
            (ifd.value(TAG_JPEG_OFFSET), ifd.value(TAG_JPEG_LENGTH))
        {
            if let Some(range) = self.jpeg_range(offset, length) {
                return Some(range);
            }
        }

        let compressed = matches!(
            ifd.value(TAG_COMPRESSION),
            Some(COMPRESSION_JPEG | COMPRESSION_JPEG_OLD)
        );
        if compressed {
            if let (Some(offset), Some(length)) =
                (ifd.value(TAG_STRIP_OFFSETS), ifd.value(TAG_STRIP_BYTE_COUNTS))
            {
                return self.jpeg_range(offset, length);
            }
        }
        None
    }

    /// The range, if it lies inside the file and starts with a JPEG SOI.
    fn jpeg_range(&self, offset: u32, length: u32) -> Option<Range<usize>> {
        let start = offset as usize;
        let end = start.checked_add(length as usize)?;
        if length == 0 || end > self.bytes.len() {
            return None;
        }
        self.bytes[start..end]
            .starts_with(&JPEG_SOI)
            .then_some(start..end)
    }
}

fn find_marker(bytes: &[u8], from: usize, marker: [u8; 2]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(2)
        .position(|w| w == marker.as_slice())
        .map(|pos| pos + from)
}

/// First SOI past the header whose matching EOI yields a preview-sized JPEG.
fn scan_for_jpeg(bytes: &[u8]) -> Option<Range<usize>> {
    let start = find_marker(bytes, SCAN_SKIP.min(bytes.len()), JPEG_SOI)?;
    let end = find_marker(bytes, start + MIN_SCANNED_PREVIEW - 2, JPEG_EOI)?;
    Some(start..end + 2)
}
