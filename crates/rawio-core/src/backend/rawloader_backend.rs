//! Default backend built on the `rawloader` crate.
//!
//! `rawloader` decodes the sensor data of most camera formats but does not
//! demosaic. Full processing here therefore renders what the sensor
//! delivered: three-sample pixels become a colour bitmap, mosaic data a
//! monochrome one. Either way the bitmap is normalised to the sensor's
//! black/white levels and already oriented for display.

use std::io::Cursor;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};

use image::{ImageBuffer, ImageReader, Luma, Pixel, Rgb};
use rawloader::{Orientation, RawImage, RawImageData};
use tracing::{debug, trace};

use super::embedded::find_embedded_preview;
use super::{ProcessedImage, ProcessedOutput, RawBackend, RawBitmap, StreamAdapter};
use crate::error::StatusCode;
use crate::metadata::{FlipCode, ImageMetadata};
use crate::options::Size;
use crate::LOG_TARGET;

/// RAW decoder built on top of `rawloader` plus an embedded-preview locator.
#[derive(Default)]
pub struct RawloaderBackend {
    source: Option<StreamAdapter>,
    raw: Option<RawImage>,
    preview: Option<Range<usize>>,
    unpacked_preview: Option<Vec<u8>>,
    unpacked: bool,
    rendered: Option<RawBitmap>,
}

impl RawloaderBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RawBackend for RawloaderBackend {
    fn open(&mut self, source: &StreamAdapter) -> Result<ImageMetadata, StatusCode> {
        let decoded = catch_unwind(AssertUnwindSafe(|| {
            rawloader::decode(&mut source.cursor())
        }));
        let raw = match decoded {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => {
                debug!(target: LOG_TARGET, "rawloader rejected stream: {err}");
                return Err(StatusCode::FILE_UNSUPPORTED);
            }
            Err(_) => {
                debug!(target: LOG_TARGET, "rawloader panicked while decoding stream");
                return Err(StatusCode::DATA_ERROR);
            }
        };

        let sensor = Frame::of(&raw)?.metadata();
        let preview = find_embedded_preview(source.bytes());
        let preview_size = preview
            .as_ref()
            .and_then(|range| encoded_dimensions(&source.bytes()[range.clone()]))
            .unwrap_or_default();

        let metadata = ImageMetadata {
            preview: preview_size,
            make: non_empty(&raw.make),
            model: non_empty(&raw.model),
            ..sensor
        };

        self.preview = preview.filter(|_| preview_size.is_valid());
        self.raw = Some(raw);
        self.source = Some(source.clone());
        Ok(metadata)
    }

    fn unpack_preview(&mut self) -> Result<(), StatusCode> {
        let source = self.source.as_ref().ok_or(StatusCode::INPUT_CLOSED)?;
        let range = self.preview.clone().ok_or(StatusCode::NO_THUMBNAIL)?;
        self.unpacked_preview = Some(source.bytes()[range].to_vec());
        Ok(())
    }

    fn make_preview(&mut self) -> Result<ProcessedImage, StatusCode> {
        let bytes = self
            .unpacked_preview
            .take()
            .ok_or(StatusCode::OUT_OF_ORDER_CALL)?;
        Ok(ProcessedImage::new(ProcessedOutput::EncodedPreview { bytes }))
    }

    fn unpack(&mut self) -> Result<(), StatusCode> {
        if self.raw.is_none() {
            return Err(StatusCode::INPUT_CLOSED);
        }
        self.unpacked = true;
        Ok(())
    }

    fn process(&mut self) -> Result<(), StatusCode> {
        if !self.unpacked {
            return Err(StatusCode::OUT_OF_ORDER_CALL);
        }
        let raw = self.raw.as_ref().ok_or(StatusCode::INPUT_CLOSED)?;
        self.rendered = Some(Frame::of(raw)?.render()?);
        Ok(())
    }

    fn make_image(&mut self) -> Result<ProcessedImage, StatusCode> {
        let bitmap = self.rendered.take().ok_or(StatusCode::OUT_OF_ORDER_CALL)?;
        Ok(ProcessedImage::new(ProcessedOutput::RawBitmap(bitmap)))
    }
}

impl Drop for RawloaderBackend {
    fn drop(&mut self) {
        trace!(target: LOG_TARGET, "releasing rawloader backend");
    }
}

/// Active sensor area after the decoder's crops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CropBox {
    top: usize,
    left: usize,
    width: usize,
    height: usize,
}

impl CropBox {
    /// `crops` is top, right, bottom, left.
    fn from_crops(full_width: usize, full_height: usize, crops: [usize; 4]) -> Option<Self> {
        let top = crops[0].min(full_height);
        let right = crops[1].min(full_width);
        let bottom = crops[2].min(full_height);
        let left = crops[3].min(full_width);

        let width = full_width.saturating_sub(left.saturating_add(right));
        let height = full_height.saturating_sub(top.saturating_add(bottom));
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            top,
            left,
            width,
            height,
        })
    }
}

fn flip_code(orientation: Orientation) -> FlipCode {
    match orientation {
        Orientation::Normal | Orientation::Unknown => FlipCode::None,
        Orientation::Rotate180 => FlipCode::Rotate180,
        Orientation::Rotate270 => FlipCode::RotateCcw90,
        Orientation::Rotate90 => FlipCode::RotateCw90,
        Orientation::HorizontalFlip => FlipCode::Other(1),
        Orientation::VerticalFlip => FlipCode::Other(2),
        Orientation::Transpose => FlipCode::Transpose,
        Orientation::Transverse => FlipCode::Transverse,
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Dimensions from an encoded image's header, without decoding pixels.
fn encoded_dimensions(bytes: &[u8]) -> Option<Size> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    let (width, height) = reader.into_dimensions().ok()?;
    Some(Size::new(width, height))
}

/// Maps sensor samples onto the full 16-bit range.
struct Levels {
    black: f32,
    scale: f32,
}

impl Levels {
    fn new(blacklevels: [u16; 4], whitelevels: [u16; 4]) -> Self {
        let black = blacklevels.iter().map(|&v| v as f32).sum::<f32>() / 4.0;
        let white = whitelevels.iter().copied().max().unwrap_or(u16::MAX) as f32;
        Self {
            black,
            scale: (white - black).max(1.0),
        }
    }

    #[inline]
    fn integer(&self, sample: u16) -> u16 {
        let norm = ((sample as f32 - self.black) / self.scale).clamp(0.0, 1.0);
        (norm * u16::MAX as f32).round() as u16
    }

    #[inline]
    fn float(sample: f32) -> u16 {
        (sample.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16
    }
}

/// The parts of a decoded [`RawImage`] needed to describe and render it.
struct Frame<'a> {
    full_width: usize,
    cpp: usize,
    crop: CropBox,
    levels: Levels,
    orientation: Orientation,
    data: &'a RawImageData,
}

impl<'a> Frame<'a> {
    fn of(raw: &'a RawImage) -> Result<Self, StatusCode> {
        let crop =
            CropBox::from_crops(raw.width, raw.height, raw.crops).ok_or(StatusCode::DATA_ERROR)?;
        Ok(Self {
            full_width: raw.width,
            cpp: raw.cpp,
            crop,
            levels: Levels::new(raw.blacklevels, raw.whitelevels),
            orientation: raw.orientation,
            data: &raw.data,
        })
    }

    /// Stored size and flip of the cropped sensor area.
    fn metadata(&self) -> ImageMetadata {
        ImageMetadata {
            width: self.crop.width as u32,
            height: self.crop.height as u32,
            flip: flip_code(self.orientation),
            ..Default::default()
        }
    }

    fn render(&self) -> Result<RawBitmap, StatusCode> {
        let (crop, cpp) = (self.crop, self.cpp);
        if cpp != 1 && cpp != 3 {
            debug!(target: LOG_TARGET, "cannot render {cpp} samples per pixel");
            return Err(StatusCode::NOT_IMPLEMENTED);
        }

        let mut samples = Vec::with_capacity(crop.width * crop.height * cpp);
        for y in 0..crop.height {
            let start = ((y + crop.top) * self.full_width + crop.left) * cpp;
            let end = start + crop.width * cpp;
            match self.data {
                RawImageData::Integer(data) => {
                    let row = data.get(start..end).ok_or(StatusCode::DATA_ERROR)?;
                    samples.extend(row.iter().map(|&v| self.levels.integer(v)));
                }
                RawImageData::Float(data) => {
                    let row = data.get(start..end).ok_or(StatusCode::DATA_ERROR)?;
                    samples.extend(row.iter().map(|&v| Levels::float(v)));
                }
            }
        }

        let (width, height) = (crop.width as u32, crop.height as u32);
        let (samples, width, height) = if cpp == 3 {
            let buf = ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, samples)
                .ok_or(StatusCode::DATA_ERROR)?;
            let oriented = orient(buf, self.orientation);
            let (w, h) = oriented.dimensions();
            (oriented.into_raw(), w, h)
        } else {
            let buf = ImageBuffer::<Luma<u16>, _>::from_raw(width, height, samples)
                .ok_or(StatusCode::DATA_ERROR)?;
            let oriented = orient(buf, self.orientation);
            let (w, h) = oriented.dimensions();
            (oriented.into_raw(), w, h)
        };

        Ok(RawBitmap {
            width,
            height,
            colors: cpp as u16,
            bits: 16,
            data: to_native_bytes(&samples, cpp),
        })
    }
}

fn orient<P>(buf: ImageBuffer<P, Vec<u16>>, orientation: Orientation) -> ImageBuffer<P, Vec<u16>>
where
    P: Pixel<Subpixel = u16> + 'static,
{
    use image::imageops::{flip_horizontal, flip_vertical, rotate180, rotate270, rotate90};

    match orientation {
        Orientation::Normal | Orientation::Unknown => buf,
        Orientation::HorizontalFlip => flip_horizontal(&buf),
        Orientation::VerticalFlip => flip_vertical(&buf),
        Orientation::Rotate180 => rotate180(&buf),
        Orientation::Rotate90 => rotate90(&buf),
        Orientation::Rotate270 => rotate270(&buf),
        Orientation::Transpose => flip_horizontal(&rotate90(&buf)),
        Orientation::Transverse => flip_vertical(&rotate90(&buf)),
    }
}

/// Serialise samples in native byte order; RGB pixels are written as B, G, R.
fn to_native_bytes(samples: &[u16], cpp: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    if cpp == 3 {
        for px in samples.chunks_exact(3) {
            for &s in [px[2], px[1], px[0]].iter() {
                out.extend_from_slice(&s.to_ne_bytes());
            }
        }
    } else {
        for &s in samples {
            out.extend_from_slice(&s.to_ne_bytes());
        }
    }
    out
}
