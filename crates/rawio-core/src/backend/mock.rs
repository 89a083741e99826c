//! Scriptable backend for pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{
    BackendFactory, ProcessedImage, ProcessedOutput, RawBackend, RawBitmap, StreamAdapter,
};
use crate::error::StatusCode;
use crate::metadata::ImageMetadata;

/// Call counters shared between a factory and every backend it creates.
#[derive(Debug, Default)]
pub(crate) struct MockCounters {
    pub created: AtomicUsize,
    pub live: AtomicUsize,
    pub opens: AtomicUsize,
    pub unpack_preview: AtomicUsize,
    pub unpack: AtomicUsize,
    pub process: AtomicUsize,
    pub releases: AtomicUsize,
}

impl MockCounters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// What every backend created by a [`MockFactory`] will do.
#[derive(Debug, Clone)]
pub(crate) struct MockScript {
    pub open: Result<ImageMetadata, StatusCode>,
    pub preview: Result<Vec<u8>, StatusCode>,
    pub bitmap: Result<RawBitmap, StatusCode>,
}

impl MockScript {
    pub fn with_metadata(metadata: ImageMetadata) -> Self {
        Self {
            open: Ok(metadata),
            preview: Err(StatusCode::NO_THUMBNAIL),
            bitmap: Err(StatusCode::NOT_IMPLEMENTED),
        }
    }

    pub fn failing_open(code: StatusCode) -> Self {
        Self {
            open: Err(code),
            preview: Err(StatusCode::NO_THUMBNAIL),
            bitmap: Err(StatusCode::NOT_IMPLEMENTED),
        }
    }

    pub fn preview(mut self, bytes: Vec<u8>) -> Self {
        self.preview = Ok(bytes);
        self
    }

    pub fn bitmap(mut self, bitmap: RawBitmap) -> Self {
        self.bitmap = Ok(bitmap);
        self
    }
}

pub(crate) struct MockFactory {
    pub script: MockScript,
    pub counters: Arc<MockCounters>,
}

impl MockFactory {
    pub fn new(script: MockScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            counters: Arc::new(MockCounters::default()),
        })
    }
}

impl BackendFactory for MockFactory {
    fn create(&self) -> Box<dyn RawBackend> {
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        Box::new(MockBackend {
            script: self.script.clone(),
            counters: Arc::clone(&self.counters),
            preview_ready: false,
            image_ready: false,
        })
    }
}

pub(crate) struct MockBackend {
    script: MockScript,
    counters: Arc<MockCounters>,
    preview_ready: bool,
    image_ready: bool,
}

impl MockBackend {
    fn output(&self, output: ProcessedOutput) -> ProcessedImage {
        let counters = Arc::clone(&self.counters);
        ProcessedImage::with_release(output, move || {
            counters.releases.fetch_add(1, Ordering::SeqCst);
        })
    }
}

impl RawBackend for MockBackend {
    fn open(&mut self, _source: &StreamAdapter) -> Result<ImageMetadata, StatusCode> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.script.open.clone()
    }

    fn unpack_preview(&mut self) -> Result<(), StatusCode> {
        self.counters.unpack_preview.fetch_add(1, Ordering::SeqCst);
        self.script.preview.as_ref().map_err(|code| *code)?;
        self.preview_ready = true;
        Ok(())
    }

    fn make_preview(&mut self) -> Result<ProcessedImage, StatusCode> {
        if !self.preview_ready {
            return Err(StatusCode::OUT_OF_ORDER_CALL);
        }
        let bytes = self.script.preview.clone()?;
        Ok(self.output(ProcessedOutput::EncodedPreview { bytes }))
    }

    fn unpack(&mut self) -> Result<(), StatusCode> {
        self.counters.unpack.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn process(&mut self) -> Result<(), StatusCode> {
        self.counters.process.fetch_add(1, Ordering::SeqCst);
        self.script.bitmap.as_ref().map_err(|code| *code)?;
        self.image_ready = true;
        Ok(())
    }

    fn make_image(&mut self) -> Result<ProcessedImage, StatusCode> {
        if !self.image_ready {
            return Err(StatusCode::OUT_OF_ORDER_CALL);
        }
        let bitmap = self.script.bitmap.clone()?;
        Ok(self.output(ProcessedOutput::RawBitmap(bitmap)))
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A JPEG of the given size filled with one colour.
pub(crate) fn jpeg_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    encode(
        image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb(rgb),
        )),
        image::ImageFormat::Jpeg,
    )
}

pub(crate) fn png_bytes(img: image::RgbImage) -> Vec<u8> {
    encode(image::DynamicImage::ImageRgb8(img), image::ImageFormat::Png)
}

fn encode(img: image::DynamicImage, format: image::ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

/// An 8-bit, 3-channel bitmap in decoder order (B, G, R per pixel).
pub(crate) fn bgr_bitmap(width: u32, height: u32, bgr: [u8; 3]) -> RawBitmap {
    let data = bgr
        .iter()
        .copied()
        .cycle()
        .take(width as usize * height as usize * 3)
        .collect();
    RawBitmap {
        width,
        height,
        colors: 3,
        bits: 8,
        data,
    }
}
