//! Per-image façade over the decode pipeline.

use std::sync::Arc;

use tracing::debug;

use crate::backend::{default_factory, BackendFactory, ByteSource};
use crate::buffer::CanonicalImage;
use crate::capability;
use crate::error::{DecodeError, ErrorKind};
use crate::metadata::ImageMetadata;
use crate::options::{DecodeOptions, ImageOption, OptionValue, PixelFormat, Quality, Size};
use crate::orient::{orient_preview, stored_size};
use crate::scale::{scale_to, FilterType};
use crate::select::{select_path, DecodePath};
use crate::session::DecodeSession;
use crate::transcode::transcode;
use crate::LOG_TARGET;

/// How the last successful decode was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSummary {
    pub path: DecodePath,
    pub filter: FilterType,
    pub size: Size,
}

/// Reads one RAW image from a device.
///
/// Options are set before [`RawImageHandler::read`]; metadata queries open
/// the device lazily and at most once. Failures never escape as errors from
/// `read`; the last one is observable through
/// [`RawImageHandler::error_kind`].
pub struct RawImageHandler {
    device: Option<Box<dyn ByteSource>>,
    session: DecodeSession,
    factory: Arc<dyn BackendFactory>,
    options: DecodeOptions,
    last_error: Option<ErrorKind>,
    last_decode: Option<DecodeSummary>,
}

impl Default for RawImageHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RawImageHandler {
    pub fn new() -> Self {
        Self::with_backend(default_factory())
    }

    pub fn with_backend(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            device: None,
            session: DecodeSession::new(Arc::clone(&factory)),
            factory,
            options: DecodeOptions::default(),
            last_error: None,
            last_decode: None,
        }
    }

    /// Replace the device. Any session on the previous device is closed.
    pub fn set_device(&mut self, device: impl ByteSource + 'static) {
        self.session.close();
        self.device = Some(Box::new(device));
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: DecodeOptions) {
        self.options = options;
    }

    pub fn set_target_size(&mut self, size: Option<Size>) {
        self.options.target_size = size;
    }

    pub fn set_quality(&mut self, quality: i32) {
        self.options.quality = Quality::new(quality);
    }

    pub fn supports_option(&self, option: ImageOption) -> bool {
        matches!(
            option,
            ImageOption::ImageFormat
                | ImageOption::Size
                | ImageOption::ScaledSize
                | ImageOption::Quality
        )
    }

    /// Current value of `option`. Querying [`ImageOption::Size`] opens the
    /// device if needed and yields `None` when that fails.
    pub fn option(&mut self, option: ImageOption) -> Option<OptionValue> {
        match option {
            ImageOption::ImageFormat => Some(OptionValue::Format(PixelFormat::Rgbx8888)),
            ImageOption::Size => self.default_size().map(OptionValue::Size),
            ImageOption::ScaledSize => Some(OptionValue::Size(
                self.options.target_size.unwrap_or_default(),
            )),
            ImageOption::Quality => Some(OptionValue::Int(self.options.quality.value())),
        }
    }

    /// Update a settable option. Returns false for read-only options and
    /// mismatched values.
    pub fn set_option(&mut self, option: ImageOption, value: OptionValue) -> bool {
        match (option, value) {
            (ImageOption::ScaledSize, OptionValue::Size(size)) => {
                self.set_target_size(Some(size));
                true
            }
            (ImageOption::Quality, OptionValue::Int(quality)) => {
                self.set_quality(quality);
                true
            }
            _ => false,
        }
    }

    /// Open the device (once) and return its metadata.
    pub fn metadata(&mut self) -> Result<&ImageMetadata, DecodeError> {
        let device = self.device.as_deref_mut();
        match self.session.open(device) {
            Ok(metadata) => Ok(metadata),
            Err(err) => {
                self.last_error = Some(err.kind());
                Err(err)
            }
        }
    }

    /// Native display size, opening the device if needed.
    pub fn default_size(&mut self) -> Option<Size> {
        self.metadata().ok().map(ImageMetadata::default_size)
    }

    /// Whether the device holds something the pipeline can decode.
    ///
    /// Probes with a throwaway session and leaves the device position as
    /// it was.
    pub fn can_read(&mut self) -> bool {
        if self.session.is_open() {
            return true;
        }
        let device = self.device.as_deref_mut();
        capability::capabilities(device, "", Arc::clone(&self.factory))
    }

    /// Decode the image, returning `None` on failure.
    pub fn read(&mut self) -> Option<CanonicalImage> {
        self.decode().ok()
    }

    /// Decode the image with the current options.
    ///
    /// The decoder output is released before this returns. The session stays
    /// open after a success, so later reads and metadata queries reuse it; any
    /// failure closes it.
    pub fn decode(&mut self) -> Result<CanonicalImage, DecodeError> {
        let device = self.device.as_deref_mut();
        let result = run_pipeline(&mut self.session, device, &self.options);

        match result {
            Ok((image, summary)) => {
                self.last_error = None;
                self.last_decode = Some(summary);
                Ok(image)
            }
            Err(err) => {
                self.session.close();
                self.last_error = Some(err.kind());
                self.last_decode = None;
                Err(err)
            }
        }
    }

    /// The error state left by the last failed operation.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.last_error
    }

    pub fn last_decode(&self) -> Option<DecodeSummary> {
        self.last_decode
    }
}

fn run_pipeline(
    session: &mut DecodeSession,
    device: Option<&mut (dyn ByteSource + '_)>,
    options: &DecodeOptions,
) -> Result<(CanonicalImage, DecodeSummary), DecodeError> {
    let metadata = session.open(device)?.clone();

    let final_size = options.final_size(metadata.default_size());
    if !final_size.is_valid() {
        return Err(DecodeError::InvalidSize {
            width: final_size.width,
            height: final_size.height,
        });
    }

    let preview_size = metadata.preview_size();
    let path = select_path(final_size, options.quality, preview_size);
    debug!(
        target: LOG_TARGET,
        "preview size {preview_size}, final size {final_size}, using {path:?}"
    );

    let processed = session.produce(path)?;
    let transcoded = transcode(
        processed.output(),
        stored_size(final_size, metadata.flip),
        options.quality,
    );
    drop(processed);
    let mut image = transcoded?;

    if path.is_thumbnail() {
        image = orient_preview(image, metadata.flip)?;
    }

    let filter = FilterType::for_request(options.quality, path.is_thumbnail());
    let image = scale_to(image, final_size, filter)?;

    Ok((
        image,
        DecodeSummary {
            path,
            filter,
            size: final_size,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{
        bgr_bitmap, jpeg_bytes, png_bytes, MockCounters, MockFactory, MockScript,
    };
    use crate::backend::RawBitmap;
    use crate::error::StatusCode;
    use crate::metadata::FlipCode;
    use std::io::{Cursor, Seek, SeekFrom};

    fn camera_metadata(flip: FlipCode) -> ImageMetadata {
        ImageMetadata {
            width: 4256,
            height: 2856,
            flip,
            preview: Size::new(1616, 1080),
            make: Some("Nikon".into()),
            model: Some("D700".into()),
        }
    }

    /// A camera whose full decode yields a small solid bitmap.
    fn camera(flip: FlipCode) -> Arc<MockFactory> {
        MockFactory::new(
            MockScript::with_metadata(camera_metadata(flip))
                .preview(jpeg_bytes(1616, 1080, [40, 120, 200]))
                .bitmap(bgr_bitmap(64, 43, [30, 20, 10])),
        )
    }

    fn handler(factory: &Arc<MockFactory>) -> RawImageHandler {
        let mut handler = RawImageHandler::with_backend(factory.clone());
        handler.set_device(Cursor::new(vec![0u8; 128]));
        handler
    }

    #[test]
    fn test_metadata_opens_at_most_once() {
        let factory = camera(FlipCode::None);
        let mut handler = handler(&factory);

        assert_eq!(handler.default_size(), Some(Size::new(4256, 2856)));
        assert_eq!(handler.default_size(), Some(Size::new(4256, 2856)));
        assert_eq!(
            handler.option(ImageOption::Size),
            Some(OptionValue::Size(Size::new(4256, 2856)))
        );
        assert_eq!(handler.metadata().unwrap().model.as_deref(), Some("D700"));
        assert_eq!(MockCounters::get(&factory.counters.opens), 1);
    }

    #[test]
    fn test_default_size_uses_full_decode() {
        let factory = MockFactory::new(
            MockScript::with_metadata(camera_metadata(FlipCode::None))
                .bitmap(bgr_bitmap(4256, 2856, [30, 20, 10])),
        );
        let mut handler = handler(&factory);

        let image = handler.read().unwrap();
        assert_eq!(image.dimensions(), (4256, 2856));

        let summary = handler.last_decode().unwrap();
        assert_eq!(summary.path, DecodePath::UseFullDecode);
        assert_eq!(summary.size, Size::new(4256, 2856));
        assert_eq!(MockCounters::get(&factory.counters.unpack), 1);
        assert_eq!(MockCounters::get(&factory.counters.unpack_preview), 0);
        assert!(handler.error_kind().is_none());
    }

    #[test]
    fn test_preview_sized_request_never_full_decodes() {
        let factory = camera(FlipCode::None);
        let mut handler = handler(&factory);
        handler.set_target_size(Some(Size::new(1616, 1080)));

        let image = handler.read().unwrap();
        assert_eq!(image.dimensions(), (1616, 1080));
        assert_eq!(handler.last_decode().unwrap().path, DecodePath::UseThumbnail);
        assert_eq!(MockCounters::get(&factory.counters.unpack), 0);
        assert_eq!(MockCounters::get(&factory.counters.process), 0);
    }

    #[test]
    fn test_explicit_size_is_exact() {
        let factory = camera(FlipCode::None);
        let mut handler = handler(&factory);
        handler.set_target_size(Some(Size::new(800, 600)));

        let image = handler.read().unwrap();
        assert_eq!(image.dimensions(), (800, 600));
        // Fits within the preview, so the preview path and its smooth filter.
        let summary = handler.last_decode().unwrap();
        assert_eq!(summary.path, DecodePath::UseThumbnail);
        assert_eq!(summary.filter, FilterType::Bilinear);
    }

    #[test]
    fn test_low_quality_full_decode_uses_nearest() {
        let mut metadata = camera_metadata(FlipCode::None);
        metadata.preview = Size::default();
        let factory = MockFactory::new(
            MockScript::with_metadata(metadata).bitmap(bgr_bitmap(64, 43, [30, 20, 10])),
        );
        let mut handler = handler(&factory);
        handler.set_target_size(Some(Size::new(800, 600)));
        handler.set_quality(30);

        let image = handler.read().unwrap();
        assert_eq!(image.dimensions(), (800, 600));
        assert_eq!(image.pixel(799, 599), Some([10, 20, 30, 0xFF]));
        let summary = handler.last_decode().unwrap();
        assert_eq!(summary.path, DecodePath::UseFullDecode);
        assert_eq!(summary.filter, FilterType::Nearest);
    }

    #[test]
    fn test_high_quality_within_preview_uses_thumbnail() {
        let factory = camera(FlipCode::None);
        let mut handler = handler(&factory);
        handler.set_quality(90);
        handler.set_target_size(Some(Size::new(1024, 683)));

        let image = handler.read().unwrap();
        assert_eq!(image.dimensions(), (1024, 683));
        assert_eq!(handler.last_decode().unwrap().path, DecodePath::UseThumbnail);
        assert_eq!(MockCounters::get(&factory.counters.unpack), 0);
    }

    #[test]
    fn test_high_quality_above_preview_uses_full_decode() {
        let factory = camera(FlipCode::None);
        let mut handler = handler(&factory);
        handler.set_quality(90);
        handler.set_target_size(Some(Size::new(1700, 1100)));

        let image = handler.read().unwrap();
        assert_eq!(image.dimensions(), (1700, 1100));
        assert_eq!(handler.last_decode().unwrap().path, DecodePath::UseFullDecode);
    }

    #[test]
    fn test_quarter_turn_transposes_and_rotates_preview() {
        // Stored landscape preview: left half red, right half blue.
        let mut stored = image::RgbImage::new(160, 100);
        for (x, _, px) in stored.enumerate_pixels_mut() {
            *px = if x < 80 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 255])
            };
        }
        let metadata = ImageMetadata {
            width: 1600,
            height: 1000,
            flip: FlipCode::RotateCw90,
            preview: Size::new(160, 100),
            ..Default::default()
        };
        let factory = MockFactory::new(MockScript::with_metadata(metadata).preview(png_bytes(stored)));
        let mut handler = handler(&factory);

        assert_eq!(handler.default_size(), Some(Size::new(1000, 1600)));

        handler.set_target_size(Some(Size::new(100, 160)));
        let image = handler.read().unwrap();
        assert_eq!(image.dimensions(), (100, 160));
        // Clockwise: the stored left (red) edge is now on top.
        assert_eq!(image.pixel(50, 10), Some([255, 0, 0, 0xFF]));
        assert_eq!(image.pixel(50, 150), Some([0, 0, 255, 0xFF]));
    }

    #[test]
    fn test_full_decode_is_not_rotated_again() {
        let metadata = ImageMetadata {
            width: 64,
            height: 43,
            flip: FlipCode::RotateCw90,
            ..Default::default()
        };
        let factory =
            MockFactory::new(MockScript::with_metadata(metadata).bitmap(bgr_bitmap(43, 64, [1, 2, 3])));
        let mut handler = handler(&factory);

        let image = handler.read().unwrap();
        assert_eq!(image.dimensions(), (43, 64));
        assert_eq!(image.pixel(0, 0), Some([3, 2, 1, 0xFF]));
    }

    #[test]
    fn test_full_decode_channel_order() {
        let bitmap = RawBitmap {
            width: 2,
            height: 1,
            colors: 3,
            bits: 8,
            data: vec![1, 2, 3, 4, 5, 6],
        };
        let metadata = ImageMetadata {
            width: 2,
            height: 1,
            ..Default::default()
        };
        let factory = MockFactory::new(MockScript::with_metadata(metadata).bitmap(bitmap));
        let mut handler = handler(&factory);

        let image = handler.read().unwrap();
        assert_eq!(image.pixels, vec![3, 2, 1, 0xFF, 6, 5, 4, 0xFF]);
    }

    #[test]
    fn test_output_released_per_read_session_kept() {
        let factory = camera(FlipCode::None);
        let mut handler = handler(&factory);
        handler.set_target_size(Some(Size::new(320, 200)));

        assert!(handler.read().is_some());
        assert_eq!(MockCounters::get(&factory.counters.releases), 1);
        assert_eq!(MockCounters::get(&factory.counters.live), 1);

        assert_eq!(handler.default_size(), Some(Size::new(4256, 2856)));
        assert!(handler.read().is_some());
        assert_eq!(MockCounters::get(&factory.counters.opens), 1);
        assert_eq!(MockCounters::get(&factory.counters.releases), 2);

        drop(handler);
        assert_eq!(MockCounters::get(&factory.counters.live), 0);
    }

    #[test]
    fn test_new_device_closes_previous_session() {
        let factory = camera(FlipCode::None);
        let mut handler = handler(&factory);
        handler.set_target_size(Some(Size::new(320, 200)));
        assert!(handler.read().is_some());

        handler.set_device(Cursor::new(vec![1u8; 64]));
        assert_eq!(MockCounters::get(&factory.counters.live), 0);
        assert!(handler.read().is_some());
        assert_eq!(MockCounters::get(&factory.counters.opens), 2);
    }

    #[test]
    fn test_transcode_failure_still_releases() {
        let bitmap = RawBitmap {
            width: 1,
            height: 1,
            colors: 4,
            bits: 8,
            data: vec![0; 4],
        };
        let factory = MockFactory::new(
            MockScript::with_metadata(camera_metadata(FlipCode::None)).bitmap(bitmap),
        );
        let mut handler = handler(&factory);

        assert!(handler.read().is_none());
        assert_eq!(handler.error_kind(), Some(ErrorKind::UnsupportedFormat));
        assert_eq!(MockCounters::get(&factory.counters.releases), 1);
        assert_eq!(MockCounters::get(&factory.counters.live), 0);
    }

    #[test]
    fn test_failing_opens_leak_nothing() {
        let factory = MockFactory::new(MockScript::failing_open(StatusCode::DATA_ERROR));
        let mut handler = handler(&factory);

        for _ in 0..10 {
            assert!(handler.read().is_none());
            assert_eq!(handler.error_kind(), Some(ErrorKind::InvalidData));
        }
        assert!(handler.default_size().is_none());
        assert!(!handler.can_read());
        assert_eq!(MockCounters::get(&factory.counters.created), 12);
        assert_eq!(MockCounters::get(&factory.counters.live), 0);
        assert_eq!(MockCounters::get(&factory.counters.releases), 0);
    }

    #[test]
    fn test_missing_device_is_device_error() {
        let factory = camera(FlipCode::None);
        let mut handler = RawImageHandler::with_backend(factory.clone());

        assert!(handler.read().is_none());
        assert_eq!(handler.error_kind(), Some(ErrorKind::DeviceError));
        assert_eq!(MockCounters::get(&factory.counters.created), 0);
    }

    #[test]
    fn test_preview_decode_failure() {
        let factory = MockFactory::new(
            MockScript::with_metadata(camera_metadata(FlipCode::None)).preview(vec![0xFF, 0xD8, 0]),
        );
        let mut handler = handler(&factory);
        handler.set_target_size(Some(Size::new(800, 600)));

        let err = handler.decode().unwrap_err();
        assert!(matches!(err, DecodeError::PreviewDecode(_)));
        assert_eq!(handler.error_kind(), Some(ErrorKind::InvalidData));
        assert_eq!(MockCounters::get(&factory.counters.releases), 1);
    }

    #[test]
    fn test_success_clears_error_state() {
        let factory = camera(FlipCode::None);
        let mut handler = RawImageHandler::with_backend(factory.clone());
        assert!(handler.read().is_none());

        handler.set_device(Cursor::new(vec![0u8; 16]));
        handler.set_target_size(Some(Size::new(16, 16)));
        assert!(handler.read().is_some());
        assert!(handler.error_kind().is_none());
    }

    #[test]
    fn test_can_read_probes_without_keeping_session() {
        let factory = camera(FlipCode::None);
        let mut handler = RawImageHandler::with_backend(factory.clone());
        let mut device = Cursor::new(vec![0u8; 32]);
        device.seek(SeekFrom::Start(7)).unwrap();
        handler.set_device(device);

        assert!(handler.can_read());
        assert!(handler.can_read());
        assert_eq!(MockCounters::get(&factory.counters.live), 0);
    }

    #[test]
    fn test_option_surface() {
        let factory = camera(FlipCode::None);
        let mut handler = handler(&factory);

        for option in [
            ImageOption::ImageFormat,
            ImageOption::Size,
            ImageOption::ScaledSize,
            ImageOption::Quality,
        ] {
            assert!(handler.supports_option(option));
        }

        assert_eq!(
            handler.option(ImageOption::ImageFormat),
            Some(OptionValue::Format(PixelFormat::Rgbx8888))
        );
        assert_eq!(handler.option(ImageOption::Quality), Some(OptionValue::Int(75)));

        assert!(handler.set_option(ImageOption::Quality, OptionValue::Int(-1)));
        assert_eq!(handler.options().quality.value(), 75);
        assert!(handler.set_option(ImageOption::Quality, OptionValue::Int(90)));
        assert_eq!(handler.option(ImageOption::Quality), Some(OptionValue::Int(90)));

        assert!(handler.set_option(
            ImageOption::ScaledSize,
            OptionValue::Size(Size::new(640, 480))
        ));
        assert_eq!(
            handler.option(ImageOption::ScaledSize),
            Some(OptionValue::Size(Size::new(640, 480)))
        );

        assert!(!handler.set_option(ImageOption::Size, OptionValue::Size(Size::new(1, 1))));
        assert!(!handler.set_option(ImageOption::Quality, OptionValue::Size(Size::new(1, 1))));
    }

    #[test]
    fn test_invalid_target_falls_back_to_default() {
        let metadata = ImageMetadata {
            width: 64,
            height: 43,
            ..Default::default()
        };
        let factory =
            MockFactory::new(MockScript::with_metadata(metadata).bitmap(bgr_bitmap(64, 43, [1, 2, 3])));
        let mut handler = handler(&factory);
        handler.set_target_size(Some(Size::new(0, 600)));

        let image = handler.read().unwrap();
        assert_eq!(image.dimensions(), (64, 43));
        assert_eq!(handler.last_decode().unwrap().size, Size::new(64, 43));
    }
}
