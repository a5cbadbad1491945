use image::codecs::jpeg::JpegEncoder;
use image::{imageops, Rgb, RgbImage};

use super::CaptureError;
use crate::frame::Frame;
use crate::region::{BoundingBox, PixelRect};

pub const DEFAULT_PADDING: u32 = 100;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;
pub const DEFAULT_UPLOAD_FILENAME: &str = "hand.jpg";

const PADDING_FILL: Rgb<u8> = Rgb([255, 255, 255]);
/// Upper bound on the padded RGB canvas.
const MAX_CANVAS_BYTES: u64 = 256 * 1024 * 1024;

/// How a selected region becomes an upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CropSettings {
    /// Blank band added above and below the crop, in pixels.
    pub padding: u32,
    pub jpeg_quality: u8,
    /// Filename sent with the multipart field.
    pub filename: String,
}

impl Default for CropSettings {
    fn default() -> Self {
        Self {
            padding: DEFAULT_PADDING,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            filename: DEFAULT_UPLOAD_FILENAME.to_string(),
        }
    }
}

/// A compressed crop ready for upload.
#[derive(Clone, Debug)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub filename: String,
    pub content_type: &'static str,
}

/// Crop `frame` to `bbox`, add the padding bands and encode as JPEG.
pub fn encode_region(
    frame: &Frame,
    bbox: &BoundingBox,
    settings: &CropSettings,
) -> Result<EncodedImage, CaptureError> {
    let rect =
        PixelRect::from_box(bbox, frame.width, frame.height).ok_or(CaptureError::NoDetection)?;
    let crop = frame
        .crop(rect)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    let canvas = pad_vertically(&crop, settings.padding)?;
    let bytes = encode_jpeg(&canvas, settings.jpeg_quality)?;
    Ok(EncodedImage {
        bytes,
        width: canvas.width(),
        height: canvas.height(),
        filename: settings.filename.clone(),
        content_type: "image/jpeg",
    })
}

/// Composite `crop` onto a white canvas of the same width with `padding` rows above and below.
pub fn pad_vertically(crop: &RgbImage, padding: u32) -> Result<RgbImage, CaptureError> {
    if padding == 0 {
        return Ok(crop.clone());
    }
    let height = padding
        .checked_mul(2)
        .and_then(|bands| crop.height().checked_add(bands))
        .filter(|height| u64::from(*height) * u64::from(crop.width()) * 3 <= MAX_CANVAS_BYTES)
        .ok_or_else(|| {
            CaptureError::Encode(format!(
                "padding of {} pixels is too large for a {}x{} crop",
                padding,
                crop.width(),
                crop.height()
            ))
        })?;
    let mut canvas = RgbImage::from_pixel(crop.width(), height, PADDING_FILL);
    imageops::replace(&mut canvas, crop, 0, i64::from(padding));
    Ok(canvas)
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100)).encode_image(image)?;
    Ok(bytes)
}
