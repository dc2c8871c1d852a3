//! Image encoding hook.
//!
//! The engine only needs an opaque string it can ship in `sync` packets and
//! persist; [`PngDataUrlCodec`] produces `data:image/png;base64,...` URLs that
//! browsers can draw directly.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, ImageReader, Limits};
use thiserror::Error;

use crate::geometry::Size;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("not a base64 data URL")]
    NotDataUrl,
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image codec failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("buffer of {got} bytes does not match {width}x{height} RGBA")]
    Dimensions { width: u32, height: u32, got: usize },
}

/// Row-major RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub size: Size,
    pub data: Vec<u8>,
}

impl RasterImage {
    pub fn new(size: Size, data: Vec<u8>) -> Result<Self, CodecError> {
        if data.len() != size.area() * 4 {
            return Err(CodecError::Dimensions {
                width: size.width,
                height: size.height,
                got: data.len(),
            });
        }
        Ok(Self { size, data })
    }
}

/// Converts between raster buffers and their transport encoding.
pub trait ImageCodec: Send + Sync {
    fn encode(&self, image: &RasterImage) -> Result<String, CodecError>;

    fn decode(&self, encoded: &str) -> Result<RasterImage, CodecError>;
}

/// Lossless PNG wrapped in a base64 data URL.
#[derive(Debug, Clone)]
pub struct PngDataUrlCodec {
    /// Largest width or height accepted when decoding.
    max_dimension: u32,
}

impl PngDataUrlCodec {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }
}

impl Default for PngDataUrlCodec {
    fn default() -> Self {
        Self::new(8192)
    }
}

impl ImageCodec for PngDataUrlCodec {
    fn encode(&self, image: &RasterImage) -> Result<String, CodecError> {
        let mut png = Vec::new();
        PngEncoder::new(&mut png).write_image(
            &image.data,
            image.size.width,
            image.size.height,
            ExtendedColorType::Rgba8,
        )?;
        let mut url = String::with_capacity(PNG_DATA_URL_PREFIX.len() + png.len() * 4 / 3 + 4);
        url.push_str(PNG_DATA_URL_PREFIX);
        BASE64.encode_string(&png, &mut url);
        Ok(url)
    }

    fn decode(&self, encoded: &str) -> Result<RasterImage, CodecError> {
        // Accept any base64 data URL header; the payload must still be PNG.
        let payload = match encoded.split_once(";base64,") {
            Some((header, payload)) if header.starts_with("data:") => payload,
            _ => return Err(CodecError::NotDataUrl),
        };
        let bytes = BASE64.decode(payload.trim())?;

        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);

        let mut reader = ImageReader::with_format(Cursor::new(bytes), ImageFormat::Png);
        reader.limits(limits);
        let rgba = reader.decode()?.into_rgba8();
        let size = Size::new(rgba.width(), rgba.height());
        RasterImage::new(size, rgba.into_raw())
    }
}
