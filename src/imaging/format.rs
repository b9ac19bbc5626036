//! Codec adapter: one [`Format`] per supported codec.
//!
//! Decoding sniffs the content rather than trusting the file name, so a PNG
//! saved as `photo.jpg` still opens. Encoding is driven by the *target*
//! format, which the cache derives from the output file extension.

use super::ImagingError;
use super::params::Quality;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::gif::GifEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl Format {
    pub fn mime(self) -> &'static str {
        match self {
            Format::Jpeg => "image/jpeg",
            Format::Png => "image/png",
            Format::Gif => "image/gif",
            Format::WebP => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Jpeg => "jpg",
            Format::Png => "png",
            Format::Gif => "gif",
            Format::WebP => "webp",
        }
    }

    /// Whether blank canvases for this format start transparent.
    ///
    /// WebP can carry alpha too, but blank regions in resized WebP output are
    /// filled opaque to match JPEG.
    pub fn supports_alpha(self) -> bool {
        matches!(self, Format::Png | Format::Gif)
    }

    /// Case-insensitive; `jpg` and `jpeg` are equivalent.
    pub fn from_extension(ext: &str) -> Result<Self, ImagingError> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Format::Jpeg),
            "png" => Ok(Format::Png),
            "gif" => Ok(Format::Gif),
            "webp" => Ok(Format::WebP),
            other => Err(ImagingError::UnsupportedFormat(format!("image/{other}"))),
        }
    }

    /// Accepts full types (`image/png`) and short forms (`png`, `jpg`).
    pub fn from_mime(mime: &str) -> Result<Self, ImagingError> {
        let short = mime.trim();
        let short = short.strip_prefix("image/").unwrap_or(short);
        Self::from_extension(short)
    }

    pub fn from_path(path: &Path) -> Result<Self, ImagingError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        Self::from_extension(ext)
    }

    fn from_image_format(format: ImageFormat) -> Result<Self, ImagingError> {
        match format {
            ImageFormat::Jpeg => Ok(Format::Jpeg),
            ImageFormat::Png => Ok(Format::Png),
            ImageFormat::Gif => Ok(Format::Gif),
            ImageFormat::WebP => Ok(Format::WebP),
            other => Err(ImagingError::UnsupportedFormat(
                other.to_mime_type().to_string(),
            )),
        }
    }
}

/// Decode raw bytes into an RGBA buffer, reporting the sniffed format.
pub fn decode(bytes: &[u8]) -> Result<(RgbaImage, Format), ImagingError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| ImagingError::UnsupportedFormat("unknown".to_string()))
        .and_then(Format::from_image_format)?;
    let image = reader
        .decode()
        .map_err(|e| ImagingError::Decode(e.to_string()))?;
    Ok((image.to_rgba8(), format))
}

/// Encode an RGBA buffer as `format`.
pub fn encode(image: &RgbaImage, format: Format, quality: Quality) -> Result<Vec<u8>, ImagingError> {
    let (width, height) = image.dimensions();
    let mut out = Vec::new();

    match format {
        Format::Jpeg => {
            let (w, h) = jpeg_dimensions(width, height)?;
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = jpeg_encoder::Encoder::new(&mut out, quality.value().max(1));
            encoder.set_progressive(true);
            encoder
                .encode(rgb.as_raw(), w, h, jpeg_encoder::ColorType::Rgb)
                .map_err(|e| ImagingError::Encode(e.to_string()))?;
        }
        Format::Png => {
            let compression = match quality.png_level() {
                0..=3 => CompressionType::Fast,
                4..=6 => CompressionType::Default,
                _ => CompressionType::Best,
            };
            PngEncoder::new_with_quality(&mut out, compression, FilterType::Adaptive)
                .write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| ImagingError::Encode(e.to_string()))?;
        }
        Format::Gif => {
            let mut encoder = GifEncoder::new(&mut out);
            encoder
                .encode(image.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| ImagingError::Encode(e.to_string()))?;
        }
        Format::WebP => {
            let encoded = webp::Encoder::from_rgba(image.as_raw(), width, height)
                .encode(f32::from(quality.value()));
            out.extend_from_slice(&encoded);
        }
    }

    Ok(out)
}

/// `data:<mime>;base64,<payload>` for already-encoded `bytes`.
pub fn data_uri(format: Format, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", format.mime(), STANDARD.encode(bytes))
}

/// JPEG frames are limited to 16-bit dimensions.
fn jpeg_dimensions(width: u32, height: u32) -> Result<(u16, u16), ImagingError> {
    match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(ImagingError::Encode(format!(
            "{width}x{height} exceeds the JPEG size limit"
        ))),
    }
}
