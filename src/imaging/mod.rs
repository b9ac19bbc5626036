//! Image processing: decode, transform, overlay, encode.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** (JPEG, PNG, GIF, WebP) | `image::ImageReader` with content sniffing |
//! | **Resize / letterbox** | `image::imageops::resize` (`Triangle`, area-weighted on downscale) |
//! | **Crop / composite** | `image::imageops::{replace, overlay}` |
//! | **Text** | `imageproc::drawing` + `ab_glyph` fonts |
//! | **Encode** | `image` codecs; lossy WebP through `webp` (libwebp) |
//!
//! The module is split into:
//! - **Geometry**: Pure functions for dimension and placement math (unit testable)
//! - **Parameters**: Option structs describing overlays, plus [`Quality`]
//! - **Format**: The codec adapter, one [`Format`] variant per supported codec
//! - **Text**: [`Typesetter`] trait + [`GlyphTypesetter`]
//! - **Handle**: [`ImageHandle`], the chained transform pipeline

pub mod format;
pub mod geometry;
pub mod handle;
mod params;
pub mod text;

pub use format::Format;
pub use geometry::{Anchor, Origin};
pub use handle::{Download, ImageHandle};
pub use params::{Border, Quality, TextOptions, WatermarkOptions};
pub use text::{GlyphTypesetter, TextBox, Typesetter};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported type: {0}")]
    UnsupportedFormat(String),
    #[error("Decoding failed: {0}")]
    Decode(String),
    #[error("Encoding failed: {0}")]
    Encode(String),
    #[error("Font error: {0}")]
    Font(String),
}
