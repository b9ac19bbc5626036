//! Parameter types for image operations.
//!
//! These structs describe *what* to draw, not *how*.
//! [`ImageHandle`](super::ImageHandle) takes them by reference so a caller can build an
//! option set once and reuse it across many images.
//!
//! ## Types
//!
//! - [`Quality`]: Encoding quality (0–100, default 80). Clamped on construction.
//! - [`WatermarkOptions`]: Anchor, offset and opacity for an image overlay.
//! - [`TextOptions`]: Font, size, color, anchor and offset for a text overlay.
//! - [`Border`]: Optional rectangle stroked around a text overlay.

use super::geometry::Anchor;
use crate::color::Color;
use std::path::PathBuf;

/// Quality setting for image encoding (0-100).
///
/// JPEG and WebP use the value directly, PNG maps it onto a 0–9 compression
/// level, GIF ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: i64) -> Self {
        Self(value.clamp(0, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// `round(9 * quality / 100)`.
    pub fn png_level(self) -> u8 {
        (9.0 * f64::from(self.0) / 100.0).round() as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// Placement of an image overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkOptions {
    pub anchor: Anchor,
    pub offset_x: f64,
    pub offset_y: f64,
    /// `1.0` composites the overlay as-is; lower values fade its alpha.
    pub opacity: f64,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            anchor: Anchor::Center,
            offset_x: 0.0,
            offset_y: 0.0,
            opacity: 0.8,
        }
    }
}

/// Text overlay settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOptions {
    /// Font file. `None` uses the typesetter's default font.
    pub font: Option<PathBuf>,
    /// Font size in pixels.
    pub size: f64,
    pub color: Color,
    pub anchor: Anchor,
    pub offset_x: f64,
    pub offset_y: f64,
    pub border: Option<Border>,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            font: None,
            size: 19.0,
            color: Color::BLACK,
            anchor: Anchor::Center,
            offset_x: 0.0,
            offset_y: 0.0,
            border: None,
        }
    }
}

/// Rectangle stroked around a text overlay.
///
/// Unset fields derive from the text: 1px wide, the text's color, padded
/// horizontally by the font size and vertically by half of it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Border {
    pub width: Option<u32>,
    pub color: Option<Color>,
    pub offset_x: Option<f64>,
    pub offset_y: Option<f64>,
}

impl Border {
    pub fn width(&self) -> u32 {
        self.width.unwrap_or(1)
    }

    pub fn color(&self, text: &TextOptions) -> Color {
        self.color.unwrap_or(text.color)
    }

    pub fn offset_x(&self, text: &TextOptions) -> f64 {
        self.offset_x.unwrap_or(text.size)
    }

    pub fn offset_y(&self, text: &TextOptions) -> f64 {
        self.offset_y.unwrap_or(text.size / 2.0)
    }
}
