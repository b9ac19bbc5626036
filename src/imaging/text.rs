//! Text measurement and rasterisation.
//!
//! [`Typesetter`] is the seam between the transform pipeline and the font
//! stack. The pipeline only needs two things from it: a bounding box for
//! placement math, and a way to paint glyphs at a baseline. Tests substitute
//! a mock that records calls without touching any font files.

use super::ImagingError;
use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgba, RgbaImage, imageops};
use imageproc::drawing::{draw_text_mut, text_size};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Measured extent of a line of text, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub width: f64,
    pub height: f64,
    /// Distance from the baseline down to the lowest glyph edge (positive).
    pub descent: f64,
}

pub trait Typesetter: Sync {
    fn measure(&self, text: &str, font: Option<&Path>, size: f64) -> Result<TextBox, ImagingError>;

    /// Paint `text` with its baseline starting at `baseline`.
    fn draw(
        &self,
        canvas: &mut RgbaImage,
        text: &str,
        font: Option<&Path>,
        size: f64,
        baseline: (i64, i64),
        color: Rgba<u8>,
    ) -> Result<(), ImagingError>;
}

/// TrueType/OpenType typesetter backed by `ab_glyph` and `imageproc`.
///
/// Fonts are loaded on first use and kept for the lifetime of the value.
#[derive(Debug, Default)]
pub struct GlyphTypesetter {
    default_font: Option<PathBuf>,
    fonts: Mutex<HashMap<PathBuf, Arc<FontArc>>>,
}

impl GlyphTypesetter {
    pub fn new(default_font: Option<PathBuf>) -> Self {
        Self {
            default_font,
            fonts: Mutex::new(HashMap::new()),
        }
    }

    fn font(&self, font: Option<&Path>) -> Result<Arc<FontArc>, ImagingError> {
        let path = font
            .or(self.default_font.as_deref())
            .ok_or_else(|| ImagingError::Font("no font configured for text overlay".into()))?;

        let mut fonts = self
            .fonts
            .lock()
            .map_err(|_| ImagingError::Font("font cache poisoned".into()))?;
        if let Some(loaded) = fonts.get(path) {
            return Ok(Arc::clone(loaded));
        }

        let bytes = std::fs::read(path)?;
        let loaded = FontArc::try_from_vec(bytes)
            .map(Arc::new)
            .map_err(|e| ImagingError::Font(format!("{}: {e}", path.display())))?;
        fonts.insert(path.to_path_buf(), Arc::clone(&loaded));
        Ok(loaded)
    }
}

impl Typesetter for GlyphTypesetter {
    fn measure(&self, text: &str, font: Option<&Path>, size: f64) -> Result<TextBox, ImagingError> {
        let font = self.font(font)?;
        let scale = PxScale::from(size as f32);
        let (width, height) = text_size(scale, font.as_ref(), text);
        let descent = -font.as_scaled(scale).descent();
        Ok(TextBox {
            width: f64::from(width),
            height: f64::from(height),
            descent: f64::from(descent),
        })
    }

    fn draw(
        &self,
        canvas: &mut RgbaImage,
        text: &str,
        font: Option<&Path>,
        size: f64,
        baseline: (i64, i64),
        color: Rgba<u8>,
    ) -> Result<(), ImagingError> {
        let font = self.font(font)?;
        let scale = PxScale::from(size as f32);
        let ascent = font.as_scaled(scale).ascent();

        // Layer carries the text RGB at zero alpha; coverage only raises alpha.
        let [r, g, b, _] = color.0;
        let mut layer = RgbaImage::from_pixel(canvas.width(), canvas.height(), Rgba([r, g, b, 0]));
        let top = baseline.1 as f64 - f64::from(ascent);
        draw_text_mut(
            &mut layer,
            color,
            baseline.0 as i32,
            top.round() as i32,
            scale,
            font.as_ref(),
            text,
        );
        imageops::overlay(canvas, &layer, 0, 0);
        Ok(())
    }
}
