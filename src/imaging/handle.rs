//! The transform pipeline.
//!
//! An [`ImageHandle`] owns one decoded RGBA buffer plus the format it was
//! decoded from. Every transform consumes the handle and returns the updated
//! one, so calls chain:
//!
//! ```rust,ignore
//! let bytes = ImageHandle::open("photo.jpg")?
//!     .crop(200, 200, Anchor::Top)
//!     .watermark_file("logo.png", &WatermarkOptions::default())?
//!     .encode(Format::Jpeg, Quality::default())?;
//! ```
//!
//! All sizing math lives in [`geometry`](super::geometry); this module only
//! applies it to pixels.

use super::ImagingError;
use super::format::{self, Format};
use super::geometry::{self, Anchor, Origin, pixels};
use super::params::{Quality, TextOptions, WatermarkOptions};
use super::text::Typesetter;
use crate::color::{Color, ColorSpec, GD_ALPHA_MAX, alpha_from_gd, gd_from_alpha};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::Path;

/// Sample string whose bounding box gives the full line height
/// (capital, ascender and descenders).
pub const LINE_PROBE: &str = "QqyjpqZ";

#[derive(Debug, Clone)]
pub struct ImageHandle {
    buffer: RgbaImage,
    format: Format,
}

/// An encoded image ready to be sent as a file attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub file_name: String,
    pub body: Vec<u8>,
}

impl Download {
    /// Response headers for a forced download of [`body`](Self::body).
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "Cache-Control",
                "must-revalidate, post-check=0, pre-check=0".to_string(),
            ),
            ("Content-Description", "File Transfer".to_string()),
            ("Content-Length", self.body.len().to_string()),
            ("Content-Transfer-Encoding", "Binary".to_string()),
            ("Content-Type", "application/octet-stream".to_string()),
            (
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", self.file_name),
            ),
        ]
    }
}

impl ImageHandle {
    pub fn new(buffer: RgbaImage, format: Format) -> Self {
        Self { buffer, format }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImagingError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::decode(&bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ImagingError> {
        let (buffer, format) = format::decode(bytes)?;
        Ok(Self { buffer, format })
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// The format the image was decoded from.
    pub fn format(&self) -> Format {
        self.format
    }

    pub fn buffer(&self) -> &RgbaImage {
        &self.buffer
    }

    pub fn into_buffer(self) -> RgbaImage {
        self.buffer
    }

    // =====================================================================
    // Sizing
    // =====================================================================

    /// Resample to exactly `width` x `height`. A no-op at the current size.
    pub fn resize(mut self, width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        if self.dimensions() == (width, height) {
            return self;
        }

        let resized = imageops::resize(&self.buffer, width, height, FilterType::Triangle);
        self.buffer = if self.format.supports_alpha() {
            resized
        } else {
            let mut canvas = self.blank(width, height);
            imageops::overlay(&mut canvas, &resized, 0, 0);
            canvas
        };
        self
    }

    pub fn to_width(self, width: u32) -> Self {
        let (w, h) = geometry::to_width(self.dimensions(), f64::from(width));
        self.resize(pixels(w), pixels(h))
    }

    pub fn to_height(self, height: u32) -> Self {
        let (w, h) = geometry::to_height(self.dimensions(), f64::from(height));
        self.resize(pixels(w), pixels(h))
    }

    /// Size the longest edge to `size`.
    pub fn to_size(self, size: u32) -> Self {
        let (w, h) = geometry::to_size(self.dimensions(), f64::from(size));
        self.resize(pixels(w), pixels(h))
    }

    /// Shrink into a `max_width` x `max_height` box. Never upscales.
    pub fn fit(self, max_width: u32, max_height: u32) -> Self {
        let (w, h) = geometry::fit(self.dimensions(), f64::from(max_width), f64::from(max_height));
        self.resize(pixels(w), pixels(h))
    }

    /// Letterbox onto a `width` x `height` canvas filled with `background`.
    ///
    /// The output is always exactly the requested size.
    pub fn scale(mut self, width: u32, height: u32, background: &ColorSpec) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        if self.dimensions() == (width, height) {
            return self;
        }

        let layout = geometry::letterbox(self.dimensions(), (width, height));
        let fill = Color::normalize(background, 1.0).to_rgba();
        let mut canvas = RgbaImage::from_pixel(width, height, fill);
        let inner = imageops::resize(
            &self.buffer,
            pixels(layout.inner_width),
            pixels(layout.inner_height),
            FilterType::Triangle,
        );
        imageops::overlay(&mut canvas, &inner, layout.offset_x, layout.offset_y);

        self.buffer = canvas;
        self
    }

    /// Fill the `width` x `height` window, then cut it out at `anchor`.
    ///
    /// Landscape sources are first sized to the target height, everything else
    /// to the target width. Parts of the window that fall outside the resized
    /// image stay blank.
    pub fn crop(self, width: u32, height: u32, anchor: Anchor) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let (w, h) = geometry::crop_fill(self.dimensions(), (width, height));
        let mut resized = self.resize(pixels(w), pixels(h));

        let (x, y) = geometry::crop_offsets(resized.dimensions(), (width, height), anchor);
        let mut canvas = resized.blank(width, height);
        imageops::replace(&mut canvas, &resized.buffer, -x, -y);
        resized.buffer = canvas;
        resized
    }

    // =====================================================================
    // Overlays
    // =====================================================================

    /// Composite `overlay` at its anchored position.
    ///
    /// With `opacity < 1` the overlay's alpha is reduced by
    /// `127 - opacity * 127` steps on the 0–127 transparency scale first.
    pub fn watermark(mut self, overlay: &ImageHandle, options: &WatermarkOptions) -> Self {
        let (x, y) = geometry::anchor_position(
            (f64::from(self.width()), f64::from(self.height())),
            (f64::from(overlay.width()), f64::from(overlay.height())),
            options.anchor,
            (options.offset_x, options.offset_y),
            Origin::TopLeft,
        );

        if options.opacity.min(1.0) < 1.0 {
            let faded = fade(&overlay.buffer, options.opacity);
            imageops::overlay(&mut self.buffer, &faded, x as i64, y as i64);
        } else {
            imageops::overlay(&mut self.buffer, &overlay.buffer, x as i64, y as i64);
        }
        self
    }

    pub fn watermark_file(
        self,
        path: impl AsRef<Path>,
        options: &WatermarkOptions,
    ) -> Result<Self, ImagingError> {
        let overlay = ImageHandle::open(path)?;
        Ok(self.watermark(&overlay, options))
    }

    /// Draw one line of text at its anchored baseline, optionally boxed.
    pub fn text<T: Typesetter + ?Sized>(
        mut self,
        typesetter: &T,
        text: &str,
        options: &TextOptions,
    ) -> Result<Self, ImagingError> {
        let font = options.font.as_deref();
        let line = typesetter.measure(LINE_PROBE, font, options.size)?;
        let extent = typesetter.measure(text, font, options.size)?;

        let (x, y) = geometry::anchor_position(
            (f64::from(self.width()), f64::from(self.height())),
            (extent.width, line.height),
            options.anchor,
            (options.offset_x, options.offset_y),
            Origin::Baseline,
        );
        let (x, y) = (x as i64, y as i64);

        typesetter.draw(
            &mut self.buffer,
            text,
            font,
            options.size,
            (x, y),
            options.color.to_rgba(),
        )?;

        if let Some(border) = &options.border {
            let pad_x = border.offset_x(options);
            let pad_y = border.offset_y(options);
            let (x, y) = (x as f64, y as f64);
            let left = x - pad_x;
            let top = y - line.height + extent.descent - pad_y;
            let right = x + extent.width + pad_x;
            let bottom = y + extent.descent + pad_y;
            self.stroke_rect(
                (left, top, right, bottom),
                border.width(),
                border.color(options).to_rgba(),
            );
        }

        Ok(self)
    }

    /// Stroke a rectangle `thickness` pixels wide, centered on its edges.
    fn stroke_rect(&mut self, edges: (f64, f64, f64, f64), thickness: u32, color: Rgba<u8>) {
        let (left, top, right, bottom) = edges;
        let mut layer = RgbaImage::new(self.width(), self.height());
        let half = i64::from(thickness / 2);

        for step in 0..i64::from(thickness) {
            let inset = step - half;
            let x0 = left as i64 + inset;
            let y0 = top as i64 + inset;
            let x1 = right as i64 - inset;
            let y1 = bottom as i64 - inset;
            if x1 <= x0 || y1 <= y0 {
                break;
            }
            let rect = Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
            draw_hollow_rect_mut(&mut layer, rect, color);
        }

        imageops::overlay(&mut self.buffer, &layer, 0, 0);
    }

    // =====================================================================
    // Output
    // =====================================================================

    pub fn encode(&self, format: Format, quality: Quality) -> Result<Vec<u8>, ImagingError> {
        format::encode(&self.buffer, format, quality)
    }

    /// Encode for `path`'s extension and write the file.
    pub fn save(&self, path: impl AsRef<Path>, quality: Quality) -> Result<(), ImagingError> {
        let path = path.as_ref();
        let bytes = self.encode(Format::from_path(path)?, quality)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Encode for `file_name`'s extension as a forced download.
    pub fn download(&self, file_name: &str, quality: Quality) -> Result<Download, ImagingError> {
        let body = self.encode(Format::from_path(Path::new(file_name))?, quality)?;
        Ok(Download {
            file_name: file_name.to_string(),
            body,
        })
    }

    /// `data:<mime>;base64,<payload>`. `mime` may be a short form like `png`.
    pub fn data_uri(&self, mime: &str, quality: Quality) -> Result<String, ImagingError> {
        let format = Format::from_mime(mime)?;
        let bytes = self.encode(format, quality)?;
        Ok(format::data_uri(format, &bytes))
    }

    /// Blank canvas for this image's format: transparent for formats that
    /// carry alpha, opaque black otherwise.
    fn blank(&self, width: u32, height: u32) -> RgbaImage {
        let fill = if self.format.supports_alpha() {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([0, 0, 0, 255])
        };
        RgbaImage::from_pixel(width, height, fill)
    }
}

/// Raise every pixel's transparency by `127 - opacity * 127` steps.
fn fade(buffer: &RgbaImage, opacity: f64) -> RgbaImage {
    let steps = (f64::from(GD_ALPHA_MAX) - opacity.clamp(0.0, 1.0) * f64::from(GD_ALPHA_MAX)) as u8;
    let mut faded = buffer.clone();
    for pixel in faded.pixels_mut() {
        let gd = gd_from_alpha(pixel[3]).saturating_add(steps).min(GD_ALPHA_MAX);
        pixel[3] = alpha_from_gd(gd);
    }
    faded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::Border;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use crate::imaging::text::tests::MockTypesetter;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn solid(width: u32, height: u32, color: Rgba<u8>, format: Format) -> ImageHandle {
        ImageHandle::new(RgbaImage::from_pixel(width, height, color), format)
    }

    /// Left half red, right half blue.
    fn split(width: u32, height: u32) -> ImageHandle {
        let buffer = RgbaImage::from_fn(width, height, |x, _| if x < width / 2 { RED } else { BLUE });
        ImageHandle::new(buffer, Format::Png)
    }

    // =========================================================================
    // Sizing
    // =========================================================================

    #[test]
    fn resize_to_same_size_is_identity() {
        let img = split(10, 10);
        let before = img.buffer().clone();
        let after = img.resize(10, 10);
        assert_eq!(after.buffer(), &before);
    }

    #[test]
    fn to_width_keeps_aspect() {
        let img = solid(400, 200, RED, Format::Jpeg).to_width(100);
        assert_eq!(img.dimensions(), (100, 50));
    }

    #[test]
    fn to_height_keeps_aspect() {
        let img = solid(400, 200, RED, Format::Jpeg).to_height(100);
        assert_eq!(img.dimensions(), (200, 100));
    }

    #[test]
    fn to_size_drives_longest_edge() {
        assert_eq!(solid(400, 200, RED, Format::Jpeg).to_size(100).dimensions(), (100, 50));
        assert_eq!(solid(200, 400, RED, Format::Jpeg).to_size(100).dimensions(), (50, 100));
    }

    #[test]
    fn fit_never_upscales() {
        let img = solid(100, 50, RED, Format::Jpeg).fit(800, 800);
        assert_eq!(img.dimensions(), (100, 50));
    }

    #[test]
    fn fit_landscape_into_box() {
        let img = solid(400, 200, RED, Format::Jpeg).fit(100, 100);
        assert_eq!(img.dimensions(), (100, 50));
    }

    #[test]
    fn scale_produces_exact_canvas() {
        let img = solid(400, 200, RED, Format::Jpeg).scale(100, 100, &ColorSpec::hex("#ffffff"));
        assert_eq!(img.dimensions(), (100, 100));
        // Letterbox bands keep the background.
        assert_eq!(img.buffer().get_pixel(50, 5), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.buffer().get_pixel(50, 50), &RED);
    }

    #[test]
    fn scale_portrait_pads_sides() {
        let img = solid(100, 200, RED, Format::Jpeg).scale(100, 100, &ColorSpec::hex("000"));
        assert_eq!(img.dimensions(), (100, 100));
        assert_eq!(img.buffer().get_pixel(5, 50), &Rgba([0, 0, 0, 255]));
        assert_eq!(img.buffer().get_pixel(50, 50), &RED);
    }

    #[test]
    fn scale_with_transparent_background() {
        let bg = ColorSpec::Channels(vec![255.0, 255.0, 255.0, 0.0]);
        let img = solid(400, 200, RED, Format::Jpeg).scale(100, 100, &bg);
        assert_eq!(img.buffer().get_pixel(50, 2)[3], 0);
    }

    #[test]
    fn crop_yields_exact_size() {
        let img = solid(400, 200, RED, Format::Jpeg).crop(100, 100, Anchor::Center);
        assert_eq!(img.dimensions(), (100, 100));
    }

    #[test]
    fn crop_anchor_selects_side() {
        // 200x100 split image: sized to 200x100, window 100x100.
        let left = split(200, 100).crop(100, 100, Anchor::Left);
        assert_eq!(left.buffer().get_pixel(50, 50), &RED);

        let right = split(200, 100).crop(100, 100, Anchor::Right);
        assert_eq!(right.buffer().get_pixel(50, 50), &BLUE);

        let top_left = split(200, 100).crop(100, 100, Anchor::TopLeft);
        assert_eq!(top_left.buffer().get_pixel(0, 0), &RED);
    }

    #[test]
    fn crop_outside_image_stays_blank() {
        // Landscape 400x200 sized to height 50 is 100x50, narrower than 300.
        let img = solid(400, 200, RED, Format::Png).crop(300, 50, Anchor::Left);
        assert_eq!(img.dimensions(), (300, 50));
        assert_eq!(img.buffer().get_pixel(299, 25)[3], 0);
    }

    // =========================================================================
    // Watermark
    // =========================================================================

    #[test]
    fn watermark_bottom_right_placement() {
        let base = solid(100, 100, RED, Format::Png);
        let mark = solid(10, 10, BLUE, Format::Png);
        let options = WatermarkOptions {
            anchor: Anchor::BottomRight,
            opacity: 1.0,
            ..WatermarkOptions::default()
        };
        let out = base.watermark(&mark, &options);

        assert_eq!(out.buffer().get_pixel(95, 95), &BLUE);
        assert_eq!(out.buffer().get_pixel(99, 99), &BLUE);
        assert_eq!(out.buffer().get_pixel(89, 89), &RED);
    }

    #[test]
    fn watermark_half_opacity_bottom_right_with_offset() {
        let base = solid(100, 100, RED, Format::Png);
        let mark = solid(10, 10, BLUE, Format::Png);
        let options = WatermarkOptions {
            anchor: Anchor::BottomRight,
            offset_x: -5.0,
            offset_y: -5.0,
            opacity: 0.5,
        };
        let out = base.watermark(&mark, &options);

        // Overlay covers x, y in 85..95 and is blended with the base.
        for (x, y) in [(85, 85), (94, 94), (85, 94), (94, 85)] {
            let px = *out.buffer().get_pixel(x, y);
            assert!(px[0] > 0 && px[0] < 255, "({x}, {y}) not blended: {px:?}");
            assert!(px[2] > 0 && px[2] < 255, "({x}, {y}) not blended: {px:?}");
        }
        assert_eq!(out.buffer().get_pixel(95, 95), &RED);
        assert_eq!(out.buffer().get_pixel(84, 90), &RED);
        assert_eq!(out.buffer().get_pixel(90, 84), &RED);
    }

    #[test]
    fn watermark_offset_shifts_overlay() {
        let base = solid(100, 100, RED, Format::Png);
        let mark = solid(10, 10, BLUE, Format::Png);
        let options = WatermarkOptions {
            anchor: Anchor::TopLeft,
            offset_x: 5.0,
            offset_y: 7.0,
            opacity: 1.0,
        };
        let out = base.watermark(&mark, &options);
        assert_eq!(out.buffer().get_pixel(5, 7), &BLUE);
        assert_eq!(out.buffer().get_pixel(4, 7), &RED);
    }

    #[test]
    fn watermark_opacity_blends() {
        let base = solid(20, 20, RED, Format::Png);
        let mark = solid(20, 20, BLUE, Format::Png);
        let options = WatermarkOptions {
            opacity: 0.5,
            ..WatermarkOptions::default()
        };
        let px = *base.watermark(&mark, &options).buffer().get_pixel(10, 10);
        assert!(px[0] > 0 && px[0] < 255, "expected a blend, got {px:?}");
        assert!(px[2] > 0 && px[2] < 255, "expected a blend, got {px:?}");
    }

    #[test]
    fn watermark_zero_opacity_is_invisible() {
        let base = solid(20, 20, RED, Format::Png);
        let mark = solid(20, 20, BLUE, Format::Png);
        let options = WatermarkOptions {
            opacity: 0.0,
            ..WatermarkOptions::default()
        };
        assert_eq!(base.watermark(&mark, &options).buffer().get_pixel(10, 10), &RED);
    }

    #[test]
    fn fade_adds_transparency_steps() {
        let opaque = RgbaImage::from_pixel(1, 1, RED);
        let faded = fade(&opaque, 0.6);
        // 127 - 0.6 * 127 = 50.8 -> 50 steps -> alpha round(77 * 255 / 127)
        assert_eq!(faded.get_pixel(0, 0)[3], 155);
    }

    // =========================================================================
    // Text
    // =========================================================================

    #[test]
    fn text_bottom_left_baseline() {
        let typesetter = MockTypesetter::default();
        let options = TextOptions {
            size: 10.0,
            anchor: Anchor::BottomLeft,
            offset_x: 3.0,
            offset_y: 4.0,
            ..TextOptions::default()
        };
        solid(100, 50, RED, Format::Png)
            .text(&typesetter, "abc", &options)
            .unwrap();

        let draws = typesetter.get_draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].text, "abc");
        assert_eq!(draws[0].baseline, (3, 46));
    }

    #[test]
    fn text_center_baseline() {
        let typesetter = MockTypesetter::default();
        let options = TextOptions {
            size: 10.0,
            ..TextOptions::default()
        };
        solid(100, 50, RED, Format::Png)
            .text(&typesetter, "abcd", &options)
            .unwrap();

        // x = 50 - 20/2, y = 25 - (5 - 10)
        assert_eq!(typesetter.get_draws()[0].baseline, (40, 30));
    }

    #[test]
    fn text_paints_in_color() {
        let typesetter = MockTypesetter::default();
        let options = TextOptions {
            size: 10.0,
            anchor: Anchor::TopLeft,
            color: Color::WHITE,
            ..TextOptions::default()
        };
        let out = solid(100, 50, RED, Format::Png)
            .text(&typesetter, "ab", &options)
            .unwrap();
        assert_eq!(out.buffer().get_pixel(2, 5), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.buffer().get_pixel(50, 40), &RED);
    }

    #[test]
    fn text_border_surrounds_text() {
        let typesetter = MockTypesetter::default();
        let options = TextOptions {
            size: 10.0,
            anchor: Anchor::TopLeft,
            offset_x: 20.0,
            offset_y: 10.0,
            border: Some(Border {
                color: Some(Color::rgba(0, 255, 0, 1.0)),
                ..Border::default()
            }),
            ..TextOptions::default()
        };
        let out = solid(100, 60, RED, Format::Png)
            .text(&typesetter, "ab", &options)
            .unwrap();

        // Baseline (20, 20). Box: left 20-10, top 20-10+2.5-5, right 20+10+10.
        let green = Rgba([0, 255, 0, 255]);
        assert_eq!(out.buffer().get_pixel(10, 15), &green);
        assert_eq!(out.buffer().get_pixel(40, 15), &green);
        assert_eq!(out.buffer().get_pixel(0, 0), &RED);
    }

    // =========================================================================
    // Output
    // =========================================================================

    #[test]
    fn download_headers() {
        let download = solid(4, 4, RED, Format::Png)
            .download("thumb.png", Quality::default())
            .unwrap();
        let headers = download.headers();

        assert_eq!(headers.len(), 6);
        assert!(headers.contains(&("Content-Type", "application/octet-stream".to_string())));
        assert!(headers.contains(&("Content-Length", download.body.len().to_string())));
        assert!(headers.contains(&(
            "Content-Disposition",
            "attachment; filename=\"thumb.png\"".to_string()
        )));
    }

    #[test]
    fn data_uri_short_mime() {
        let uri = solid(2, 2, RED, Format::Png)
            .data_uri("png", Quality::default())
            .unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));

        let payload = uri.trim_start_matches("data:image/png;base64,");
        let bytes = STANDARD.decode(payload).unwrap();
        let decoded = ImageHandle::decode(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (2, 2));
    }

    #[test]
    fn data_uri_rejects_unknown_mime() {
        let err = solid(2, 2, RED, Format::Png)
            .data_uri("image/tiff", Quality::default())
            .unwrap_err();
        assert!(matches!(err, ImagingError::UnsupportedFormat(_)));
    }

    #[test]
    fn save_picks_format_from_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("out.jpg");
        solid(8, 8, RED, Format::Png)
            .save(&path, Quality::default())
            .unwrap();

        let reopened = ImageHandle::open(&path).unwrap();
        assert_eq!(reopened.format(), Format::Jpeg);
        assert_eq!(reopened.dimensions(), (8, 8));
    }
}
