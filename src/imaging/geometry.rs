//! Pure geometry for every transform: target sizes, letterbox insets,
//! crop windows and anchored placement.
//!
//! All functions here are pure and testable without any I/O or images.
//! Sizes come back real-valued; [`pixels`] rounds them when a buffer is
//! actually allocated, so chained calls don't accumulate rounding error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of nine named positions inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Anchor {
    #[default]
    Center,
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAlign {
    Top,
    Middle,
    Bottom,
}

/// Where an item's `y` coordinate is measured from.
///
/// Images are placed by their top-left corner. Text is placed by its
/// baseline, so a text block of height `h` sits *above* its `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    TopLeft,
    Baseline,
}

impl Anchor {
    pub const ALL: [Anchor; 9] = [
        Anchor::Center,
        Anchor::Top,
        Anchor::Bottom,
        Anchor::Left,
        Anchor::Right,
        Anchor::TopLeft,
        Anchor::TopRight,
        Anchor::BottomLeft,
        Anchor::BottomRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Anchor::Center => "center",
            Anchor::Top => "top",
            Anchor::Bottom => "bottom",
            Anchor::Left => "left",
            Anchor::Right => "right",
            Anchor::TopLeft => "top left",
            Anchor::TopRight => "top right",
            Anchor::BottomLeft => "bottom left",
            Anchor::BottomRight => "bottom right",
        }
    }

    /// Parse an anchor name, falling back to [`Anchor::Center`] for anything
    /// unrecognized.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }

    pub fn horizontal(self) -> HorizontalAlign {
        match self {
            Anchor::Left | Anchor::TopLeft | Anchor::BottomLeft => HorizontalAlign::Left,
            Anchor::Right | Anchor::TopRight | Anchor::BottomRight => HorizontalAlign::Right,
            Anchor::Center | Anchor::Top | Anchor::Bottom => HorizontalAlign::Center,
        }
    }

    pub fn vertical(self) -> VerticalAlign {
        match self {
            Anchor::Top | Anchor::TopLeft | Anchor::TopRight => VerticalAlign::Top,
            Anchor::Bottom | Anchor::BottomLeft | Anchor::BottomRight => VerticalAlign::Bottom,
            Anchor::Center | Anchor::Left | Anchor::Right => VerticalAlign::Middle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAnchor(pub String);

impl fmt::Display for UnknownAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown anchor '{}'", self.0)
    }
}

impl std::error::Error for UnknownAnchor {}

impl FromStr for Anchor {
    type Err = UnknownAnchor;

    /// Accepts `top left`, `top-left` and `top_left`, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .to_ascii_lowercase()
            .replace(['-', '_'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        Anchor::ALL
            .into_iter()
            .find(|anchor| anchor.as_str() == normalized)
            .ok_or_else(|| UnknownAnchor(s.to_string()))
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Anchor {
    fn from(value: String) -> Self {
        Anchor::parse_lenient(&value)
    }
}

impl From<Anchor> for String {
    fn from(value: Anchor) -> Self {
        value.as_str().to_string()
    }
}

/// Round a real-valued size to whole pixels (at least one).
pub fn pixels(value: f64) -> u32 {
    if !value.is_finite() || value < 1.0 {
        return 1;
    }
    value.round() as u32
}

fn aspect(source: (u32, u32)) -> f64 {
    f64::from(source.0) / f64::from(source.1)
}

fn is_landscape(source: (u32, u32)) -> bool {
    source.0 > source.1
}

/// Size that makes the height exactly `height`, keeping the aspect ratio.
pub fn to_height(source: (u32, u32), height: f64) -> (f64, f64) {
    (height * aspect(source), height)
}

/// Size that makes the width exactly `width`, keeping the aspect ratio.
pub fn to_width(source: (u32, u32), width: f64) -> (f64, f64) {
    (width, width / aspect(source))
}

/// Size the longest edge to `size`: width for landscape, height otherwise.
pub fn to_size(source: (u32, u32), size: f64) -> (f64, f64) {
    if is_landscape(source) {
        to_width(source, size)
    } else {
        to_height(source, size)
    }
}

/// Aspect-preserving containment that never upscales.
///
/// Each requested bound is first clamped to the source's own dimension, then
/// the non-driving dimension is re-derived from the aspect ratio. Landscape
/// sources are driven by width, portrait and square ones by height.
pub fn fit(source: (u32, u32), max_width: f64, max_height: f64) -> (f64, f64) {
    let width = max_width.min(f64::from(source.0));
    let height = max_height.min(f64::from(source.1));

    if is_landscape(source) {
        (width, width / aspect(source))
    } else {
        (height * aspect(source), height)
    }
}

/// Inner content size and its placement on a letterbox canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub inner_width: f64,
    pub inner_height: f64,
    pub offset_x: i64,
    pub offset_y: i64,
}

/// Fit the source into a `target` canvas, centering it on the free axis.
///
/// Landscape sources span the full canvas width and are centered vertically;
/// portrait and square sources span the full height and are centered
/// horizontally.
pub fn letterbox(source: (u32, u32), target: (u32, u32)) -> Letterbox {
    let (canvas_w, canvas_h) = (f64::from(target.0), f64::from(target.1));

    if is_landscape(source) {
        let inner_height = canvas_w / aspect(source);
        Letterbox {
            inner_width: canvas_w,
            inner_height,
            offset_x: 0,
            offset_y: (canvas_h / 2.0 - inner_height / 2.0).floor() as i64,
        }
    } else {
        let inner_width = canvas_h * aspect(source);
        Letterbox {
            inner_width,
            inner_height: canvas_h,
            offset_x: (canvas_w / 2.0 - inner_width / 2.0).floor() as i64,
            offset_y: 0,
        }
    }
}

/// Resize applied before cropping to `target`.
///
/// Landscape sources are sized to the target height, everything else to the
/// target width.
pub fn crop_fill(source: (u32, u32), target: (u32, u32)) -> (f64, f64) {
    if is_landscape(source) {
        to_height(source, f64::from(target.1))
    } else {
        to_width(source, f64::from(target.0))
    }
}

/// Top-left corner of a `target`-sized crop window inside `current`.
pub fn crop_offsets(current: (u32, u32), target: (u32, u32), anchor: Anchor) -> (i64, i64) {
    let (x, y) = anchor_position(
        (f64::from(current.0), f64::from(current.1)),
        (f64::from(target.0), f64::from(target.1)),
        anchor,
        (0.0, 0.0),
        Origin::TopLeft,
    );
    (x.floor() as i64, y.floor() as i64)
}

/// Position of an `item` anchored inside a `container`, shifted by `offset`.
///
/// With [`Origin::TopLeft`] the returned `y` is the item's top edge. With
/// [`Origin::Baseline`] it is the baseline of a text block whose line height
/// is `item.1`: top rows sit one line below `offset.1`, middle rows are
/// centered with the baseline correction `h/2 - (item_h/2 - item_h)`, and
/// bottom rows put the baseline at `h - offset.1`.
pub fn anchor_position(
    container: (f64, f64),
    item: (f64, f64),
    anchor: Anchor,
    offset: (f64, f64),
    origin: Origin,
) -> (f64, f64) {
    let (container_w, container_h) = container;
    let (item_w, item_h) = item;
    let (offset_x, offset_y) = offset;

    let x = match anchor.horizontal() {
        HorizontalAlign::Left => offset_x,
        HorizontalAlign::Center => container_w / 2.0 - item_w / 2.0 + offset_x,
        HorizontalAlign::Right => container_w - item_w + offset_x,
    };

    let y = match (origin, anchor.vertical()) {
        (Origin::TopLeft, VerticalAlign::Top) => offset_y,
        (Origin::TopLeft, VerticalAlign::Middle) => container_h / 2.0 - item_h / 2.0 + offset_y,
        (Origin::TopLeft, VerticalAlign::Bottom) => container_h - item_h + offset_y,
        (Origin::Baseline, VerticalAlign::Top) => item_h + offset_y,
        (Origin::Baseline, VerticalAlign::Middle) => {
            container_h / 2.0 - (item_h / 2.0 - item_h) + offset_y
        }
        (Origin::Baseline, VerticalAlign::Bottom) => container_h - offset_y,
    };

    (x, y)
}
