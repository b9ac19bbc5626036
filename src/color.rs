//! Color specifications and their canonical RGBA form.
//!
//! Colors arrive in three shapes, all accepted wherever a color parameter is
//! taken (scale backgrounds, text, borders):
//!
//! | Shape | Example | Alpha |
//! |---|---|---|
//! | Hex string | `"#fff"`, `"ff8800"` | the caller-supplied opacity |
//! | Positional array | `[255, 136, 0]` / `[255, 136, 0, 0.5]` | `0` for three channels, element 3 otherwise |
//! | Keyed table | `{ r = 255, g = 136, b = 0, a = 1 }` | `a`, missing means `0` |
//!
//! A three-element positional array is **fully transparent**; pass four
//! elements for an opaque color.
//!
//! Hex input is not validated. Non-hex characters are skipped and missing
//! digits read as zero, so a malformed string yields odd channel values but
//! never an error.
//!
//! Pixel alpha is expressed on two scales. [`Color::a`] is the `0.0..=1.0`
//! opacity; compositing steps also need the 0–127 transparency scale
//! (`127` = fully transparent) used by the watermark fade formula, which
//! [`Color::gd_alpha`], [`gd_from_alpha`] and [`alpha_from_gd`] convert between.

use image::Rgba;
use serde::{Deserialize, Serialize};

/// Largest value on the 0–127 transparency scale (fully transparent).
pub const GD_ALPHA_MAX: u8 = 127;

/// A color as supplied by the caller, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorSpec {
    Hex(String),
    Channels(Vec<f64>),
    Keyed(KeyedColor),
}

/// Channel table form (`{ r, g, b, a }`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeyedColor {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub a: Option<f64>,
}

impl ColorSpec {
    pub fn hex(value: impl Into<String>) -> Self {
        Self::Hex(value.into())
    }

    /// Whether this color carries an explicit alpha other than fully opaque.
    ///
    /// Only four-channel arrays and keyed tables with an `a` entry count; hex
    /// strings never do. Used to decide whether a letterboxed thumbnail has
    /// to be stored as PNG.
    pub fn has_alpha(&self) -> bool {
        match self {
            Self::Hex(_) => false,
            Self::Channels(channels) => channels.len() >= 4 && channels[3] != 1.0,
            Self::Keyed(keyed) => keyed.a.is_some_and(|a| a != 1.0),
        }
    }

    /// The flattened string form used inside cache directory names.
    pub fn fingerprint_value(&self) -> String {
        match self {
            Self::Hex(hex) => hex.clone(),
            Self::Channels(channels) => channels.iter().map(|c| format!("{c}")).collect(),
            Self::Keyed(keyed) => {
                let mut out = format!("{}{}{}", keyed.r, keyed.g, keyed.b);
                if let Some(a) = keyed.a {
                    out.push_str(&format!("{a}"));
                }
                out
            }
        }
    }
}

impl From<&str> for ColorSpec {
    fn from(value: &str) -> Self {
        Self::Hex(value.to_string())
    }
}

/// Canonical RGBA color: 8-bit channels plus a `0.0..=1.0` opacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0,
        g: 0,
        b: 0,
        a: 1.0,
    };

    pub const WHITE: Color = Color {
        r: 255,
        g: 255,
        b: 255,
        a: 1.0,
    };

    pub fn rgba(r: u8, g: u8, b: u8, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Normalize any [`ColorSpec`] into a [`Color`].
    ///
    /// `opacity` only applies to hex strings; arrays and tables carry their
    /// own alpha (see the module docs for the three-channel rule).
    pub fn normalize(spec: &ColorSpec, opacity: f64) -> Self {
        match spec {
            ColorSpec::Hex(hex) => Self::from_hex(hex, opacity),
            ColorSpec::Channels(channels) => {
                let channel = |i: usize| channels.get(i).copied().unwrap_or(0.0);
                let a = if channels.len() >= 4 { channels[3] } else { 0.0 };
                Self::rgba(
                    to_channel(channel(0)),
                    to_channel(channel(1)),
                    to_channel(channel(2)),
                    a,
                )
            }
            ColorSpec::Keyed(keyed) => Self::rgba(
                to_channel(keyed.r),
                to_channel(keyed.g),
                to_channel(keyed.b),
                keyed.a.unwrap_or(0.0),
            ),
        }
    }

    /// Parse `#RGB` / `#RRGGBB` (leading `#` optional) with the given alpha.
    pub fn from_hex(hex: &str, opacity: f64) -> Self {
        let mut digits: Vec<char> = hex.trim_start_matches('#').chars().collect();
        if digits.len() == 3 {
            digits = digits.iter().flat_map(|&c| [c, c]).collect();
        }
        Self::rgba(
            hex_channel(&digits, 0),
            hex_channel(&digits, 1),
            hex_channel(&digits, 2),
            opacity,
        )
    }

    /// Transparency on the 0–127 scale: `127 - a * 127`, truncated.
    pub fn gd_alpha(&self) -> u8 {
        (f64::from(GD_ALPHA_MAX) - self.a * f64::from(GD_ALPHA_MAX)).clamp(0.0, 127.0) as u8
    }

    /// The pixel value written into RGBA buffers.
    pub fn to_rgba(&self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, alpha_from_gd(self.gd_alpha())])
    }
}

/// Convert a 0–127 transparency value into an 8-bit alpha channel.
pub fn alpha_from_gd(gd: u8) -> u8 {
    let opaque = GD_ALPHA_MAX - gd.min(GD_ALPHA_MAX);
    (f64::from(opaque) * 255.0 / f64::from(GD_ALPHA_MAX)).round() as u8
}

/// Convert an 8-bit alpha channel into the 0–127 transparency scale.
pub fn gd_from_alpha(alpha: u8) -> u8 {
    GD_ALPHA_MAX - (f64::from(alpha) * f64::from(GD_ALPHA_MAX) / 255.0).round() as u8
}

fn to_channel(value: f64) -> u8 {
    value.clamp(0.0, 255.0) as u8
}

/// Read the two-digit channel at `index`, skipping non-hex characters.
fn hex_channel(digits: &[char], index: usize) -> u8 {
    digits
        .iter()
        .skip(index * 2)
        .take(2)
        .filter_map(|c| c.to_digit(16))
        .fold(0u32, |acc, d| acc * 16 + d) as u8
}
