//! Transform parameters and their short aliases.
//!
//! A request is described by a full [`TransformParams`] record. Callers never
//! build one from scratch: they supply a sparse [`ParamOverrides`] (from a
//! TOML `[defaults]` table, a `key=value` list, or code) which is merged onto
//! the configured defaults.
//!
//! Every parameter has a canonical name and a short alias:
//!
//! | Canonical | Alias | Type |
//! |---|---|---|
//! | `width` | `w` | pixels, `0` = unset |
//! | `height` | `h` | pixels, `0` = unset |
//! | `crop` | `c` | `false`, `true` (center) or an anchor name |
//! | `scale` | `s` | `false`, `true` (white) or a background color |
//! | `watermark` | `wm` | overlay image path |
//! | `wm_position` | `wmp` | anchor name |
//! | `wm_opacity` | `wmo` | `0.0..=1.0` |
//! | `wm_text` | `wmt` | overlay text |
//! | `wm_text_color` | `wmtc` | color |
//! | `wm_text_size` | `wmts` | pixels |
//! | `wm_text_font` | `wmtf` | font file path |
//! | `placeholder` | `p` | fallback image path |
//! | `quality` | `q` | `0..=100` |

use crate::color::{ColorSpec, KeyedColor};
use crate::imaging::Anchor;
use serde::Deserialize;
use serde_json::Value;

/// `(alias, canonical)` pairs in canonical parameter order.
pub const ALIASES: [(&str, &str); 13] = [
    ("w", "width"),
    ("h", "height"),
    ("c", "crop"),
    ("s", "scale"),
    ("wm", "watermark"),
    ("wmp", "wm_position"),
    ("wmo", "wm_opacity"),
    ("wmt", "wm_text"),
    ("wmtc", "wm_text_color"),
    ("wmts", "wm_text_size"),
    ("wmtf", "wm_text_font"),
    ("p", "placeholder"),
    ("q", "quality"),
];

/// Parameters whose values are always taken as literal strings.
const STRING_PARAMS: [&str; 5] = [
    "watermark",
    "wm_position",
    "wm_text",
    "wm_text_font",
    "placeholder",
];

/// Color-valued parameters. Only structured or flag values are read as
/// JSON, so a digit-only hex color like `336699` stays a string.
const COLOR_PARAMS: [&str; 2] = ["scale", "wm_text_color"];

/// Resolve an alias to its canonical name. Canonical names pass through.
pub fn canonical_name(key: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(key)
}

// ============================================================================
// Crop / Scale
// ============================================================================

/// Crop mode. Any truthy value that is not an anchor name crops at the center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "RawCrop")]
pub enum Crop {
    #[default]
    Off,
    Anchor(Anchor),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCrop {
    Flag(bool),
    Number(f64),
    Name(String),
}

impl From<RawCrop> for Crop {
    fn from(raw: RawCrop) -> Self {
        match raw {
            RawCrop::Flag(false) => Crop::Off,
            RawCrop::Number(n) if n == 0.0 => Crop::Off,
            RawCrop::Name(name) if is_falsy_str(&name) => Crop::Off,
            RawCrop::Name(name) => Crop::Anchor(Anchor::parse_lenient(&name)),
            RawCrop::Flag(true) | RawCrop::Number(_) => Crop::Anchor(Anchor::Center),
        }
    }
}

impl Crop {
    pub fn anchor(&self) -> Option<Anchor> {
        match self {
            Crop::Off => None,
            Crop::Anchor(anchor) => Some(*anchor),
        }
    }
}

/// Letterbox mode.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "RawScale")]
pub enum Scale {
    #[default]
    Off,
    /// Letterbox on the default white background.
    On,
    Background(ColorSpec),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScale {
    Flag(bool),
    Number(f64),
    Hex(String),
    Channels(Vec<f64>),
    Keyed(KeyedColor),
}

impl From<RawScale> for Scale {
    fn from(raw: RawScale) -> Self {
        match raw {
            RawScale::Flag(false) => Scale::Off,
            RawScale::Number(n) if n == 0.0 => Scale::Off,
            RawScale::Hex(hex) if is_falsy_str(&hex) => Scale::Off,
            RawScale::Channels(channels) if channels.is_empty() => Scale::Off,
            RawScale::Flag(true) | RawScale::Number(_) => Scale::On,
            RawScale::Hex(hex) => Scale::Background(ColorSpec::Hex(hex)),
            RawScale::Channels(channels) => Scale::Background(ColorSpec::Channels(channels)),
            RawScale::Keyed(keyed) => Scale::Background(ColorSpec::Keyed(keyed)),
        }
    }
}

impl Scale {
    pub const DEFAULT_BACKGROUND: &'static str = "#ffffff";

    /// Letterbox background, or `None` when scaling is off.
    pub fn background(&self) -> Option<ColorSpec> {
        match self {
            Scale::Off => None,
            Scale::On => Some(ColorSpec::hex(Self::DEFAULT_BACKGROUND)),
            Scale::Background(color) => Some(color.clone()),
        }
    }

    /// Whether the background carries transparency, forcing PNG output.
    pub fn has_alpha(&self) -> bool {
        matches!(self, Scale::Background(color) if color.has_alpha())
    }
}

/// Arrays and tables are JSON for every color parameter; `scale` also takes
/// on/off flags.
fn is_structured_or_flag(key: &str, raw: &str) -> bool {
    let raw = raw.trim();
    raw.starts_with('[')
        || raw.starts_with('{')
        || (key == "scale" && matches!(raw, "true" | "false" | "0" | "1"))
}

fn is_falsy_str(value: &str) -> bool {
    value.is_empty() || value == "0"
}

// ============================================================================
// TransformParams
// ============================================================================

/// The complete, merged parameter set for one thumbnail request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams {
    pub width: u32,
    pub height: u32,
    pub crop: Crop,
    pub scale: Scale,
    pub watermark: Option<String>,
    pub wm_position: Anchor,
    pub wm_opacity: f64,
    pub wm_text: Option<String>,
    pub wm_text_color: ColorSpec,
    pub wm_text_size: u32,
    pub wm_text_font: Option<String>,
    pub placeholder: Option<String>,
    /// Kept as given; clamped to `0..=100` only when encoding.
    pub quality: i64,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            crop: Crop::Off,
            scale: Scale::Off,
            watermark: None,
            wm_position: Anchor::Center,
            wm_opacity: 0.6,
            wm_text: None,
            wm_text_color: ColorSpec::hex("#FFFFFF"),
            wm_text_size: 32,
            wm_text_font: None,
            placeholder: None,
            quality: 80,
        }
    }
}

impl TransformParams {
    /// Apply `overrides` on top of `self`. Empty strings clear a value.
    pub fn merged(&self, overrides: &ParamOverrides) -> Self {
        let mut out = self.clone();
        if let Some(v) = overrides.width {
            out.width = v;
        }
        if let Some(v) = overrides.height {
            out.height = v;
        }
        if let Some(v) = overrides.crop {
            out.crop = v;
        }
        if let Some(v) = &overrides.scale {
            out.scale = v.clone();
        }
        merge_string(&mut out.watermark, &overrides.watermark);
        if let Some(v) = overrides.wm_position {
            out.wm_position = v;
        }
        if let Some(v) = overrides.wm_opacity {
            out.wm_opacity = v;
        }
        merge_string(&mut out.wm_text, &overrides.wm_text);
        if let Some(v) = &overrides.wm_text_color {
            out.wm_text_color = v.clone();
        }
        if let Some(v) = overrides.wm_text_size {
            out.wm_text_size = v;
        }
        merge_string(&mut out.wm_text_font, &overrides.wm_text_font);
        merge_string(&mut out.placeholder, &overrides.placeholder);
        if let Some(v) = overrides.quality {
            out.quality = v;
        }
        out
    }

    /// `(alias, value)` for every fingerprinted parameter, in canonical order.
    ///
    /// Falsy values (zero, empty, off) come back as `None`. `placeholder` and
    /// `quality` are not listed: the former never changes the output for an
    /// existing source, the latter is appended separately.
    pub fn fingerprint_entries(&self) -> Vec<(&'static str, Option<String>)> {
        let number = |n: u32| (n != 0).then(|| n.to_string());
        let text = |s: &Option<String>| s.clone().filter(|s| !s.is_empty());

        vec![
            ("w", number(self.width)),
            ("h", number(self.height)),
            ("c", self.crop.anchor().map(|a| a.as_str().to_string())),
            (
                "s",
                match &self.scale {
                    Scale::Off => None,
                    Scale::On => Some("1".to_string()),
                    Scale::Background(color) => {
                        Some(color.fingerprint_value()).filter(|v| !v.is_empty())
                    }
                },
            ),
            ("wm", text(&self.watermark)),
            ("wmp", Some(self.wm_position.as_str().to_string())),
            (
                "wmo",
                (self.wm_opacity != 0.0).then(|| format!("{}", self.wm_opacity)),
            ),
            ("wmt", text(&self.wm_text)),
            (
                "wmtc",
                Some(self.wm_text_color.fingerprint_value()).filter(|v| !v.is_empty()),
            ),
            ("wmts", number(self.wm_text_size)),
            ("wmtf", text(&self.wm_text_font)),
        ]
    }

    /// Whether a watermark image or text is requested.
    pub fn has_watermark(&self) -> bool {
        self.watermark.as_deref().is_some_and(|s| !s.is_empty())
            || self.wm_text.as_deref().is_some_and(|s| !s.is_empty())
    }
}

fn merge_string(target: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value {
        *target = (!v.is_empty()).then(|| v.clone());
    }
}

// ============================================================================
// ParamOverrides
// ============================================================================

/// A sparse set of parameters. Accepts canonical names and aliases.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParamOverrides {
    #[serde(alias = "w")]
    pub width: Option<u32>,
    #[serde(alias = "h")]
    pub height: Option<u32>,
    #[serde(alias = "c")]
    pub crop: Option<Crop>,
    #[serde(alias = "s")]
    pub scale: Option<Scale>,
    #[serde(alias = "wm")]
    pub watermark: Option<String>,
    #[serde(alias = "wmp")]
    pub wm_position: Option<Anchor>,
    #[serde(alias = "wmo")]
    pub wm_opacity: Option<f64>,
    #[serde(alias = "wmt")]
    pub wm_text: Option<String>,
    #[serde(alias = "wmtc")]
    pub wm_text_color: Option<ColorSpec>,
    #[serde(alias = "wmts")]
    pub wm_text_size: Option<u32>,
    #[serde(alias = "wmtf")]
    pub wm_text_font: Option<String>,
    #[serde(alias = "p")]
    pub placeholder: Option<String>,
    #[serde(alias = "q")]
    pub quality: Option<i64>,
}

impl ParamOverrides {
    /// The positional form: width, height and an optional mode.
    ///
    /// A mode of `"scale"` letterboxes on white; any other non-empty mode
    /// crops at that anchor.
    pub fn sized(width: u32, height: u32, mode: Option<&str>) -> Self {
        let mut overrides = Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        };
        match mode {
            Some("scale") => overrides.scale = Some(Scale::On),
            Some(mode) if !is_falsy_str(mode) => {
                overrides.crop = Some(Crop::Anchor(Anchor::parse_lenient(mode)));
            }
            _ => {}
        }
        overrides
    }

    /// Build overrides from `key=value`-style pairs.
    ///
    /// Keys may be aliases. Values are read as JSON when they parse
    /// (`100`, `true`, `[255, 0, 0, 0.5]`) and as plain strings otherwise;
    /// path and text parameters are always plain strings.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, serde_json::Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map = serde_json::Map::new();
        for (key, value) in pairs {
            let key = canonical_name(key.as_ref().trim());
            let raw = value.as_ref();
            let value = if STRING_PARAMS.contains(&key)
                || (COLOR_PARAMS.contains(&key) && !is_structured_or_flag(key, raw))
            {
                Value::String(raw.to_string())
            } else {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
            };
            map.insert(key.to_string(), value);
        }
        serde_json::from_value(Value::Object(map))
    }
}
