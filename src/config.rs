//! Configuration module.
//!
//! Handles loading, validating, and merging `thumbcache.toml`. The user file
//! is sparse: it is merged over the stock defaults, so it only needs the keys
//! it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! document_root = "."       # Site root; links are relative to it
//! # cache_dir = "/cache"    # Mirror thumbnails below this directory
//! # placeholder = "/img/missing.png"  # Served when a source is missing
//! # font = "/fonts/DejaVuSans.ttf"    # Default font for text overlays
//!
//! [defaults]                # Default transform parameters (names or aliases)
//! quality = 80
//! wm_opacity = 0.6
//!
//! [processing]
//! max_processes = 4         # Max parallel workers for `warm` (omit for auto)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::params::ParamOverrides;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "thumbcache.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `thumbcache.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Site root. Sources, watermarks and placeholders are resolved against it
    /// and returned links are relative to it.
    pub document_root: PathBuf,
    /// Central cache directory. When absent, thumbnails go into a `thumbs/`
    /// folder next to each source.
    pub cache_dir: Option<PathBuf>,
    /// Image rendered in place of any missing source.
    pub placeholder: Option<PathBuf>,
    /// Font used for text overlays that don't name one.
    pub font: Option<PathBuf>,
    /// Transform parameters applied to every request before its own.
    pub defaults: ParamOverrides,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            document_root: PathBuf::from("."),
            cache_dir: None,
            placeholder: None,
            font: None,
            defaults: ParamOverrides::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(quality) = self.defaults.quality
            && !(0..=100).contains(&quality)
        {
            return Err(ConfigError::Validation(
                "defaults.quality must be 0-100".into(),
            ));
        }
        if let Some(opacity) = self.defaults.wm_opacity
            && !(0.0..=1.0).contains(&opacity)
        {
            return Err(ConfigError::Validation(
                "defaults.wm_opacity must be 0.0-1.0".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock defaults as a `toml::Value::Table`.
///
/// Base layer for merging the user file on top.
pub fn stock_defaults_value() -> toml::Value {
    let mut table = toml::Table::new();
    table.insert("document_root".into(), toml::Value::String(".".into()));
    table.insert("defaults".into(), toml::Value::Table(toml::Table::new()));
    table.insert("processing".into(), toml::Value::Table(toml::Table::new()));
    toml::Value::Table(table)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<Config, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the file at `path`, falling back to defaults if absent.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `thumbcache.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# thumbcache configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Site root. Sources, watermarks and placeholders are resolved against it,
# and every returned link is relative to it (with a leading "/").
document_root = "."

# Central cache directory (site-relative or under the root). The source's
# directory is mirrored below it. When unset, thumbnails are written to a
# "thumbs" folder next to each source.
# cache_dir = "/cache"

# Image rendered in place of any missing source.
# placeholder = "/images/missing.png"

# Font file for text overlays that don't set wm_text_font.
# font = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"

# ---------------------------------------------------------------------------
# Default transform parameters
# ---------------------------------------------------------------------------
# Applied to every request before the request's own parameters.
# Canonical names and short aliases are both accepted.
[defaults]
# width = 0              # w    Target width in pixels (0 = unset)
# height = 0             # h    Target height in pixels (0 = unset)
# crop = false           # c    true, or an anchor: "top", "bottom left", ...
# scale = false          # s    true (white), or a background color:
#                        #      "#rrggbb", [r, g, b, a], { r = 0, g = 0, b = 0, a = 1 }
# watermark = ""         # wm   Overlay image path
# wm_position = "center" # wmp  Anchor for the watermark and its text
# wm_opacity = 0.6       # wmo  0.0 - 1.0
# wm_text = ""           # wmt  Overlay text
# wm_text_color = "#FFFFFF"  # wmtc
# wm_text_size = 32      # wmts Pixels
# wm_text_font = ""      # wmtf Font file path
# placeholder = ""       # p    Per-request fallback image
# quality = 80           # q    0 - 100

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for `thumbcache warm`.
# Omit to use all CPU cores. Values above the core count are clamped.
# max_processes = 4
"##
}
