//! Request orchestration: one source path plus parameters in, one cached
//! thumbnail link out.
//!
//! ```text
//! get(source, overrides)
//!   ├── merge overrides onto the configured defaults
//!   ├── resolve the source (or the placeholder, or give up)
//!   ├── compute the cache path from the fingerprint
//!   ├── cache file mtime == source mtime?  → Hit
//!   └── decode → size → watermark → text → encode → store  → Generated
//! ```
//!
//! A [`Thumbnailer`] owns all configuration. Two thumbnailers never share
//! state, so tests and multi-site hosts can run side by side.

use crate::cache::{self, CacheLayout};
use crate::color::Color;
use crate::config::Config;
use crate::imaging::format;
use crate::imaging::{
    Format, GlyphTypesetter, ImageHandle, ImagingError, Quality, TextOptions, Typesetter,
    WatermarkOptions,
};
use crate::params::{ParamOverrides, TransformParams};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Imaging error: {0}")]
    Imaging(#[from] ImagingError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from an up-to-date cache file.
    Hit,
    /// Rendered and written to the cache by this call.
    Generated,
}

/// A thumbnail that exists in the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    /// Absolute path of the cache file.
    pub path: PathBuf,
    /// Site-relative link (leading `/`).
    pub link: String,
    pub status: CacheStatus,
    /// Whether the placeholder was rendered because the source is missing.
    pub placeholder: bool,
}

impl Thumbnail {
    /// The cached file as a `data:` URI, byte for byte.
    pub fn data_uri(&self) -> Result<String, ThumbnailError> {
        let format = Format::from_path(&self.path)?;
        let bytes = fs::read(&self.path)?;
        Ok(format::data_uri(format, &bytes))
    }
}

/// The source a request will actually render.
struct ResolvedSource {
    path: PathBuf,
    placeholder: bool,
}

pub struct Thumbnailer<T: Typesetter = GlyphTypesetter> {
    layout: CacheLayout,
    placeholder: Option<PathBuf>,
    defaults: TransformParams,
    typesetter: T,
}

impl Thumbnailer<GlyphTypesetter> {
    pub fn new(config: &Config) -> Self {
        Self::with_typesetter(config, GlyphTypesetter::new(config.font.clone()))
    }
}

impl<T: Typesetter> Thumbnailer<T> {
    pub fn with_typesetter(config: &Config, typesetter: T) -> Self {
        let layout = CacheLayout::new(config.document_root.clone(), config.cache_dir.clone());
        let placeholder = config.placeholder.as_deref().map(|p| layout.absolute(p));
        Self {
            layout,
            placeholder,
            defaults: TransformParams::default().merged(&config.defaults),
            typesetter,
        }
    }

    /// Layer `overrides` onto this instance's defaults.
    pub fn set_defaults(&mut self, overrides: &ParamOverrides) {
        self.defaults = self.defaults.merged(overrides);
    }

    pub fn set_cache_directory(&mut self, dir: Option<PathBuf>) {
        self.layout.cache_dir = dir;
    }

    pub fn set_document_root(&mut self, root: impl Into<PathBuf>) {
        self.layout.document_root = root.into();
    }

    /// Image served for every missing source, ahead of any per-request
    /// `placeholder` parameter.
    pub fn set_placeholder(&mut self, path: Option<&Path>) {
        self.placeholder = path.map(|p| self.layout.absolute(p));
    }

    pub fn defaults(&self) -> &TransformParams {
        &self.defaults
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// The full parameter set a request with `overrides` would use.
    pub fn params(&self, overrides: &ParamOverrides) -> TransformParams {
        self.defaults.merged(overrides)
    }

    /// The link a request would return, without rendering anything or
    /// creating directories. `None` when neither the source nor a placeholder
    /// exists.
    pub fn path(&self, source: &Path, overrides: &ParamOverrides) -> Option<String> {
        let params = self.params(overrides);
        let resolved = self.resolve_source(source, &params)?;
        let target = self.layout.cache_path(&resolved.path, &params);
        Some(self.layout.relative_link(&target))
    }

    /// Return a current thumbnail for `source`, rendering it if needed.
    ///
    /// `Ok(None)` when neither the source nor a placeholder exists.
    #[tracing::instrument(skip_all, fields(source = %source.display()))]
    pub fn get(
        &self,
        source: &Path,
        overrides: &ParamOverrides,
    ) -> Result<Option<Thumbnail>, ThumbnailError> {
        let params = self.params(overrides);
        let Some(resolved) = self.resolve_source(source, &params) else {
            warn!("Source not found and no placeholder available");
            return Ok(None);
        };

        let target = self.layout.cache_path(&resolved.path, &params);
        let link = self.layout.relative_link(&target);
        let mtime = cache::source_mtime(&resolved.path)?;

        if cache::is_fresh(&target, mtime) {
            debug!(link = %link, "Cache hit");
            return Ok(Some(Thumbnail {
                path: target,
                link,
                status: CacheStatus::Hit,
                placeholder: resolved.placeholder,
            }));
        }

        let format = Format::from_path(&target)?;
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)?;
        }

        let image = self.render(&resolved.path, &params)?;
        let bytes = image.encode(format, Quality::new(params.quality))?;
        cache::store(&target, &bytes, mtime)?;

        info!(link = %link, width = image.width(), height = image.height(), "Generated thumbnail");
        Ok(Some(Thumbnail {
            path: target,
            link,
            status: CacheStatus::Generated,
            placeholder: resolved.placeholder,
        }))
    }

    /// The source if it is a file, else the first existing placeholder:
    /// the configured one, then the request's own `placeholder` parameter.
    fn resolve_source(&self, source: &Path, params: &TransformParams) -> Option<ResolvedSource> {
        let path = self.layout.absolute(source);
        if path.is_file() {
            return Some(ResolvedSource {
                path,
                placeholder: false,
            });
        }

        let requested = params
            .placeholder
            .as_deref()
            .map(|p| self.layout.absolute(Path::new(p)));
        let fallback = [self.placeholder.clone(), requested]
            .into_iter()
            .flatten()
            .find(|p| p.is_file())?;

        debug!(placeholder = %fallback.display(), "Source missing, using placeholder");
        Some(ResolvedSource {
            path: fallback,
            placeholder: true,
        })
    }

    /// Decode `source` and apply sizing and overlays from `params`.
    fn render(&self, source: &Path, params: &TransformParams) -> Result<ImageHandle, ImagingError> {
        let mut image = ImageHandle::open(source)?;
        let (width, height) = (params.width, params.height);

        image = match (width > 0, height > 0) {
            (true, true) => {
                if let Some(anchor) = params.crop.anchor() {
                    image.crop(width, height, anchor)
                } else if let Some(background) = params.scale.background() {
                    image.scale(width, height, &background)
                } else {
                    image.fit(width, height)
                }
            }
            (true, false) => image.to_width(width),
            (false, true) => image.to_height(height),
            (false, false) => image,
        };

        if let Some(watermark) = params.watermark.as_deref().filter(|w| !w.is_empty()) {
            let path = self.layout.absolute(Path::new(watermark));
            if path.is_file() {
                let options = WatermarkOptions {
                    anchor: params.wm_position,
                    opacity: params.wm_opacity,
                    ..WatermarkOptions::default()
                };
                image = image.watermark_file(&path, &options)?;
            } else {
                warn!(watermark = %path.display(), "Watermark file not found, skipping");
            }
        }

        if let Some(text) = params.wm_text.as_deref().filter(|t| !t.is_empty()) {
            let options = TextOptions {
                font: params.wm_text_font.as_deref().map(PathBuf::from),
                size: f64::from(params.wm_text_size),
                color: Color::normalize(&params.wm_text_color, params.wm_opacity),
                anchor: params.wm_position,
                ..TextOptions::default()
            };
            image = image.text(&self.typesetter, text, &options)?;
        }

        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Anchor;
    use crate::imaging::text::tests::MockTypesetter;
    use crate::params::Crop;
    use crate::test_helpers::{create_test_jpeg, create_test_png};
    use tempfile::TempDir;

    fn thumbnailer(root: &Path) -> Thumbnailer<MockTypesetter> {
        let config = Config {
            document_root: root.to_path_buf(),
            ..Config::default()
        };
        Thumbnailer::with_typesetter(&config, MockTypesetter::default())
    }

    fn crop(width: u32, height: u32) -> ParamOverrides {
        ParamOverrides {
            width: Some(width),
            height: Some(height),
            crop: Some(Crop::Anchor(Anchor::Center)),
            ..ParamOverrides::default()
        }
    }

    #[test]
    fn get_generates_then_hits() {
        let tmp = TempDir::new().unwrap();
        create_test_jpeg(&tmp.path().join("images/a.jpg"), 400, 200);
        let thumbs = thumbnailer(tmp.path());

        let first = thumbs
            .get(Path::new("/images/a.jpg"), &crop(100, 100))
            .unwrap()
            .unwrap();
        assert_eq!(first.status, CacheStatus::Generated);
        assert_eq!(first.link, "/images/thumbs/w100-h100-ccenter-q80/a.jpg");
        assert!(!first.placeholder);

        let second = thumbs
            .get(Path::new("/images/a.jpg"), &crop(100, 100))
            .unwrap()
            .unwrap();
        assert_eq!(second.status, CacheStatus::Hit);
        assert_eq!(second.path, first.path);
    }

    #[test]
    fn cache_file_carries_source_mtime() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("a.jpg");
        create_test_jpeg(&source, 40, 20);
        let thumbs = thumbnailer(tmp.path());

        let thumb = thumbs
            .get(Path::new("a.jpg"), &crop(10, 10))
            .unwrap()
            .unwrap();
        assert_eq!(
            cache::source_mtime(&thumb.path).unwrap(),
            cache::source_mtime(&source).unwrap()
        );
    }

    #[test]
    fn missing_source_without_placeholder_is_none() {
        let tmp = TempDir::new().unwrap();
        let thumbs = thumbnailer(tmp.path());
        let result = thumbs.get(Path::new("/nope.jpg"), &crop(10, 10)).unwrap();
        assert!(result.is_none());
        assert!(thumbs.path(Path::new("/nope.jpg"), &crop(10, 10)).is_none());
    }

    #[test]
    fn request_placeholder_used_for_missing_source() {
        let tmp = TempDir::new().unwrap();
        create_test_png(&tmp.path().join("missing.png"), 30, 30);
        let thumbs = thumbnailer(tmp.path());

        let overrides = ParamOverrides {
            placeholder: Some("/missing.png".into()),
            ..crop(10, 10)
        };
        let thumb = thumbs
            .get(Path::new("/gone.jpg"), &overrides)
            .unwrap()
            .unwrap();
        assert!(thumb.placeholder);
        assert_eq!(thumb.link, "/thumbs/w10-h10-ccenter-q80/missing.png");
    }

    #[test]
    fn configured_placeholder_wins_over_request_placeholder() {
        let tmp = TempDir::new().unwrap();
        create_test_png(&tmp.path().join("site.png"), 30, 30);
        create_test_png(&tmp.path().join("request.png"), 30, 30);
        let mut thumbs = thumbnailer(tmp.path());
        thumbs.set_placeholder(Some(Path::new("/site.png")));

        let overrides = ParamOverrides {
            placeholder: Some("/request.png".into()),
            ..crop(10, 10)
        };
        let link = thumbs.path(Path::new("/gone.jpg"), &overrides).unwrap();
        assert!(link.ends_with("/site.png"), "{link}");
    }

    #[test]
    fn path_mode_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        create_test_jpeg(&tmp.path().join("a.jpg"), 40, 20);
        let thumbs = thumbnailer(tmp.path());

        let link = thumbs.path(Path::new("/a.jpg"), &crop(10, 10)).unwrap();
        assert_eq!(link, "/thumbs/w10-h10-ccenter-q80/a.jpg");
        assert!(!tmp.path().join("thumbs").exists());
    }

    #[test]
    fn set_defaults_applies_to_later_requests() {
        let tmp = TempDir::new().unwrap();
        let mut thumbs = thumbnailer(tmp.path());
        thumbs.set_defaults(&ParamOverrides {
            quality: Some(50),
            ..ParamOverrides::default()
        });
        assert_eq!(thumbs.params(&ParamOverrides::default()).quality, 50);
        assert_eq!(
            thumbs
                .params(&ParamOverrides {
                    quality: Some(90),
                    ..ParamOverrides::default()
                })
                .quality,
            90
        );
    }

    #[test]
    fn config_defaults_seed_params() {
        let config = Config {
            defaults: ParamOverrides {
                width: Some(64),
                ..ParamOverrides::default()
            },
            ..Config::default()
        };
        let thumbs = Thumbnailer::with_typesetter(&config, MockTypesetter::default());
        assert_eq!(thumbs.defaults().width, 64);
    }

    #[test]
    fn cache_directory_mirrors_source_dir() {
        let tmp = TempDir::new().unwrap();
        create_test_jpeg(&tmp.path().join("img/a.jpg"), 40, 20);
        let mut thumbs = thumbnailer(tmp.path());
        thumbs.set_cache_directory(Some(PathBuf::from("/cache")));

        let thumb = thumbs
            .get(Path::new("/img/a.jpg"), &crop(10, 10))
            .unwrap()
            .unwrap();
        assert_eq!(thumb.link, "/cache/img/w10-h10-ccenter-q80/a.jpg");
        assert!(thumb.path.is_file());
    }

    #[test]
    fn both_dimensions_without_mode_fit() {
        let tmp = TempDir::new().unwrap();
        create_test_jpeg(&tmp.path().join("a.jpg"), 400, 200);
        let thumbs = thumbnailer(tmp.path());
        let overrides = ParamOverrides {
            width: Some(100),
            height: Some(100),
            ..ParamOverrides::default()
        };
        let thumb = thumbs.get(Path::new("/a.jpg"), &overrides).unwrap().unwrap();
        let image = ImageHandle::open(&thumb.path).unwrap();
        assert_eq!(image.dimensions(), (100, 50));
    }

    #[test]
    fn width_only_keeps_aspect() {
        let tmp = TempDir::new().unwrap();
        create_test_jpeg(&tmp.path().join("a.jpg"), 400, 200);
        let thumbs = thumbnailer(tmp.path());
        let overrides = ParamOverrides {
            width: Some(200),
            ..ParamOverrides::default()
        };
        let thumb = thumbs.get(Path::new("/a.jpg"), &overrides).unwrap().unwrap();
        assert_eq!(thumb.link, "/thumbs/w200-q80/a.jpg");
        let image = ImageHandle::open(&thumb.path).unwrap();
        assert_eq!(image.dimensions(), (200, 100));
    }

    #[test]
    fn text_watermark_uses_position_and_opacity() {
        let tmp = TempDir::new().unwrap();
        create_test_jpeg(&tmp.path().join("a.jpg"), 100, 100);
        let thumbs = thumbnailer(tmp.path());
        let overrides = ParamOverrides {
            wm_text: Some("hi".into()),
            wm_text_size: Some(10),
            wm_position: Some(Anchor::BottomLeft),
            ..ParamOverrides::default()
        };
        thumbs.get(Path::new("/a.jpg"), &overrides).unwrap().unwrap();

        let draws = thumbs.typesetter.get_draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].text, "hi");
        assert_eq!(draws[0].baseline, (0, 100));
        // #FFFFFF at the default 0.6 opacity: 127 - 76.2 -> 50 steps.
        assert_eq!(draws[0].color, image::Rgba([255, 255, 255, 155]));
    }

    #[test]
    fn missing_watermark_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        create_test_jpeg(&tmp.path().join("a.jpg"), 40, 40);
        let thumbs = thumbnailer(tmp.path());
        let overrides = ParamOverrides {
            watermark: Some("/logo.png".into()),
            ..ParamOverrides::default()
        };
        let thumb = thumbs.get(Path::new("/a.jpg"), &overrides).unwrap().unwrap();
        assert_eq!(thumb.status, CacheStatus::Generated);
        assert!(thumb.link.contains("wm_"), "{}", thumb.link);
    }

    #[test]
    fn data_uri_embeds_cached_bytes() {
        use base64::Engine;
        use base64::engine::general_purpose::STANDARD;

        let tmp = TempDir::new().unwrap();
        create_test_jpeg(&tmp.path().join("a.jpg"), 40, 20);
        let thumbs = thumbnailer(tmp.path());
        let thumb = thumbs.get(Path::new("/a.jpg"), &crop(10, 10)).unwrap().unwrap();

        let uri = thumb.data_uri().unwrap();
        let payload = uri.strip_prefix("data:image/jpeg;base64,").unwrap();
        assert_eq!(STANDARD.decode(payload).unwrap(), fs::read(&thumb.path).unwrap());
    }

    #[test]
    fn unsupported_extension_is_error() {
        let tmp = TempDir::new().unwrap();
        // Valid PNG bytes behind an extension no encoder handles.
        create_test_png(&tmp.path().join("a.bmp"), 10, 10);
        let thumbs = thumbnailer(tmp.path());
        let result = thumbs.get(Path::new("/a.bmp"), &crop(5, 5));
        assert!(matches!(
            result,
            Err(ThumbnailError::Imaging(ImagingError::UnsupportedFormat(_)))
        ));
    }
}
