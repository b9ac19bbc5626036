//! Thumbnail cache: where a rendered thumbnail lives and whether it is current.
//!
//! Rendering is the expensive part of a request. This module decides, without
//! decoding anything, whether a previously rendered file can be served as-is.
//!
//! # Design
//!
//! ## Cache keys
//!
//! The cache is **path-addressed**: every distinct parameter set maps to its
//! own directory, named by a [`fingerprint`] of the parameters:
//!
//! ```text
//! <cache base>/w100-h100-ccenter-q80/photo.jpg
//! ```
//!
//! - Each non-empty parameter contributes `alias + value`, lowercased, with
//!   spaces and `#` stripped (`crop = "top left"` becomes `ctopleft`).
//! - Watermark parameters are collapsed into a single `wm_<crc32>` token,
//!   and only when a watermark image or text is actually requested. The
//!   token hashes the concatenated raw values so long texts and paths don't
//!   blow up the directory name.
//! - Quality is always appended as `-q<quality>`.
//!
//! ## Freshness
//!
//! A cached file is current when its modification time equals the source's
//! exactly. [`store`] stamps each new file with the source's mtime, so any
//! later edit to the source (forward *or* backward in time) invalidates it.
//!
//! ## Storage
//!
//! Without a cache directory, thumbnails go into a `thumbs/` folder next to
//! the source. With one, the source's directory (relative to the document
//! root) is mirrored below it, so `/images/a.jpg` with cache dir `/cache`
//! lands in `/cache/images/<fingerprint>/a.jpg`.
//!
//! Files are written to a temporary file in the destination directory and
//! renamed into place, so concurrent readers see either the old file or the
//! complete new one.

use crate::params::TransformParams;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;

/// Folder created next to sources when no cache directory is configured.
pub const THUMBS_DIR: &str = "thumbs";

/// Directory name encoding the parameters that produced a thumbnail.
pub fn fingerprint(params: &TransformParams) -> String {
    let watermarked = params.has_watermark();
    let mut tokens = Vec::new();
    let mut wm = String::new();

    for (alias, value) in params.fingerprint_entries() {
        let Some(value) = value else { continue };
        if alias.starts_with("wm") {
            if watermarked {
                wm.push_str(&value);
            }
        } else {
            tokens.push(format!("{alias}{}", value.replace([' ', '#'], "")).to_lowercase());
        }
    }

    if !wm.is_empty() {
        tokens.push(format!("wm_{:08x}", crc32fast::hash(wm.as_bytes())));
    }

    format!("{}-q{}", tokens.join("-"), params.quality)
}

/// Output extension: the source's own, or `png` when a transparent
/// letterbox background needs an alpha channel.
pub fn cache_extension(source: &Path, params: &TransformParams) -> String {
    if params.scale.has_alpha() {
        return "png".to_string();
    }
    source
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Maps source paths to cache paths and site-relative links.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLayout {
    pub document_root: PathBuf,
    pub cache_dir: Option<PathBuf>,
}

impl CacheLayout {
    pub fn new(document_root: impl Into<PathBuf>, cache_dir: Option<PathBuf>) -> Self {
        Self {
            document_root: document_root.into(),
            cache_dir,
        }
    }

    /// `path` relative to the document root, always with a leading `/`.
    ///
    /// Paths outside the root are returned as-is (with the leading `/`).
    pub fn relative_link(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.document_root).unwrap_or(path);
        let relative = relative.to_string_lossy().replace('\\', "/");
        format!("/{}", relative.trim_start_matches('/'))
    }

    /// Resolve a site-relative, root-relative or absolute-under-root path.
    pub fn absolute(&self, path: &Path) -> PathBuf {
        let link = self.relative_link(path);
        self.document_root.join(link.trim_start_matches('/'))
    }

    /// Directory holding every fingerprint folder for sources in `source_dir`.
    pub fn cache_base(&self, source_dir: &Path) -> PathBuf {
        match &self.cache_dir {
            Some(cache_dir) => {
                let cache = self.relative_link(cache_dir);
                let mirrored = self.relative_link(source_dir);
                self.document_root
                    .join(cache.trim_start_matches('/'))
                    .join(mirrored.trim_start_matches('/'))
            }
            None => self.absolute(source_dir).join(THUMBS_DIR),
        }
    }

    /// Full cache path for `source` rendered with `params`.
    pub fn cache_path(&self, source: &Path, params: &TransformParams) -> PathBuf {
        let source = self.absolute(source);
        let dir = source.parent().unwrap_or(&self.document_root);
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = cache_extension(&source, params);
        let file_name = if ext.is_empty() {
            stem
        } else {
            format!("{stem}.{ext}")
        };

        let path = self.cache_base(dir).join(fingerprint(params)).join(file_name);
        tracing::debug!(source = %source.display(), cache = %path.display(), "Resolved cache path");
        path
    }
}

pub fn source_mtime(path: &Path) -> io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

/// Whether `cached` exists and carries exactly `source_mtime`.
pub fn is_fresh(cached: &Path, source_mtime: SystemTime) -> bool {
    std::fs::metadata(cached)
        .and_then(|m| if m.is_file() { m.modified() } else { Err(io::ErrorKind::NotFound.into()) })
        .is_ok_and(|mtime| mtime == source_mtime)
}

/// Atomically write `bytes` to `path` and stamp it with `mtime`.
///
/// The parent directory must exist.
pub fn store(path: &Path, bytes: &[u8], mtime: SystemTime) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "cache path has no parent"))?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().set_modified(mtime)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Summary of cache performance for a batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
    pub skipped: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses + self.skipped
    }

    /// Combine two partial tallies (used to reduce parallel results).
    pub fn merge(self, other: CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            skipped: self.skipped + other.skipped,
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(f, "{} cached, {} encoded", self.hits, self.misses)?;
        } else {
            write!(f, "{} encoded", self.misses)?;
        }
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        if self.hits > 0 || self.skipped > 0 {
            write!(f, " ({} total)", self.total())?;
        }
        Ok(())
    }
}
