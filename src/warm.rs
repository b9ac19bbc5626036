//! Batch cache warming: render one parameter set for every image in a tree.
//!
//! Discovery walks the directory with [walkdir](https://docs.rs/walkdir),
//! skipping `thumbs/` folders and the configured cache directory so cached
//! output is never fed back in as a source. Rendering runs on the global
//! [rayon](https://docs.rs/rayon) pool; callers size it from
//! [`ProcessingConfig`](crate::config::ProcessingConfig).
//!
//! Progress is reported through an optional channel so a printer thread can
//! stream lines while workers are still busy. The returned [`CacheStats`]
//! counts each source exactly once.

use crate::cache::{CacheStats, THUMBS_DIR};
use crate::imaging::Typesetter;
use crate::params::ParamOverrides;
use crate::thumbnail::{CacheStatus, Thumbnail, Thumbnailer};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// Extensions picked up by [`find_sources`] (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Progress for one source during [`warm`].
#[derive(Debug, Clone, PartialEq)]
pub enum WarmEvent {
    Rendered {
        source: PathBuf,
        thumbnail: Thumbnail,
    },
    /// The source vanished and no placeholder was available.
    Missing { source: PathBuf },
    Failed { source: PathBuf, error: String },
}

/// Every supported image under `dir`, sorted, excluding `skip_dirs` and any
/// directory named `thumbs`.
pub fn find_sources(dir: &Path, skip_dirs: &[PathBuf]) -> Vec<PathBuf> {
    let keep = |entry: &DirEntry| {
        if !entry.file_type().is_dir() || entry.depth() == 0 {
            return true;
        }
        entry.file_name() != THUMBS_DIR && !skip_dirs.iter().any(|s| s == entry.path())
    };

    let mut sources: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_entry(keep)
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_supported(entry.path()))
        .map(DirEntry::into_path)
        .collect();
    sources.sort();
    sources
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Render `overrides` for every source under `dir` (resolved against the
/// document root) and tally cache hits, encodes and skips.
pub fn warm<T: Typesetter>(
    thumbnailer: &Thumbnailer<T>,
    dir: &Path,
    overrides: &ParamOverrides,
    progress: Option<Sender<WarmEvent>>,
) -> CacheStats {
    let layout = thumbnailer.layout();
    let root = layout.absolute(dir);
    let skip: Vec<PathBuf> = layout
        .cache_dir
        .iter()
        .map(|c| layout.absolute(c))
        .collect();
    let sources = find_sources(&root, &skip);

    sources
        .par_iter()
        .map_with(progress, |tx, source| {
            let mut stats = CacheStats::default();
            let event = match thumbnailer.get(source, overrides) {
                Ok(Some(thumbnail)) => {
                    match thumbnail.status {
                        CacheStatus::Hit => stats.hit(),
                        CacheStatus::Generated => stats.miss(),
                    }
                    WarmEvent::Rendered {
                        source: source.clone(),
                        thumbnail,
                    }
                }
                Ok(None) => {
                    stats.skip();
                    WarmEvent::Missing {
                        source: source.clone(),
                    }
                }
                Err(err) => {
                    warn!(source = %source.display(), error = %err, "Thumbnail failed");
                    stats.skip();
                    WarmEvent::Failed {
                        source: source.clone(),
                        error: err.to_string(),
                    }
                }
            };
            if let Some(tx) = tx {
                tx.send(event).ok();
            }
            stats
        })
        .reduce(CacheStats::default, CacheStats::merge)
}
