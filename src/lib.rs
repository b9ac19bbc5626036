//! # thumbcache
//!
//! On-demand image thumbnails backed by a deterministic file cache. A request
//! names a source image and a set of transform parameters; the first request
//! renders the thumbnail and stores it at a path derived from those
//! parameters, every later identical request is served from that file until
//! the source changes.
//!
//! ```text
//! /images/a.jpg  +  { w: 100, h: 100, c: center }
//!        │
//!        ▼
//! /images/thumbs/w100-h100-ccenter-q80/a.jpg
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`thumbnail`] | Request orchestration: [`Thumbnailer`](thumbnail::Thumbnailer) resolves, renders and caches |
//! | [`cache`] | Parameter fingerprints, cache paths, freshness and atomic stores |
//! | [`params`] | Transform parameters, short aliases and request overrides |
//! | [`imaging`] | Decode, resize/crop/letterbox, watermark and text overlays, encode |
//! | [`color`] | Color specifications and GD-style alpha conversion |
//! | [`config`] | `thumbcache.toml` loading, merging and validation |
//! | [`warm`] | Parallel batch rendering of a directory tree |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## The Path Is the Cache Key
//!
//! There is no index or database. A thumbnail's location encodes every
//! parameter that affects its pixels, so a lookup is a single `stat`. The
//! cache file's mtime is stamped with the source's mtime when written; any
//! mismatch later means the source changed and the thumbnail is re-rendered.
//!
//! ## No Global State
//!
//! Defaults, document root, cache directory and placeholder live on a
//! [`Thumbnailer`](thumbnail::Thumbnailer) instance. Two sites (or two tests)
//! can run side by side without stepping on each other.
//!
//! ## Format Follows the Source
//!
//! Thumbnails keep the source's format, except that a letterbox with a
//! translucent background is written as PNG so the transparency survives.

pub mod cache;
pub mod color;
pub mod config;
pub mod imaging;
pub mod output;
pub mod params;
pub mod thumbnail;
pub mod warm;

#[cfg(test)]
pub(crate) mod test_helpers;
