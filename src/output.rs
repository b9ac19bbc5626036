//! CLI output formatting.
//!
//! Output leads with the thing a caller actually wants, the thumbnail link,
//! with the source and cache status as indented context lines:
//!
//! ```text
//! /images/thumbs/w100-h100-ccenter-q80/a.jpg
//!     Source: /images/a.jpg
//!     Status: encoded
//! ```
//!
//! Every formatter returns `Vec<String>` so tests can assert on lines; the
//! `print_*` wrappers write them to stdout.

use crate::cache::{CacheLayout, CacheStats};
use crate::thumbnail::{CacheStatus, Thumbnail};
use crate::warm::WarmEvent;

/// Indentation for context lines.
const INDENT: &str = "    ";

fn status_label(status: CacheStatus) -> &'static str {
    match status {
        CacheStatus::Hit => "cached",
        CacheStatus::Generated => "encoded",
    }
}

// ============================================================================
// Single thumbnail
// ============================================================================

/// Format a rendered (or cached) thumbnail for `source`.
pub fn format_thumbnail(thumbnail: &Thumbnail, source: &str) -> Vec<String> {
    let mut lines = vec![
        thumbnail.link.clone(),
        format!("{INDENT}Source: {source}"),
        format!("{INDENT}Status: {}", status_label(thumbnail.status)),
    ];
    if thumbnail.placeholder {
        lines.push(format!("{INDENT}Placeholder: source missing"));
    }
    lines
}

pub fn format_missing(source: &str) -> Vec<String> {
    vec![
        format!("{source} (missing)"),
        format!("{INDENT}No source file and no placeholder"),
    ]
}

pub fn print_thumbnail(thumbnail: &Thumbnail, source: &str) {
    for line in format_thumbnail(thumbnail, source) {
        println!("{}", line);
    }
}

pub fn print_missing(source: &str) {
    for line in format_missing(source) {
        println!("{}", line);
    }
}

// ============================================================================
// Warm
// ============================================================================

/// Format one warm progress event. Sources are shown as site links.
pub fn format_warm_event(event: &WarmEvent, layout: &CacheLayout) -> Vec<String> {
    match event {
        WarmEvent::Rendered { source, thumbnail } => {
            format_thumbnail(thumbnail, &layout.relative_link(source))
        }
        WarmEvent::Missing { source } => format_missing(&layout.relative_link(source)),
        WarmEvent::Failed { source, error } => vec![
            format!("{} (failed)", layout.relative_link(source)),
            format!("{INDENT}Error: {error}"),
        ],
    }
}

pub fn format_warm_summary(stats: &CacheStats) -> Vec<String> {
    vec![format!("Cache: {stats}")]
}

pub fn print_warm_summary(stats: &CacheStats) {
    for line in format_warm_summary(stats) {
        println!("{}", line);
    }
}
