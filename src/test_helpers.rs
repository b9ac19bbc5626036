//! Shared test utilities for the thumbcache test suite.
//!
//! Synthetic image writers so tests never depend on binary fixtures. The
//! mock typesetter lives next to the trait in
//! [`imaging::text::tests`](crate::imaging::text::tests).
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! create_test_jpeg(&tmp.path().join("images/a.jpg"), 400, 200);
//! ```

use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;

/// Write a gradient JPEG, creating parent directories.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    create_parent(path);
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    img.save_with_format(path, ImageFormat::Jpeg).unwrap();
}

/// Write a half-transparent PNG, creating parent directories.
///
/// The format is fixed regardless of `path`'s extension.
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    create_parent(path);
    let img = RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 255, 0])
        }
    });
    img.save_with_format(path, ImageFormat::Png).unwrap();
}

fn create_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
}
