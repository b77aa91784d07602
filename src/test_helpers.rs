//! Shared test utilities for the aspectfit test suite.
//!
//! Synthetic images only: nothing here reads fixtures from disk, so every test
//! gets pixels with a known layout and a known encoded form.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let bytes = gradient_jpeg_bytes(1000, 500);
//! let source = RustBackend::new().decode(&bytes).unwrap();
//! assert_eq!(source.width, 1000);
//! ```

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageEncoder, Rgb, RgbImage};

// =========================================================================
// Pixel generators
// =========================================================================

/// Gradient with a little per-pixel texture, so lossy encoders have
/// something to throw away at lower quality.
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let texture = ((x * 31 + y * 17) % 23) as u8 * 4;
        Rgb([
            (x % 256) as u8,
            (y % 256) as u8,
            128u8.wrapping_add(texture),
        ])
    });
    DynamicImage::ImageRgb8(img)
}

/// Left half pure red, right half pure blue.
pub fn split_color_image(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 0, 255])
        }
    });
    DynamicImage::ImageRgb8(img)
}

// =========================================================================
// Encoded forms
// =========================================================================

/// A valid JPEG file of [`gradient_image`] at the given size.
pub fn gradient_jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = gradient_image(width, height).to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    buf
}
