//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations every backend must
//! support: decode, rasterize, and encode. Everything above it (the size
//! search, the pipeline session) is backend-agnostic, so tests can swap in a
//! mock that scripts dimensions and encoded sizes.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate.

use super::params::{CropRect, OutputFormat, OutputSpec, Quality};
use image::DynamicImage;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Natural size of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// A decoded, read-only source image.
///
/// Cloning shares the pixel data, so a pending job can hold the image while
/// the session keeps its own handle.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub width: u32,
    pub height: u32,
    pixels: Arc<DynamicImage>,
}

impl SourceImage {
    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: Arc::new(image),
        }
    }

    /// Natural size only; pixel data is a 1x1 stand-in.
    #[cfg(test)]
    pub(crate) fn dimensions_only(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: Arc::new(DynamicImage::new_rgb8(1, 1)),
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }
}

/// Pixels at the output size, ready to encode.
#[derive(Debug, Clone)]
pub struct RasterBuffer {
    pub width: u32,
    pub height: u32,
    pub image: DynamicImage,
}

/// Trait for image processing backends.
pub trait ImageBackend: Sync {
    /// Decode raw file bytes into a source image.
    fn decode(&self, bytes: &[u8]) -> Result<SourceImage, BackendError>;

    /// Draw `crop` of the source into a buffer of exactly `output` size.
    fn rasterize(
        &self,
        source: &SourceImage,
        crop: &CropRect,
        output: OutputSpec,
    ) -> Result<RasterBuffer, BackendError>;

    /// Encode a raster. `quality` is only honoured by lossy formats.
    fn encode(
        &self,
        raster: &RasterBuffer,
        format: OutputFormat,
        quality: Option<Quality>,
    ) -> Result<Vec<u8>, BackendError>;
}
