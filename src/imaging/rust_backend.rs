//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::ImageReader` with format sniffing |
//! | Crop | `image::DynamicImage::crop_imm` on the rounded crop region |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` with explicit quality |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (defaults) |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless only) |

use super::backend::{BackendError, ImageBackend, RasterBuffer, SourceImage};
use super::params::{CropRect, OutputFormat, OutputSpec, Quality};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_jpeg(image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    // JPEG has no alpha channel; flatten before encoding.
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
    rgb.write_with_encoder(encoder)
        .map_err(|e| BackendError::Encode(format!("JPEG encode failed: {}", e)))?;
    Ok(buf)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, BackendError> {
    let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
    let mut buf = Vec::new();
    rgba.write_with_encoder(PngEncoder::new(&mut buf))
        .map_err(|e| BackendError::Encode(format!("PNG encode failed: {}", e)))?;
    Ok(buf)
}

fn encode_webp(image: &DynamicImage) -> Result<Vec<u8>, BackendError> {
    let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
    let mut buf = Vec::new();
    rgba.write_with_encoder(WebPEncoder::new_lossless(&mut buf))
        .map_err(|e| BackendError::Encode(format!("WebP encode failed: {}", e)))?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn decode(&self, bytes: &[u8]) -> Result<SourceImage, BackendError> {
        let image = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .decode()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(BackendError::Decode("image has no pixels".to_string()));
        }
        Ok(SourceImage::from_image(image))
    }

    fn rasterize(
        &self,
        source: &SourceImage,
        crop: &CropRect,
        output: OutputSpec,
    ) -> Result<RasterBuffer, BackendError> {
        if output.width == 0 || output.height == 0 {
            return Err(BackendError::ProcessingFailed(format!(
                "empty output size {}x{}",
                output.width, output.height
            )));
        }
        let (x, y, w, h) = crop.to_pixel_region(source.width, source.height);
        let region = source.pixels().crop_imm(x, y, w, h);

        let image = if (w, h) == (output.width, output.height) {
            region
        } else {
            region.resize_exact(output.width, output.height, FilterType::Lanczos3)
        };

        Ok(RasterBuffer {
            width: output.width,
            height: output.height,
            image,
        })
    }

    fn encode(
        &self,
        raster: &RasterBuffer,
        format: OutputFormat,
        quality: Option<Quality>,
    ) -> Result<Vec<u8>, BackendError> {
        match format {
            OutputFormat::Jpeg => encode_jpeg(&raster.image, quality.unwrap_or_default()),
            OutputFormat::Png => encode_png(&raster.image),
            OutputFormat::Webp => encode_webp(&raster.image),
        }
    }
}
