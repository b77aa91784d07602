//! High-level image operations.
//!
//! These functions combine calculations with backend execution: plan the
//! crop and output size from [`ConditionParams`], rasterize, and run the
//! size-fitting encode search.

use super::backend::{BackendError, ImageBackend, RasterBuffer, SourceImage};
use super::calculations::{compute_centered_crop, compute_output_size};
use super::params::{ConditionParams, CropRect, OutputFormat, OutputSpec, Quality};
use serde::Serialize;
use tracing::debug;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// First quality tried by the size search.
pub const START_QUALITY: u32 = 90;
/// Quality drop between attempts.
pub const QUALITY_STEP: u32 = 10;
/// Upper bound on encode attempts: 90, 80, ..., 10.
pub const MAX_ENCODE_ATTEMPTS: u32 = 9;

/// Centered auto-crop for a source under the run's target ratio.
pub fn plan_crop(source: &SourceImage, params: &ConditionParams) -> CropRect {
    compute_centered_crop(
        source.width as f64,
        source.height as f64,
        params.target_ratio(),
    )
}

/// Output raster size for a crop under the run's caps.
pub fn plan_output(crop: &CropRect, params: &ConditionParams) -> OutputSpec {
    compute_output_size(crop, params.max_width, params.max_height, params.target_ratio())
}

/// Rasterize a crop at its planned output size.
pub fn render(
    backend: &impl ImageBackend,
    source: &SourceImage,
    crop: &CropRect,
    params: &ConditionParams,
) -> Result<RasterBuffer> {
    let output = plan_output(crop, params);
    backend.rasterize(source, crop, output)
}

/// Final encoded payload of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedArtifact {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    /// Quality used, for formats that take one.
    pub quality: Option<Quality>,
}

impl EncodedArtifact {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn size_kb(&self) -> f64 {
        self.bytes.len() as f64 / 1024.0
    }
}

/// One encode in the size search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EncodeAttempt {
    pub quality: Option<Quality>,
    pub size: usize,
}

/// Outcome of [`fit_to_size`].
#[derive(Debug, Clone)]
pub struct FitReport {
    pub artifact: EncodedArtifact,
    pub attempts: Vec<EncodeAttempt>,
    /// False when the search ran out of quality steps above budget.
    pub within_budget: bool,
}

/// Encode a raster under a size budget, best effort.
///
/// JPEG starts at quality 90 and steps down by 10 until the payload fits
/// `max_size_kb` or quality 10 has been tried, so at most
/// [`MAX_ENCODE_ATTEMPTS`] encodes run. The last attempt is returned whether
/// or not it fits.
///
/// PNG and WebP have no quality axis here: they are encoded once at default
/// settings and reported against the budget as-is.
///
/// `on_attempt` sees every attempt as it completes.
pub fn fit_to_size(
    backend: &impl ImageBackend,
    raster: &RasterBuffer,
    format: OutputFormat,
    max_size_kb: f64,
    mut on_attempt: impl FnMut(&EncodeAttempt),
) -> Result<FitReport> {
    let mut attempts = Vec::new();

    for step in 0..MAX_ENCODE_ATTEMPTS {
        let quality = format
            .supports_quality()
            .then(|| Quality::new(START_QUALITY - step * QUALITY_STEP));

        let bytes = backend.encode(raster, format, quality)?;
        let attempt = EncodeAttempt {
            quality,
            size: bytes.len(),
        };
        debug!(
            format = %format,
            quality = quality.map(Quality::value),
            size = attempt.size,
            "encode attempt"
        );
        on_attempt(&attempt);
        attempts.push(attempt);

        let within_budget = bytes.len() as f64 / 1024.0 <= max_size_kb;
        let exhausted = quality.is_none() || step + 1 == MAX_ENCODE_ATTEMPTS;
        if within_budget || exhausted {
            return Ok(FitReport {
                artifact: EncodedArtifact {
                    bytes,
                    format,
                    quality,
                },
                attempts,
                within_budget,
            });
        }
    }

    Err(BackendError::Encode(
        "size search finished without an attempt".to_string(),
    ))
}
