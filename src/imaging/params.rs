//! Parameter types for a conditioning run.
//!
//! These types describe *what* the pipeline must produce, not *how*. They are
//! the interface between configuration (which builds a [`ConditionParams`]),
//! the pure [`calculations`](super::calculations), and the
//! [`backend`](super::backend) that does the pixel work.
//!
//! ## Types
//!
//! - [`Ratio`] — target aspect ratio as `width:height`, both terms non-zero.
//! - [`Orientation`] — landscape keeps the ratio, portrait inverts it.
//! - [`OutputFormat`] — jpeg, png or webp, with MIME type and file extension.
//! - [`Quality`] — lossy encoding quality (1–100). Clamped on construction.
//! - [`ConditionParams`] — immutable configuration for one run.
//! - [`CropRect`] — crop in source-image pixel coordinates, with validation.
//! - [`OutputSpec`] — final raster dimensions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Relative tolerance for a crop rectangle's ratio against the target ratio.
///
/// User crops go through a display→source scale per axis, so they can drift
/// slightly from the exact ratio when the displayed image was rounded.
pub const CROP_RATIO_TOLERANCE: f64 = 0.01;

/// Absolute slack (in source pixels) allowed on the far edges of a crop.
const BOUNDS_EPSILON: f64 = 1e-6;

/// Target aspect ratio as `width:height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ratio {
    pub width: u32,
    pub height: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid ratio '{0}': expected W:H with positive integers")]
pub struct RatioParseError(pub String);

impl Ratio {
    pub fn new(width: u32, height: u32) -> Result<Self, RatioParseError> {
        if width == 0 || height == 0 {
            return Err(RatioParseError(format!("{width}:{height}")));
        }
        Ok(Self { width, height })
    }

    /// `width / height` as a float.
    pub fn value(self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl Default for Ratio {
    fn default() -> Self {
        Self {
            width: 16,
            height: 9,
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl FromStr for Ratio {
    type Err = RatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(':')
            .ok_or_else(|| RatioParseError(s.to_string()))?;
        let w: u32 = w
            .trim()
            .parse()
            .map_err(|_| RatioParseError(s.to_string()))?;
        let h: u32 = h
            .trim()
            .parse()
            .map_err(|_| RatioParseError(s.to_string()))?;
        Self::new(w, h).map_err(|_| RatioParseError(s.to_string()))
    }
}

impl TryFrom<String> for Ratio {
    type Error = RatioParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ratio> for String {
    fn from(ratio: Ratio) -> Self {
        ratio.to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Landscape => f.write_str("landscape"),
            Orientation::Portrait => f.write_str("portrait"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
        }
    }

    /// File extension used for downloads. Matches the format name.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
        }
    }

    /// Only JPEG exposes a quality knob to the size search.
    pub fn supports_quality(self) -> bool {
        matches!(self, OutputFormat::Jpeg)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Immutable configuration for one conditioning run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConditionParams {
    pub ratio: Ratio,
    pub orientation: Orientation,
    pub max_width: u32,
    pub max_height: u32,
    pub max_size_kb: f64,
    pub format: OutputFormat,
}

impl ConditionParams {
    /// Width:height the output must satisfy, after orientation inversion.
    pub fn target_ratio(&self) -> f64 {
        match self.orientation {
            Orientation::Landscape => self.ratio.width as f64 / self.ratio.height as f64,
            Orientation::Portrait => self.ratio.height as f64 / self.ratio.width as f64,
        }
    }
}

impl Default for ConditionParams {
    fn default() -> Self {
        Self {
            ratio: Ratio::default(),
            orientation: Orientation::Landscape,
            max_width: 1920,
            max_height: 1080,
            max_size_kb: 1000.0,
            format: OutputFormat::Jpeg,
        }
    }
}

/// Why a crop rectangle was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CropError {
    #[error("crop has non-positive size {width}x{height}")]
    Empty { width: f64, height: f64 },
    #[error("crop ({x}, {y}, {width}x{height}) exceeds source {source_width}x{source_height}")]
    OutOfBounds {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        source_width: u32,
        source_height: u32,
    },
    #[error("crop ratio {actual:.4} does not match target {target:.4}")]
    RatioMismatch { actual: f64, target: f64 },
}

/// Where a crop rectangle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CropProvenance {
    /// Centered auto-crop.
    Computed,
    /// Finalized from the interactive crop controller.
    UserSpecified,
}

/// Crop rectangle in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn full(source_width: u32, source_height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: source_width as f64,
            height: source_height as f64,
        }
    }

    pub fn ratio(&self) -> f64 {
        self.width / self.height
    }

    /// Check bounds, positivity and ratio against the source and target.
    pub fn validate(
        &self,
        source_width: u32,
        source_height: u32,
        target_ratio: f64,
    ) -> Result<(), CropError> {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.width <= 0.0 || self.height <= 0.0 {
            return Err(CropError::Empty {
                width: self.width,
                height: self.height,
            });
        }
        if self.x < 0.0
            || self.y < 0.0
            || self.x + self.width > source_width as f64 + BOUNDS_EPSILON
            || self.y + self.height > source_height as f64 + BOUNDS_EPSILON
        {
            return Err(CropError::OutOfBounds {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                source_width,
                source_height,
            });
        }
        let actual = self.ratio();
        if (actual - target_ratio).abs() / target_ratio > CROP_RATIO_TOLERANCE {
            return Err(CropError::RatioMismatch {
                actual,
                target: target_ratio,
            });
        }
        Ok(())
    }

    /// Integer pixel region `(x, y, width, height)` clamped to the source.
    ///
    /// Always at least 1x1 so the rasterizer never sees an empty region.
    pub fn to_pixel_region(&self, source_width: u32, source_height: u32) -> (u32, u32, u32, u32) {
        let x = (self.x.round().max(0.0) as u32).min(source_width.saturating_sub(1));
        let y = (self.y.round().max(0.0) as u32).min(source_height.saturating_sub(1));
        let w = (self.width.round() as u32).clamp(1, source_width - x);
        let h = (self.height.round() as u32).clamp(1, source_height - y);
        (x, y, w, h)
    }
}

/// Output raster dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputSpec {
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn ratio_parses_and_displays() {
        let r: Ratio = "4:3".parse().unwrap();
        assert_eq!(r, Ratio::new(4, 3).unwrap());
        assert_eq!(r.to_string(), "4:3");
        assert_eq!(" 16 : 9 ".parse::<Ratio>().unwrap(), Ratio::default());
    }

    #[test]
    fn ratio_rejects_zero_and_garbage() {
        assert!("0:9".parse::<Ratio>().is_err());
        assert!("16:0".parse::<Ratio>().is_err());
        assert!("16x9".parse::<Ratio>().is_err());
        assert!("a:b".parse::<Ratio>().is_err());
    }

    #[test]
    fn portrait_inverts_target_ratio() {
        let landscape = ConditionParams::default();
        let portrait = ConditionParams {
            orientation: Orientation::Portrait,
            ..landscape
        };
        assert!((landscape.target_ratio() - 16.0 / 9.0).abs() < 1e-12);
        assert!((portrait.target_ratio() - 9.0 / 16.0).abs() < 1e-12);
    }

    #[test]
    fn format_mime_and_extension() {
        assert_eq!(OutputFormat::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(OutputFormat::Png.mime_type(), "image/png");
        assert_eq!(OutputFormat::Webp.mime_type(), "image/webp");
        assert_eq!(OutputFormat::Jpeg.extension(), "jpeg");
        assert!(OutputFormat::Jpeg.supports_quality());
        assert!(!OutputFormat::Png.supports_quality());
        assert!(!OutputFormat::Webp.supports_quality());
    }

    // =========================================================================
    // CropRect validation
    // =========================================================================

    #[test]
    fn crop_validate_accepts_inscribed_rect() {
        let crop = CropRect {
            x: 100.0,
            y: 0.0,
            width: 800.0,
            height: 450.0,
        };
        assert!(crop.validate(1000, 450, 16.0 / 9.0).is_ok());
    }

    #[test]
    fn crop_validate_rejects_out_of_bounds() {
        let crop = CropRect {
            x: 300.0,
            y: 0.0,
            width: 800.0,
            height: 450.0,
        };
        assert!(matches!(
            crop.validate(1000, 450, 16.0 / 9.0),
            Err(CropError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn crop_validate_rejects_negative_origin() {
        let crop = CropRect {
            x: -1.0,
            y: 0.0,
            width: 800.0,
            height: 450.0,
        };
        assert!(matches!(
            crop.validate(1000, 450, 16.0 / 9.0),
            Err(CropError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn crop_validate_rejects_wrong_ratio() {
        let crop = CropRect::full(1000, 1000);
        assert!(matches!(
            crop.validate(1000, 1000, 16.0 / 9.0),
            Err(CropError::RatioMismatch { .. })
        ));
    }

    #[test]
    fn crop_validate_rejects_empty_and_nan() {
        let empty = CropRect {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 10.0,
        };
        assert!(matches!(
            empty.validate(100, 100, 1.0),
            Err(CropError::Empty { .. })
        ));
        let nan = CropRect {
            width: f64::NAN,
            ..empty
        };
        assert!(matches!(
            nan.validate(100, 100, 1.0),
            Err(CropError::Empty { .. })
        ));
    }

    #[test]
    fn pixel_region_clamps_to_source() {
        let crop = CropRect {
            x: 99.6,
            y: 0.2,
            width: 900.7,
            height: 450.0,
        };
        assert_eq!(crop.to_pixel_region(1000, 450), (100, 0, 900, 450));
    }
}
