//! Pure calculation functions for crop and output geometry.
//!
//! All functions here are pure and testable without any I/O or images.

use super::crop_controller::OverlayRect;
use super::params::{ConditionParams, CropRect, OutputSpec};

/// Maximum relative deviation between source and target ratio that still
/// counts as a match. Anything at or beyond this needs a caller decision.
pub const RATIO_TOLERANCE: f64 = 0.05;

/// Share of the limiting displayed dimension the initial overlay covers.
const INITIAL_OVERLAY_SCALE: f64 = 0.8;

/// Relative deviation `|current - target| / target` of a source image.
pub fn ratio_deviation(source_width: u32, source_height: u32, target_ratio: f64) -> f64 {
    let current = source_width as f64 / source_height as f64;
    (current - target_ratio).abs() / target_ratio
}

/// Whether a source image is close enough to the target ratio to auto-crop.
///
/// # Examples
/// ```
/// # use aspectfit::imaging::{ConditionParams, ratio_matches};
/// let params = ConditionParams::default(); // 16:9 landscape
/// assert!(ratio_matches(1920, 1080, &params));
/// assert!(!ratio_matches(1000, 500, &params));
/// ```
pub fn ratio_matches(source_width: u32, source_height: u32, params: &ConditionParams) -> bool {
    ratio_deviation(source_width, source_height, params.target_ratio()) < RATIO_TOLERANCE
}

/// Largest rectangle of `target_ratio` centered inside the source.
///
/// A source that is too wide keeps its full height and is trimmed left and
/// right; one that is too tall keeps its full width and is trimmed top and
/// bottom. An exact match returns the full image.
pub fn compute_centered_crop(source_width: f64, source_height: f64, target_ratio: f64) -> CropRect {
    let current = source_width / source_height;

    if current > target_ratio {
        let width = source_height * target_ratio;
        CropRect {
            x: (source_width - width) / 2.0,
            y: 0.0,
            width,
            height: source_height,
        }
    } else if current < target_ratio {
        let height = source_width / target_ratio;
        CropRect {
            x: 0.0,
            y: (source_height - height) / 2.0,
            width: source_width,
            height,
        }
    } else {
        CropRect {
            x: 0.0,
            y: 0.0,
            width: source_width,
            height: source_height,
        }
    }
}

/// Unrounded output extent for a crop under the dimension caps.
///
/// Caps are applied first, then the dimension that breaks the ratio is
/// re-derived from the other. Reconciling before capping could let the
/// re-derived dimension exceed its cap.
pub fn output_extent(crop: &CropRect, max_width: u32, max_height: u32, target_ratio: f64) -> (f64, f64) {
    let mut out_w = (max_width as f64).min(crop.width);
    let mut out_h = (max_height as f64).min(crop.height);

    if out_w / out_h > target_ratio {
        out_w = out_h * target_ratio;
    } else {
        out_h = out_w / target_ratio;
    }

    (out_w, out_h)
}

/// Output raster size for a crop, rounded to whole pixels (at least 1).
///
/// # Examples
/// ```
/// # use aspectfit::imaging::{CropRect, compute_output_size};
/// let crop = CropRect { x: 0.0, y: 0.0, width: 800.0, height: 450.0 };
/// let out = compute_output_size(&crop, 400, 400, 16.0 / 9.0);
/// assert_eq!((out.width, out.height), (400, 225));
/// ```
pub fn compute_output_size(
    crop: &CropRect,
    max_width: u32,
    max_height: u32,
    target_ratio: f64,
) -> OutputSpec {
    let (out_w, out_h) = output_extent(crop, max_width, max_height, target_ratio);
    OutputSpec {
        width: (out_w.round() as u32).max(1),
        height: (out_h.round() as u32).max(1),
    }
}

/// Starting overlay for a manual crop: centered, at the target ratio,
/// covering 80% of whichever displayed dimension limits it.
pub fn initial_overlay(display_width: f64, display_height: f64, target_ratio: f64) -> OverlayRect {
    let (width, height) = if display_width / display_height > target_ratio {
        let height = display_height * INITIAL_OVERLAY_SCALE;
        (height * target_ratio, height)
    } else {
        let width = display_width * INITIAL_OVERLAY_SCALE;
        (width, width / target_ratio)
    };

    OverlayRect {
        left: (display_width - width) / 2.0,
        top: (display_height - height) / 2.0,
        width,
        height,
    }
}

/// Re-align dimension caps with a newly chosen ratio.
///
/// Caps already within 0.01 of the ratio are returned unchanged. Otherwise the
/// height follows the width when that lands in a sane range (100–4000 px), and
/// the width follows the height when it does not.
pub fn align_limits(target_ratio: f64, max_width: u32, max_height: u32) -> (u32, u32) {
    let current = max_width as f64 / max_height as f64;
    if (current - target_ratio).abs() <= 0.01 {
        return (max_width, max_height);
    }

    let derived_height = max_width as f64 / target_ratio;
    if (100.0..=4000.0).contains(&derived_height) {
        (max_width, derived_height.round() as u32)
    } else {
        let derived_width = (max_height as f64 * target_ratio).round() as u32;
        (derived_width.max(1), max_height)
    }
}
