//! CLI output formatting for conditioning runs.
//!
//! # Output Format
//!
//! ## Progress
//!
//! ```text
//! Conditioning to 16:9 landscape, max 1920x1080, 1000 KB budget, jpeg
//!     Listing photos
//! holiday.jpg (3012 KB)
//!     Decoded: 4000x3000
//!     Ratio: 1.333 vs target 1.778, mismatch
//!     Crop: 4000x2250 at (0, 375), computed
//!     Rasterized: 1920x1080
//!     Encode q90: 1460 KB
//!     Encode q80: 940 KB
//!     Encoded: 940 KB, within budget
//! ```
//!
//! ## Summary
//!
//! ```text
//! converted_holiday.jpeg
//!     Output: 1920x1080 jpeg, quality 80
//!     Size: 3012 KB -> 940 KB (69% smaller)
//!     Budget: 1000 KB, met after 2 attempts
//!     Target: 16:9 landscape, max 1920x1080
//!     Crop: 4000x2250 at (0, 375), computed
//! ```
//!
//! # Architecture
//!
//! Each display has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::config::ConditionConfig;
use crate::imaging::{ConditionParams, CropProvenance, CropRect, ratio_matches};
use crate::pipeline::{ConditionSummary, PipelineEvent, RatioMismatch};

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Bytes as whole kilobytes (1 KB = 1024 bytes), rounded.
fn format_kb(bytes: usize) -> String {
    format!("{} KB", (bytes as f64 / 1024.0).round() as u64)
}

/// Budget in KB, without a trailing `.0` for whole numbers.
fn format_budget(kb: f64) -> String {
    if kb.fract() == 0.0 {
        format!("{kb:.0} KB")
    } else {
        format!("{kb} KB")
    }
}

fn format_crop(crop: &CropRect, provenance: CropProvenance) -> String {
    let origin = match provenance {
        CropProvenance::Computed => "computed",
        CropProvenance::UserSpecified => "manual",
    };
    format!(
        "Crop: {:.0}x{:.0} at ({:.0}, {:.0}), {}",
        crop.width, crop.height, crop.x, crop.y, origin
    )
}

fn format_target(params: &ConditionParams) -> String {
    format!(
        "{} {}, max {}x{}",
        params.ratio, params.orientation, params.max_width, params.max_height
    )
}

// ============================================================================
// Banner
// ============================================================================

/// Format the line shown before a run starts, plus the description if set.
pub fn format_banner(config: &ConditionConfig) -> Vec<String> {
    let params = config.params();
    let mut lines = vec![format!(
        "Conditioning to {}, {} budget, {}",
        format_target(&params),
        format_budget(params.max_size_kb),
        params.format
    )];
    let description = config.output.description.trim();
    if !description.is_empty() {
        lines.push(format!("{}{}", indent(1), description));
    }
    lines
}

pub fn print_banner(config: &ConditionConfig) {
    for line in format_banner(config) {
        println!("{}", line);
    }
}

// ============================================================================
// Progress events
// ============================================================================

/// Format a single pipeline progress event as display lines.
pub fn format_pipeline_event(event: &PipelineEvent) -> Vec<String> {
    let detail = |text: String| vec![format!("{}{}", indent(1), text)];
    match event {
        PipelineEvent::FileSelected { name, size, .. } => {
            vec![format!("{} ({})", name, format_kb(*size))]
        }
        PipelineEvent::Loaded { width, height, .. } => {
            detail(format!("Decoded: {}x{}", width, height))
        }
        PipelineEvent::RatioChecked {
            current,
            target,
            matches,
            ..
        } => detail(format!(
            "Ratio: {:.3} vs target {:.3}, {}",
            current,
            target,
            if *matches { "ok" } else { "mismatch" }
        )),
        PipelineEvent::AwaitingDecision { .. } => detail("Waiting for a crop decision".into()),
        PipelineEvent::Cropped {
            crop, provenance, ..
        } => detail(format_crop(crop, *provenance)),
        PipelineEvent::ManualCropCancelled { .. } => detail("Manual crop cancelled".into()),
        PipelineEvent::Rasterized { width, height, .. } => {
            detail(format!("Rasterized: {}x{}", width, height))
        }
        PipelineEvent::EncodeAttempt { attempt, .. } => match attempt.quality {
            Some(q) => detail(format!("Encode q{}: {}", q.value(), format_kb(attempt.size))),
            None => detail(format!("Encode: {}", format_kb(attempt.size))),
        },
        PipelineEvent::Encoded {
            size, within_budget, ..
        } => detail(format!(
            "Encoded: {}, {}",
            format_kb(*size),
            if *within_budget {
                "within budget"
            } else {
                "over budget"
            }
        )),
        PipelineEvent::Ready { .. } => Vec::new(),
        PipelineEvent::Failed { reason, .. } => detail(format!("Failed: {}", reason)),
        PipelineEvent::Discarded {
            generation,
            current,
        } => detail(format!(
            "Discarded result from run {} (current run {})",
            generation, current
        )),
        PipelineEvent::Reset { .. } => vec!["Reset".to_string()],
    }
}

// ============================================================================
// Ratio check and mismatch prompt
// ============================================================================

/// Format the `check` command's report for one image.
pub fn format_ratio_check(
    name: &str,
    width: u32,
    height: u32,
    params: &ConditionParams,
) -> Vec<String> {
    let matches = ratio_matches(width, height, params);
    vec![
        format!("{} ({}x{})", name, width, height),
        format!(
            "{}Ratio: {:.3} vs target {:.3} ({} {})",
            indent(1),
            width as f64 / height as f64,
            params.target_ratio(),
            params.ratio,
            params.orientation
        ),
        format!(
            "{}{}",
            indent(1),
            if matches {
                "Matches: no crop decision needed"
            } else {
                "Mismatch: needs --on-mismatch auto, ignore or manual"
            }
        ),
    ]
}

pub fn print_ratio_check(name: &str, width: u32, height: u32, params: &ConditionParams) {
    for line in format_ratio_check(name, width, height, params) {
        println!("{}", line);
    }
}

/// Format the prompt shown when a run stops at a ratio mismatch.
pub fn format_mismatch(mismatch: &RatioMismatch, params: &ConditionParams) -> Vec<String> {
    vec![
        format!(
            "Image ratio {:.3} ({}x{}) does not match target {} {} ({:.3})",
            mismatch.current_ratio,
            mismatch.source.width,
            mismatch.source.height,
            params.ratio,
            params.orientation,
            mismatch.target_ratio
        ),
        format!("{}--on-mismatch auto     crop the center", indent(1)),
        format!("{}--on-mismatch ignore   crop the center anyway", indent(1)),
        format!(
            "{}--on-mismatch manual   crop with --gestures FILE",
            indent(1)
        ),
    ]
}

pub fn print_mismatch(mismatch: &RatioMismatch, params: &ConditionParams) {
    for line in format_mismatch(mismatch, params) {
        println!("{}", line);
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Format the metadata summary of a finished run.
pub fn format_summary(summary: &ConditionSummary) -> Vec<String> {
    let mut lines = vec![summary.download_name.clone()];

    let quality = summary
        .quality
        .map(|q| format!(", quality {}", q))
        .unwrap_or_default();
    lines.push(format!(
        "{}Output: {}x{} {}{}",
        indent(1),
        summary.output_width,
        summary.output_height,
        summary.format,
        quality
    ));

    let change = if summary.compression_ratio_percent >= 0 {
        format!("{}% smaller", summary.compression_ratio_percent)
    } else {
        format!("{}% larger", -summary.compression_ratio_percent)
    };
    lines.push(format!(
        "{}Size: {} KB -> {} KB ({})",
        indent(1),
        summary.original_size_kb,
        summary.processed_size_kb,
        change
    ));

    let attempts = if summary.attempts == 1 {
        "1 attempt".to_string()
    } else {
        format!("{} attempts", summary.attempts)
    };
    lines.push(format!(
        "{}Budget: {}, {} after {}",
        indent(1),
        format_budget(summary.max_size_kb),
        if summary.within_budget {
            "met"
        } else {
            "NOT met"
        },
        attempts
    ));

    lines.push(format!(
        "{}Target: {} {}, max {}x{}",
        indent(1),
        summary.ratio,
        summary.orientation,
        summary.max_width,
        summary.max_height
    ));
    lines.push(format!(
        "{}{}",
        indent(1),
        format_crop(&summary.crop, summary.crop_provenance)
    ));
    lines
}

pub fn print_summary(summary: &ConditionSummary) {
    for line in format_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{
        EncodeAttempt, Orientation, OutputFormat, Quality, Ratio, SourceImage,
    };

    fn summary() -> ConditionSummary {
        ConditionSummary {
            file_name: "holiday.jpg".to_string(),
            download_name: "converted_holiday.jpeg".to_string(),
            mime_type: "image/jpeg".to_string(),
            original_size_kb: 3012,
            processed_size_kb: 940,
            compression_ratio_percent: 69,
            ratio: Ratio::default(),
            orientation: Orientation::Landscape,
            format: OutputFormat::Jpeg,
            max_width: 1920,
            max_height: 1080,
            max_size_kb: 1000.0,
            output_width: 1920,
            output_height: 1080,
            crop: CropRect {
                x: 0.0,
                y: 375.0,
                width: 4000.0,
                height: 2250.0,
            },
            crop_provenance: CropProvenance::Computed,
            quality: Some(80),
            attempts: 2,
            within_budget: true,
        }
    }

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_kb_rounds() {
        assert_eq!(format_kb(0), "0 KB");
        assert_eq!(format_kb(1536), "2 KB");
        assert_eq!(format_kb(1535), "1 KB");
    }

    #[test]
    fn format_budget_drops_trailing_zero() {
        assert_eq!(format_budget(1000.0), "1000 KB");
        assert_eq!(format_budget(250.5), "250.5 KB");
    }

    #[test]
    fn indent_levels() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "        ");
    }

    // =========================================================================
    // Banner tests
    // =========================================================================

    #[test]
    fn banner_without_description() {
        let lines = format_banner(&ConditionConfig::default());
        assert_eq!(
            lines,
            vec!["Conditioning to 16:9 landscape, max 1920x1080, 1000 KB budget, jpeg"]
        );
    }

    #[test]
    fn banner_with_description() {
        let mut config = ConditionConfig::default();
        config.output.description = "  Listing photos ".to_string();
        let lines = format_banner(&config);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "    Listing photos");
    }

    // =========================================================================
    // Event tests
    // =========================================================================

    #[test]
    fn format_file_selected() {
        let event = PipelineEvent::FileSelected {
            generation: 1,
            name: "holiday.jpg".to_string(),
            size: 3012 * 1024,
        };
        assert_eq!(format_pipeline_event(&event), vec!["holiday.jpg (3012 KB)"]);
    }

    #[test]
    fn format_ratio_event() {
        let event = PipelineEvent::RatioChecked {
            generation: 1,
            current: 4.0 / 3.0,
            target: 16.0 / 9.0,
            matches: false,
        };
        assert_eq!(
            format_pipeline_event(&event),
            vec!["    Ratio: 1.333 vs target 1.778, mismatch"]
        );
    }

    #[test]
    fn format_encode_attempts() {
        let jpeg = PipelineEvent::EncodeAttempt {
            generation: 1,
            attempt: EncodeAttempt {
                quality: Some(Quality::new(80)),
                size: 940 * 1024,
            },
        };
        assert_eq!(format_pipeline_event(&jpeg), vec!["    Encode q80: 940 KB"]);

        let png = PipelineEvent::EncodeAttempt {
            generation: 1,
            attempt: EncodeAttempt {
                quality: None,
                size: 2048,
            },
        };
        assert_eq!(format_pipeline_event(&png), vec!["    Encode: 2 KB"]);
    }

    #[test]
    fn format_encoded_over_budget() {
        let event = PipelineEvent::Encoded {
            generation: 1,
            size: 2048 * 1024,
            within_budget: false,
        };
        assert_eq!(
            format_pipeline_event(&event),
            vec!["    Encoded: 2048 KB, over budget"]
        );
    }

    #[test]
    fn format_cropped_manual() {
        let event = PipelineEvent::Cropped {
            generation: 1,
            crop: CropRect {
                x: 10.4,
                y: 20.6,
                width: 160.0,
                height: 90.0,
            },
            provenance: CropProvenance::UserSpecified,
        };
        assert_eq!(
            format_pipeline_event(&event),
            vec!["    Crop: 160x90 at (10, 21), manual"]
        );
    }

    #[test]
    fn format_ready_is_silent() {
        assert!(format_pipeline_event(&PipelineEvent::Ready { generation: 1 }).is_empty());
    }

    // =========================================================================
    // Check / mismatch tests
    // =========================================================================

    #[test]
    fn ratio_check_reports_match() {
        let lines = format_ratio_check("a.jpg", 1920, 1080, &ConditionParams::default());
        assert_eq!(lines[0], "a.jpg (1920x1080)");
        assert_eq!(lines[1], "    Ratio: 1.778 vs target 1.778 (16:9 landscape)");
        assert!(lines[2].contains("Matches"));
    }

    #[test]
    fn ratio_check_reports_mismatch() {
        let lines = format_ratio_check("a.jpg", 1000, 1000, &ConditionParams::default());
        assert!(lines[2].starts_with("    Mismatch"));
    }

    #[test]
    fn mismatch_prompt_lists_choices() {
        let mismatch = RatioMismatch {
            source: SourceImage::dimensions_only(1000, 500),
            current_ratio: 2.0,
            target_ratio: 16.0 / 9.0,
            deviation: 0.125,
        };
        let lines = format_mismatch(&mismatch, &ConditionParams::default());
        assert_eq!(
            lines[0],
            "Image ratio 2.000 (1000x500) does not match target 16:9 landscape (1.778)"
        );
        assert_eq!(lines.len(), 4);
        assert!(lines[3].contains("--gestures"));
    }

    // =========================================================================
    // Summary tests
    // =========================================================================

    #[test]
    fn format_summary_lines() {
        let lines = format_summary(&summary());
        assert_eq!(
            lines,
            vec![
                "converted_holiday.jpeg",
                "    Output: 1920x1080 jpeg, quality 80",
                "    Size: 3012 KB -> 940 KB (69% smaller)",
                "    Budget: 1000 KB, met after 2 attempts",
                "    Target: 16:9 landscape, max 1920x1080",
                "    Crop: 4000x2250 at (0, 375), computed",
            ]
        );
    }

    #[test]
    fn format_summary_png_grew_and_missed_budget() {
        let s = ConditionSummary {
            format: OutputFormat::Png,
            quality: None,
            compression_ratio_percent: -40,
            within_budget: false,
            attempts: 1,
            ..summary()
        };
        let lines = format_summary(&s);
        assert_eq!(lines[1], "    Output: 1920x1080 png");
        assert!(lines[2].ends_with("(40% larger)"));
        assert_eq!(lines[3], "    Budget: 1000 KB, NOT met after 1 attempt");
    }
}
