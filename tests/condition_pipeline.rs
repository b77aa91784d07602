//! End-to-end runs through the public API with the real `image`-crate backend.
//!
//! Images are generated in memory, so the expected geometry is exact and no
//! fixtures are needed.

use aspectfit::config::{self, ConditionOverrides};
use aspectfit::imaging::{
    ConditionParams, CropProvenance, DisplayBox, ImageBackend, Orientation, OutputFormat, Ratio,
    RustBackend,
};
use aspectfit::pipeline::{
    Delivery, InputFile, LoadOutcome, MismatchDecision, PipelineError, RunOutcome, RunState,
    Session,
};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageEncoder, Rgb, RgbImage};
use std::fs;
use tempfile::TempDir;

/// Deterministic noisy image; JPEG size drops steadily with quality.
fn noisy_rgb(width: u32, height: u32) -> RgbImage {
    let mut state: u32 = 0x2545_F491;
    RgbImage::from_fn(width, height, |x, y| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let n = (state & 0x3F) as u8;
        Rgb([
            ((x * 255 / width.max(1)) as u8).wrapping_add(n),
            ((y * 255 / height.max(1)) as u8).wrapping_add(n / 2),
            128u8.wrapping_add(n),
        ])
    })
}

fn jpeg_file(name: &str, width: u32, height: u32) -> InputFile {
    let img = noisy_rgb(width, height);
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 95)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    InputFile::new(name, bytes)
}

fn decoded_size(bytes: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(bytes).unwrap();
    (img.width(), img.height())
}

fn params(max_width: u32, max_height: u32, max_size_kb: f64) -> ConditionParams {
    ConditionParams {
        max_width,
        max_height,
        max_size_kb,
        ..ConditionParams::default()
    }
}

// =============================================================================
// Straight-through runs
// =============================================================================

#[test]
fn matching_image_is_scaled_and_encoded() {
    let backend = RustBackend::new();
    let mut session = Session::new(params(160, 90, 1000.0));

    let outcome = session
        .open_file(&backend, jpeg_file("wide.jpg", 320, 180))
        .unwrap();
    let RunOutcome::Ready(summary) = outcome else {
        panic!("16:9 source should not need a decision");
    };

    assert_eq!((summary.output_width, summary.output_height), (160, 90));
    assert_eq!(summary.crop_provenance, CropProvenance::Computed);
    assert_eq!(summary.download_name, "converted_wide.jpeg");
    assert_eq!(summary.mime_type, "image/jpeg");
    assert!(summary.within_budget);

    let artifact = session.artifact().unwrap();
    assert_eq!(&artifact.bytes[..2], &[0xFF, 0xD8]);
    assert_eq!(decoded_size(&artifact.bytes), (160, 90));
}

#[test]
fn small_source_is_not_upscaled() {
    let backend = RustBackend::new();
    let mut session = Session::new(ConditionParams::default());

    let RunOutcome::Ready(summary) = session
        .open_file(&backend, jpeg_file("small.jpg", 64, 36))
        .unwrap()
    else {
        panic!("expected ready");
    };
    assert_eq!((summary.output_width, summary.output_height), (64, 36));
}

// =============================================================================
// Mismatch decisions
// =============================================================================

#[test]
fn square_source_auto_crops_to_target() {
    let backend = RustBackend::new();
    let mut session = Session::new(params(160, 90, 1000.0));

    let outcome = session
        .open_file(&backend, jpeg_file("square.jpg", 400, 400))
        .unwrap();
    let RunOutcome::NeedsDecision(mismatch) = outcome else {
        panic!("square source should need a decision");
    };
    assert!((mismatch.current_ratio - 1.0).abs() < 1e-12);
    assert_eq!(session.state(), RunState::AwaitingDecision);

    let summary = session.resolve(&backend, MismatchDecision::AutoCrop).unwrap();
    assert!((summary.crop.height - 225.0).abs() < 1e-9);
    assert!((summary.crop.y - 87.5).abs() < 1e-9);
    assert_eq!(
        decoded_size(&session.artifact().unwrap().bytes),
        (160, 90)
    );
}

#[test]
fn portrait_png_with_ignored_check() {
    let backend = RustBackend::new();
    let mut session = Session::new(ConditionParams {
        orientation: Orientation::Portrait,
        format: OutputFormat::Png,
        ..ConditionParams::default()
    });

    let outcome = session
        .open_file(&backend, jpeg_file("tall.jpg", 300, 600))
        .unwrap();
    assert!(matches!(outcome, RunOutcome::NeedsDecision(_)));

    let summary = session
        .resolve(&backend, MismatchDecision::IgnoreCheck)
        .unwrap();
    assert_eq!(summary.quality, None);
    assert_eq!(summary.attempts, 1);
    assert_eq!(summary.download_name, "converted_tall.png");

    let bytes = &session.artifact().unwrap().bytes;
    assert_eq!(&bytes[1..4], b"PNG");
    let (w, h) = decoded_size(bytes);
    assert_eq!(w, 300);
    assert!((532..=534).contains(&h), "height {h}");
}

#[test]
fn manual_crop_from_controller_is_rendered() {
    let backend = RustBackend::new();
    let mut session = Session::new(ConditionParams::default());
    session
        .open_file(&backend, jpeg_file("pano.jpg", 800, 400))
        .unwrap();

    let display = DisplayBox {
        left: 0.0,
        top: 0.0,
        width: 400.0,
        height: 200.0,
    };
    let controller = session.begin_manual_crop(display).unwrap();
    session.finish_manual_crop(&controller).unwrap();
    let summary = session.render_current(&backend).unwrap();

    // Initial overlay: 160px tall on a 200px display, doubled to source pixels
    assert_eq!(summary.crop_provenance, CropProvenance::UserSpecified);
    assert!((summary.crop.height - 320.0).abs() < 1e-9);
    assert_eq!(
        decoded_size(&session.artifact().unwrap().bytes),
        (569, 320)
    );
}

// =============================================================================
// Size budget
// =============================================================================

#[test]
fn tight_budget_steps_quality_down() {
    let backend = RustBackend::new();
    let file = jpeg_file("noisy.jpg", 480, 270);

    let mut generous = Session::new(params(480, 270, 100_000.0));
    let RunOutcome::Ready(first) = generous.open_file(&backend, file.clone()).unwrap() else {
        panic!("expected ready");
    };
    assert_eq!(first.quality, Some(90));
    let q90_size = generous.artifact().unwrap().size();

    let budget_kb = (q90_size - 1) as f64 / 1024.0;
    let mut tight = Session::new(params(480, 270, budget_kb));
    let RunOutcome::Ready(second) = tight.open_file(&backend, file).unwrap() else {
        panic!("expected ready");
    };
    assert!(second.attempts >= 2);
    assert!(second.quality.unwrap() < 90);
    if second.within_budget {
        assert!(tight.artifact().unwrap().size() < q90_size);
    }
}

#[test]
fn impossible_budget_returns_best_effort() {
    let backend = RustBackend::new();
    let mut session = Session::new(params(480, 270, 0.5));

    let RunOutcome::Ready(summary) = session
        .open_file(&backend, jpeg_file("noisy.jpg", 480, 270))
        .unwrap()
    else {
        panic!("expected ready");
    };
    assert!(!summary.within_budget);
    assert_eq!(summary.attempts, 9);
    assert_eq!(summary.quality, Some(10));
    assert_eq!(decoded_size(&session.artifact().unwrap().bytes), (480, 270));
}

// =============================================================================
// Failures and staleness
// =============================================================================

#[test]
fn garbage_input_is_a_decode_failure() {
    let backend = RustBackend::new();
    let mut session = Session::new(ConditionParams::default());
    let err = session
        .open_file(&backend, InputFile::new("notes.txt", b"hello".to_vec()))
        .unwrap_err();
    assert!(matches!(err, PipelineError::DecodeFailure(_)));
    assert_eq!(session.state(), RunState::Failed);
}

#[test]
fn late_decode_from_previous_file_is_discarded() {
    let backend = RustBackend::new();
    let mut session = Session::new(ConditionParams::default());

    let old = session.select_file(jpeg_file("old.jpg", 100, 100));
    let new = session.select_file(jpeg_file("new.jpg", 160, 90));

    let (old_done, new_done) = std::thread::scope(|s| {
        let a = s.spawn(|| old.run(&backend));
        let b = s.spawn(|| new.run(&backend));
        (a.join().unwrap(), b.join().unwrap())
    });

    assert!(matches!(
        session.finish_decode(old_done).unwrap(),
        Delivery::Discarded { .. }
    ));
    assert!(matches!(
        session.finish_decode(new_done).unwrap(),
        Delivery::Delivered(LoadOutcome::ReadyToRender)
    ));
    assert_eq!(session.source().unwrap().width, 160);
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn config_file_and_overrides_drive_a_run() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("aspectfit.toml");
    fs::write(
        &path,
        r#"
[target]
ratio = "1:1"

[limits]
max_width = 100
max_height = 100
"#,
    )
    .unwrap();

    let overrides = ConditionOverrides {
        format: Some(OutputFormat::Webp),
        ..Default::default()
    };
    let file_value = config::load_raw_config(&path).unwrap();
    let cfg = config::resolve_config(
        config::stock_defaults_value(),
        file_value.into_iter().chain(Some(overrides.to_toml())),
    )
    .unwrap();
    assert_eq!(cfg.target.ratio, Ratio::new(1, 1).unwrap());

    let backend = RustBackend::new();
    let mut session = Session::new(cfg.params());
    let RunOutcome::Ready(summary) = session
        .open_file(&backend, jpeg_file("square.jpg", 300, 300))
        .unwrap()
    else {
        panic!("1:1 source should match 1:1 target");
    };
    assert_eq!(summary.format, OutputFormat::Webp);
    assert_eq!(summary.mime_type, "image/webp");

    let bytes = &session.artifact().unwrap().bytes;
    assert_eq!(&bytes[..4], b"RIFF");
    let decoded = backend.decode(bytes).unwrap();
    assert_eq!((decoded.width, decoded.height), (100, 100));
}
