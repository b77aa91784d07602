//! Image conditioning — pure Rust.
//!
//! | Stage | Crate / function |
//! |---|---|
//! | **Ratio check + crop geometry** | [`calculations`] (pure) |
//! | **Manual crop** | [`CropController`] over normalized pointer events |
//! | **Rasterize** | `crop_imm` + Lanczos3 `resize_exact` |
//! | **Size fit** | [`fit_to_size`]: JPEG quality search, PNG/WebP single pass |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for ratio and dimension math (unit testable)
//! - **Parameters**: Data structures describing a run and its crop
//! - **Crop controller**: Interactive overlay state machine
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod crop_controller;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend, RasterBuffer, SourceImage};
pub use calculations::{
    RATIO_TOLERANCE, align_limits, compute_centered_crop, compute_output_size, initial_overlay,
    output_extent, ratio_deviation, ratio_matches,
};
pub use crop_controller::{
    CropController, DisplayBox, DragMode, GestureFinish, GestureScript, Handle, OverlayRect, Point,
    PointerEvent, PointerInput, PointerPhase, PointerTarget,
};
pub use operations::{
    EncodeAttempt, EncodedArtifact, FitReport, MAX_ENCODE_ATTEMPTS, fit_to_size, plan_crop,
    plan_output, render,
};
pub use params::{
    ConditionParams, CropError, CropProvenance, CropRect, Orientation, OutputFormat, OutputSpec,
    Quality, Ratio, RatioParseError,
};
pub use rust_backend::RustBackend;
