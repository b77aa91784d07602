//! # aspectfit
//!
//! Conditions a single image to a target aspect ratio, pixel caps and byte
//! budget. Typical use: preparing photos for a listing site that wants 16:9
//! JPEGs under 1 MB.
//!
//! # Architecture: One Run, Four Steps
//!
//! ```text
//! 1. Check    source ratio vs target (±5%)      → match, or ask for a decision
//! 2. Crop     centered auto-crop, or a manual crop from the overlay controller
//! 3. Scale    fit the crop inside max_width x max_height, never upscaled
//! 4. Encode   step JPEG quality down from 90 until the bytes fit the budget
//! ```
//!
//! The geometry is pure and unit tested on its own. Pixel work sits behind the
//! [`imaging::ImageBackend`] trait, so the [`pipeline::Session`] state machine
//! is tested against a mock that never touches pixels.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Geometry, crop controller, backend trait, `image`-crate backend, size search |
//! | [`pipeline`] | Run state machine: select, decode, decide, render, with stale-result guarding |
//! | [`config`] | `aspectfit.toml` loading, validation and merging with CLI flags |
//! | [`output`] | CLI output formatting for progress events and run summaries |
//!
//! # Design Decisions
//!
//! ## Mismatch Is a Question, Not an Error
//!
//! A source whose ratio is off target does not fail the run. The session
//! stops in `AwaitingDecision` and returns the image handle with both ratios;
//! the caller picks auto-crop, ignore, or a manual crop. A bad manual crop is
//! rejected without losing the loaded image.
//!
//! ## Best-Effort Byte Budget
//!
//! The size search is bounded: at most nine JPEG encodes, from quality 90 down
//! to 10. If the budget still isn't met the last attempt is returned and the
//! summary says so. PNG and WebP have no quality axis and are encoded once.
//!
//! ## Generations Instead of Cancellation
//!
//! Decoding and rendering are handed out as self-contained jobs stamped with
//! the run generation. Selecting a new file bumps the generation; results
//! from older jobs are discarded when they come back.

pub mod config;
pub mod imaging;
pub mod output;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod test_helpers;
