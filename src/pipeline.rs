//! Conditioning session: one file in, one encoded artifact out.
//!
//! A [`Session`] owns the state of the current run (source image, active
//! crop, output size, encoded artifact) and moves through these states:
//!
//! ```text
//! Idle ─select_file─▶ Loading ─finish_decode─┬─ratio ok──▶ Cropped ─finish_render─▶ Ready
//!                        │                    └─mismatch─▶ AwaitingDecision
//!                        └─decode error─▶ Failed            │ decide / apply_manual_crop
//!                                                           ▼
//!                                                        Cropped
//! ```
//!
//! ## Suspension points and stale results
//!
//! Decoding and rendering (rasterize + size search) are handed out as jobs:
//! [`Session::select_file`] returns a [`PendingDecode`] and
//! [`Session::start_render`] a [`PendingRender`]. Jobs own everything they
//! touch, so a caller may run them on another thread, then hand the result
//! back through `finish_decode` / `finish_render`.
//!
//! Every job carries a [`RunTicket`] stamped with the session's generation.
//! Selecting a new file, resetting or re-cropping a finished run bumps the
//! generation. Any result that comes back with an older ticket is dropped as
//! [`Delivery::Discarded`]. There is no way to cancel a job in flight; the
//! generation check is what makes late results harmless.
//!
//! Synchronous callers can use [`Session::open_file`], [`Session::resolve`]
//! and [`Session::render_current`], which run each job and finish it
//! immediately.
//!
//! ## Progress events
//!
//! An optional `mpsc::Sender<PipelineEvent>` receives one event per stage and
//! per encode attempt, for display by [`output`](crate::output).

use crate::imaging::{
    BackendError, ConditionParams, CropController, CropError, CropProvenance, CropRect,
    DisplayBox, EncodeAttempt, EncodedArtifact, FitReport, ImageBackend, Orientation,
    OutputFormat, OutputSpec, Ratio, SourceImage, fit_to_size, plan_crop, plan_output,
    ratio_deviation, ratio_matches,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Image could not be decoded: {0}")]
    DecodeFailure(#[source] BackendError),
    #[error("Invalid crop rectangle: {0}")]
    InvalidCropRect(#[from] CropError),
    #[error("Rendering failed: {0}")]
    RenderFailure(#[source] BackendError),
    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: RunState,
    },
    #[error("Run {0} was superseded by a newer run")]
    Superseded(u64),
}

/// Where a session is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    /// File selected, decode in flight.
    Loading,
    /// Ratio check failed; the caller must pick auto, ignore or manual crop.
    AwaitingDecision,
    /// Crop chosen; render may be in flight.
    Cropped,
    Ready,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Loading => "loading",
            RunState::AwaitingDecision => "awaiting a crop decision",
            RunState::Cropped => "cropped",
            RunState::Ready => "ready",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Generation stamp identifying which run a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTicket {
    generation: u64,
}

impl RunTicket {
    pub fn generation(self) -> u64 {
        self.generation
    }
}

/// Result of handing a job's output back to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery<T> {
    Delivered(T),
    /// The job belonged to an older run; its result was dropped.
    Discarded { ticket: RunTicket, current: u64 },
}

impl<T> Delivery<T> {
    fn into_result(self) -> Result<T, PipelineError> {
        match self {
            Delivery::Delivered(value) => Ok(value),
            Delivery::Discarded { ticket, .. } => Err(PipelineError::Superseded(ticket.generation)),
        }
    }
}

/// A selected file: its name and raw bytes.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// The caller's answer to a ratio mismatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MismatchDecision {
    /// Use the centered crop.
    AutoCrop,
    /// Skip the ratio gate; also uses the centered crop.
    IgnoreCheck,
    /// Use a crop finalized by the interactive controller.
    Manual(CropRect),
}

/// Signal that the source needs a caller decision before rendering.
#[derive(Debug, Clone)]
pub struct RatioMismatch {
    /// Handle to the offending image, for rendering the decision prompt.
    pub source: SourceImage,
    pub current_ratio: f64,
    pub target_ratio: f64,
    pub deviation: f64,
}

impl RatioMismatch {
    /// Pixel-free view of the mismatch, for machine-readable output.
    pub fn report(&self) -> MismatchReport {
        MismatchReport {
            width: self.source.width,
            height: self.source.height,
            current_ratio: self.current_ratio,
            target_ratio: self.target_ratio,
            deviation: self.deviation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MismatchReport {
    pub width: u32,
    pub height: u32,
    pub current_ratio: f64,
    pub target_ratio: f64,
    pub deviation: f64,
}

/// What a successful decode leads to.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// Ratio matched; the centered crop is in place.
    ReadyToRender,
    NeedsDecision(RatioMismatch),
}

/// What a synchronous run leads to.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Ready(ConditionSummary),
    NeedsDecision(RatioMismatch),
}

/// Display-ready metadata about a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionSummary {
    pub file_name: String,
    pub download_name: String,
    pub mime_type: String,
    #[serde(rename = "originalSizeKB")]
    pub original_size_kb: u64,
    #[serde(rename = "processedSizeKB")]
    pub processed_size_kb: u64,
    pub compression_ratio_percent: i64,
    pub ratio: Ratio,
    pub orientation: Orientation,
    pub format: OutputFormat,
    pub max_width: u32,
    pub max_height: u32,
    #[serde(rename = "maxSizeKB")]
    pub max_size_kb: f64,
    pub output_width: u32,
    pub output_height: u32,
    pub crop: CropRect,
    pub crop_provenance: CropProvenance,
    pub quality: Option<u32>,
    pub attempts: usize,
    pub within_budget: bool,
}

/// `converted_<stem>.<format>` for a selected file name.
pub fn download_name(file_name: &str, format: OutputFormat) -> String {
    let stem = file_name.split('.').next().filter(|s| !s.is_empty());
    format!("converted_{}.{}", stem.unwrap_or("image"), format.extension())
}

/// Percentage saved by re-encoding, rounded; negative when the output grew.
pub fn compression_ratio_percent(original: usize, processed: usize) -> i64 {
    if original == 0 {
        return 0;
    }
    ((1.0 - processed as f64 / original as f64) * 100.0).round() as i64
}

fn kilobytes(bytes: usize) -> u64 {
    (bytes as f64 / 1024.0).round() as u64
}

/// Progress notifications, tagged with the run generation.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    FileSelected {
        generation: u64,
        name: String,
        size: usize,
    },
    Loaded {
        generation: u64,
        width: u32,
        height: u32,
    },
    RatioChecked {
        generation: u64,
        current: f64,
        target: f64,
        matches: bool,
    },
    AwaitingDecision {
        generation: u64,
    },
    Cropped {
        generation: u64,
        crop: CropRect,
        provenance: CropProvenance,
    },
    ManualCropCancelled {
        generation: u64,
    },
    Rasterized {
        generation: u64,
        width: u32,
        height: u32,
    },
    EncodeAttempt {
        generation: u64,
        attempt: EncodeAttempt,
    },
    Encoded {
        generation: u64,
        size: usize,
        within_budget: bool,
    },
    Ready {
        generation: u64,
    },
    Failed {
        generation: u64,
        reason: String,
    },
    Discarded {
        generation: u64,
        current: u64,
    },
    Reset {
        generation: u64,
    },
}

fn send(events: &Option<Sender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// Decode job for a selected file.
#[derive(Debug)]
pub struct PendingDecode {
    pub ticket: RunTicket,
    bytes: Arc<[u8]>,
}

/// Output of a [`PendingDecode`].
#[derive(Debug)]
pub struct Decoded {
    pub ticket: RunTicket,
    pub result: Result<SourceImage, BackendError>,
}

impl PendingDecode {
    pub fn run(self, backend: &impl ImageBackend) -> Decoded {
        Decoded {
            ticket: self.ticket,
            result: backend.decode(&self.bytes),
        }
    }
}

/// Rasterize + size-fit job for the active crop.
#[derive(Debug)]
pub struct PendingRender {
    pub ticket: RunTicket,
    source: SourceImage,
    crop: CropRect,
    output: OutputSpec,
    format: OutputFormat,
    max_size_kb: f64,
    events: Option<Sender<PipelineEvent>>,
}

/// Output of a [`PendingRender`].
#[derive(Debug)]
pub struct Rendered {
    pub ticket: RunTicket,
    pub result: Result<FitReport, BackendError>,
}

impl PendingRender {
    pub fn run(self, backend: &impl ImageBackend) -> Rendered {
        let generation = self.ticket.generation;
        let events = self.events;
        let result = backend
            .rasterize(&self.source, &self.crop, self.output)
            .and_then(|raster| {
                send(
                    &events,
                    PipelineEvent::Rasterized {
                        generation,
                        width: raster.width,
                        height: raster.height,
                    },
                );
                fit_to_size(backend, &raster, self.format, self.max_size_kb, |attempt| {
                    send(
                        &events,
                        PipelineEvent::EncodeAttempt {
                            generation,
                            attempt: *attempt,
                        },
                    )
                })
            });
        if let Ok(report) = &result {
            send(
                &events,
                PipelineEvent::Encoded {
                    generation,
                    size: report.artifact.size(),
                    within_budget: report.within_budget,
                },
            );
        }
        Rendered {
            ticket: self.ticket,
            result,
        }
    }
}

/// The live crop/output/artifact triple of a finished run.
#[derive(Debug, Clone)]
struct Finished {
    artifact: EncodedArtifact,
    summary: ConditionSummary,
}

/// State of the current conditioning run.
pub struct Session {
    params: ConditionParams,
    generation: u64,
    state: RunState,
    file: Option<InputFile>,
    source: Option<SourceImage>,
    crop: Option<(CropRect, CropProvenance)>,
    output: Option<OutputSpec>,
    finished: Option<Finished>,
    failure: Option<String>,
    events: Option<Sender<PipelineEvent>>,
}

impl Session {
    pub fn new(params: ConditionParams) -> Self {
        Self {
            params,
            generation: 0,
            state: RunState::Idle,
            file: None,
            source: None,
            crop: None,
            output: None,
            finished: None,
            failure: None,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn params(&self) -> &ConditionParams {
        &self.params
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    pub fn crop(&self) -> Option<(CropRect, CropProvenance)> {
        self.crop
    }

    pub fn output(&self) -> Option<OutputSpec> {
        self.output
    }

    pub fn artifact(&self) -> Option<&EncodedArtifact> {
        self.finished.as_ref().map(|f| &f.artifact)
    }

    pub fn summary(&self) -> Option<&ConditionSummary> {
        self.finished.as_ref().map(|f| &f.summary)
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    fn emit(&self, event: PipelineEvent) {
        send(&self.events, event);
    }

    fn ticket(&self) -> RunTicket {
        RunTicket {
            generation: self.generation,
        }
    }

    fn clear_run(&mut self) {
        self.file = None;
        self.source = None;
        self.crop = None;
        self.output = None;
        self.finished = None;
        self.failure = None;
    }

    fn require(&self, action: &'static str, allowed: &[RunState]) -> Result<(), PipelineError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(PipelineError::InvalidState {
                action,
                state: self.state,
            })
        }
    }

    fn fail(&mut self, reason: String) {
        warn!(generation = self.generation, %reason, "run failed");
        self.emit(PipelineEvent::Failed {
            generation: self.generation,
            reason: reason.clone(),
        });
        self.state = RunState::Failed;
        self.failure = Some(reason);
    }

    /// Whether a ticket is from the current run; logs and reports otherwise.
    fn is_current(&self, ticket: RunTicket) -> bool {
        if ticket.generation == self.generation {
            return true;
        }
        warn!(
            stale = ticket.generation,
            current = self.generation,
            "discarding result from superseded run"
        );
        self.emit(PipelineEvent::Discarded {
            generation: ticket.generation,
            current: self.generation,
        });
        false
    }

    fn discarded<T>(&self, ticket: RunTicket) -> Delivery<T> {
        Delivery::Discarded {
            ticket,
            current: self.generation,
        }
    }

    // =========================================================================
    // Run lifecycle
    // =========================================================================

    /// Start a new run. Anything from the previous run is dropped first.
    pub fn select_file(&mut self, file: InputFile) -> PendingDecode {
        self.clear_run();
        self.generation += 1;
        self.state = RunState::Loading;
        debug!(generation = self.generation, name = %file.name, size = file.bytes.len(), "file selected");
        self.emit(PipelineEvent::FileSelected {
            generation: self.generation,
            name: file.name.clone(),
            size: file.bytes.len(),
        });

        let bytes = Arc::clone(&file.bytes);
        self.file = Some(file);
        PendingDecode {
            ticket: self.ticket(),
            bytes,
        }
    }

    /// Drop the current run and return to `Idle`.
    ///
    /// Jobs still in flight come back as [`Delivery::Discarded`].
    pub fn reset(&mut self) {
        self.clear_run();
        self.generation += 1;
        self.state = RunState::Idle;
        debug!(generation = self.generation, "session reset");
        self.emit(PipelineEvent::Reset {
            generation: self.generation,
        });
    }

    /// Accept a decode result and run the ratio check.
    pub fn finish_decode(
        &mut self,
        decoded: Decoded,
    ) -> Result<Delivery<LoadOutcome>, PipelineError> {
        if !self.is_current(decoded.ticket) {
            return Ok(self.discarded(decoded.ticket));
        }
        self.require("finish decoding", &[RunState::Loading])?;

        let source = match decoded.result {
            Ok(source) => source,
            Err(e) => {
                self.fail(format!("decode failed: {e}"));
                return Err(PipelineError::DecodeFailure(e));
            }
        };
        self.emit(PipelineEvent::Loaded {
            generation: self.generation,
            width: source.width,
            height: source.height,
        });

        let target = self.params.target_ratio();
        let current = source.width as f64 / source.height as f64;
        let matches = ratio_matches(source.width, source.height, &self.params);
        debug!(
            generation = self.generation,
            width = source.width,
            height = source.height,
            current,
            target,
            matches,
            "ratio checked"
        );
        self.emit(PipelineEvent::RatioChecked {
            generation: self.generation,
            current,
            target,
            matches,
        });

        if matches {
            let crop = plan_crop(&source, &self.params);
            self.source = Some(source);
            self.set_crop(crop, CropProvenance::Computed);
            Ok(Delivery::Delivered(LoadOutcome::ReadyToRender))
        } else {
            let mismatch = RatioMismatch {
                source: source.clone(),
                current_ratio: current,
                target_ratio: target,
                deviation: ratio_deviation(source.width, source.height, target),
            };
            self.source = Some(source);
            self.state = RunState::AwaitingDecision;
            self.emit(PipelineEvent::AwaitingDecision {
                generation: self.generation,
            });
            Ok(Delivery::Delivered(LoadOutcome::NeedsDecision(mismatch)))
        }
    }

    fn set_crop(&mut self, crop: CropRect, provenance: CropProvenance) {
        // Re-cropping a finished run starts a new generation so render jobs
        // handed out for the old crop can't land on the new one.
        if self.state == RunState::Ready {
            self.generation += 1;
        }
        self.finished = None;
        self.output = Some(plan_output(&crop, &self.params));
        self.crop = Some((crop, provenance));
        self.state = RunState::Cropped;
        debug!(generation = self.generation, ?crop, ?provenance, "crop set");
        self.emit(PipelineEvent::Cropped {
            generation: self.generation,
            crop,
            provenance,
        });
    }

    fn current_source(&self) -> Result<&SourceImage, PipelineError> {
        self.source.as_ref().ok_or(PipelineError::InvalidState {
            action: "crop",
            state: self.state,
        })
    }

    // =========================================================================
    // Mismatch decisions
    // =========================================================================

    /// Answer a ratio mismatch.
    pub fn decide(&mut self, decision: MismatchDecision) -> Result<(), PipelineError> {
        match decision {
            MismatchDecision::AutoCrop | MismatchDecision::IgnoreCheck => {
                self.require("auto-crop", &[RunState::AwaitingDecision])?;
                let crop = plan_crop(self.current_source()?, &self.params);
                self.set_crop(crop, CropProvenance::Computed);
                Ok(())
            }
            MismatchDecision::Manual(crop) => self.apply_manual_crop(crop),
        }
    }

    /// Open an interactive crop over the current source as displayed in
    /// `display`.
    pub fn begin_manual_crop(&self, display: DisplayBox) -> Result<CropController, PipelineError> {
        self.require(
            "start a manual crop",
            &[RunState::AwaitingDecision, RunState::Ready],
        )?;
        self.current_source()?;
        Ok(CropController::new(display, self.params.target_ratio()))
    }

    /// Finalize an interactive crop from its controller.
    pub fn finish_manual_crop(&mut self, controller: &CropController) -> Result<(), PipelineError> {
        self.require(
            "finish a manual crop",
            &[RunState::AwaitingDecision, RunState::Ready],
        )?;
        let source = self.current_source()?;
        let crop = controller.execute(source.width, source.height)?;
        self.apply_manual_crop(crop)
    }

    /// Install a user-specified crop, replacing any computed one.
    ///
    /// The rectangle is checked against the source bounds and target ratio;
    /// a bad one is rejected and the session keeps its prior state.
    pub fn apply_manual_crop(&mut self, crop: CropRect) -> Result<(), PipelineError> {
        self.require(
            "apply a manual crop",
            &[RunState::AwaitingDecision, RunState::Ready],
        )?;
        let source = self.current_source()?;
        crop.validate(source.width, source.height, self.params.target_ratio())?;
        self.set_crop(crop, CropProvenance::UserSpecified);
        Ok(())
    }

    /// Abandon an interactive crop; the session stays where it was.
    pub fn cancel_manual_crop(&self) {
        debug!(generation = self.generation, "manual crop cancelled");
        self.emit(PipelineEvent::ManualCropCancelled {
            generation: self.generation,
        });
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Hand out the rasterize + size-fit job for the active crop.
    pub fn start_render(&self) -> Result<PendingRender, PipelineError> {
        self.require("render", &[RunState::Cropped])?;
        let source = self.current_source()?.clone();
        let (crop, output) = match (self.crop, self.output) {
            (Some((crop, _)), Some(output)) => (crop, output),
            _ => {
                return Err(PipelineError::InvalidState {
                    action: "render",
                    state: self.state,
                });
            }
        };
        Ok(PendingRender {
            ticket: self.ticket(),
            source,
            crop,
            output,
            format: self.params.format,
            max_size_kb: self.params.max_size_kb,
            events: self.events.clone(),
        })
    }

    /// Accept a render result and publish the artifact.
    pub fn finish_render(
        &mut self,
        rendered: Rendered,
    ) -> Result<Delivery<ConditionSummary>, PipelineError> {
        if !self.is_current(rendered.ticket) {
            return Ok(self.discarded(rendered.ticket));
        }
        self.require("finish rendering", &[RunState::Cropped])?;

        let report = match rendered.result {
            Ok(report) => report,
            Err(e) => {
                self.fail(format!("render failed: {e}"));
                return Err(PipelineError::RenderFailure(e));
            }
        };

        let summary = self.summarize(&report)?;
        if !report.within_budget {
            warn!(
                size_kb = report.artifact.size_kb(),
                budget_kb = self.params.max_size_kb,
                attempts = report.attempts.len(),
                "size budget not met; returning best effort"
            );
        }
        info!(
            generation = self.generation,
            width = summary.output_width,
            height = summary.output_height,
            size = report.artifact.size(),
            "conditioned image ready"
        );

        self.finished = Some(Finished {
            artifact: report.artifact,
            summary: summary.clone(),
        });
        self.state = RunState::Ready;
        self.emit(PipelineEvent::Ready {
            generation: self.generation,
        });
        Ok(Delivery::Delivered(summary))
    }

    fn summarize(&self, report: &FitReport) -> Result<ConditionSummary, PipelineError> {
        let missing = || PipelineError::InvalidState {
            action: "summarize",
            state: self.state,
        };
        let file = self.file.as_ref().ok_or_else(missing)?;
        let (crop, provenance) = self.crop.ok_or_else(missing)?;
        let output = self.output.ok_or_else(missing)?;
        let artifact = &report.artifact;

        Ok(ConditionSummary {
            file_name: file.name.clone(),
            download_name: download_name(&file.name, self.params.format),
            mime_type: artifact.mime_type().to_string(),
            original_size_kb: kilobytes(file.bytes.len()),
            processed_size_kb: kilobytes(artifact.size()),
            compression_ratio_percent: compression_ratio_percent(file.bytes.len(), artifact.size()),
            ratio: self.params.ratio,
            orientation: self.params.orientation,
            format: self.params.format,
            max_width: self.params.max_width,
            max_height: self.params.max_height,
            max_size_kb: self.params.max_size_kb,
            output_width: output.width,
            output_height: output.height,
            crop,
            crop_provenance: provenance,
            quality: artifact.quality.map(|q| q.value()),
            attempts: report.attempts.len(),
            within_budget: report.within_budget,
        })
    }

    // =========================================================================
    // Sequential drivers
    // =========================================================================

    /// Select and decode a file, then render it if the ratio matches.
    pub fn open_file(
        &mut self,
        backend: &impl ImageBackend,
        file: InputFile,
    ) -> Result<RunOutcome, PipelineError> {
        let pending = self.select_file(file);
        let decoded = pending.run(backend);
        match self.finish_decode(decoded)?.into_result()? {
            LoadOutcome::ReadyToRender => self.render_current(backend).map(RunOutcome::Ready),
            LoadOutcome::NeedsDecision(mismatch) => Ok(RunOutcome::NeedsDecision(mismatch)),
        }
    }

    /// Apply a mismatch decision and render.
    pub fn resolve(
        &mut self,
        backend: &impl ImageBackend,
        decision: MismatchDecision,
    ) -> Result<ConditionSummary, PipelineError> {
        self.decide(decision)?;
        self.render_current(backend)
    }

    /// Render the active crop to completion.
    pub fn render_current(
        &mut self,
        backend: &impl ImageBackend,
    ) -> Result<ConditionSummary, PipelineError> {
        let pending = self.start_render()?;
        let rendered = pending.run(backend);
        self.finish_render(rendered)?.into_result()
    }
}
