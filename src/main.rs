use aspectfit::config::{self, ConditionConfig, ConditionOverrides};
use aspectfit::imaging::{
    EncodedArtifact, GestureFinish, GestureScript, ImageBackend, Orientation, OutputFormat, Ratio,
    RustBackend,
};
use aspectfit::output;
use aspectfit::pipeline::{
    ConditionSummary, InputFile, MismatchDecision, RatioMismatch, RunOutcome, Session,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Target shape and limits, layered over the config file.
#[derive(clap::Args, Clone)]
struct TargetArgs {
    /// Target aspect ratio as W:H
    #[arg(long)]
    ratio: Option<Ratio>,
    /// Portrait swaps the ratio terms
    #[arg(long, value_enum)]
    orientation: Option<Orientation>,
    /// Output width cap in pixels
    #[arg(long)]
    max_width: Option<u32>,
    /// Output height cap in pixels
    #[arg(long)]
    max_height: Option<u32>,
    /// Encoded size budget in KB
    #[arg(long)]
    max_size_kb: Option<f64>,
    /// Output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
    /// Recompute one dimension cap so the caps match the target ratio
    #[arg(long)]
    align_limits: bool,
}

impl TargetArgs {
    fn overrides(&self) -> ConditionOverrides {
        ConditionOverrides {
            ratio: self.ratio,
            orientation: self.orientation,
            max_width: self.max_width,
            max_height: self.max_height,
            max_size_kb: self.max_size_kb,
            format: self.format,
        }
    }
}

/// What to do when the image ratio is off target.
#[derive(Clone, Copy, Default, ValueEnum)]
enum OnMismatch {
    /// Stop without writing output
    #[default]
    Reject,
    /// Crop the center at the target ratio
    Auto,
    /// Skip the check and crop the center
    Ignore,
    /// Replay a recorded crop gesture (--gestures)
    Manual,
}

#[derive(Parser)]
#[command(name = "aspectfit")]
#[command(about = "Condition an image to a target aspect ratio, size and byte budget")]
#[command(long_about = "\
Condition an image to a target aspect ratio, size and byte budget

Each run takes one image through four steps:

  1. Check    compare the image ratio to the target (5% tolerance)
  2. Crop     centered auto-crop, or a manual crop replayed from gestures
  3. Scale    fit inside --max-width x --max-height, never upscaled
  4. Encode   JPEG steps quality down from 90 until under --max-size-kb

Settings come from ./aspectfit.toml (or --config), overridden by flags.

Run 'aspectfit gen-config' to generate a documented aspectfit.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./aspectfit.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log every pipeline stage to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crop, scale and encode an image
    Condition {
        /// Image to condition
        input: PathBuf,
        /// Output file (default: converted_<name>.<format> next to the input)
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[command(flatten)]
        target: TargetArgs,
        /// What to do when the image ratio is off target
        #[arg(long, value_enum, default_value_t)]
        on_mismatch: OnMismatch,
        /// Gesture script (JSON) for --on-mismatch manual
        #[arg(long)]
        gestures: Option<PathBuf>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report whether an image matches the target ratio
    Check {
        /// Image to check
        input: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Print a stock aspectfit.toml with all options documented
    GenConfig,
}

/// How a `condition` run ended.
enum Conclusion {
    Ready(ConditionSummary, EncodedArtifact),
    Rejected(RatioMismatch),
    Cancelled,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Condition {
            input,
            output: output_path,
            target,
            on_mismatch,
            gestures,
            json,
        } => {
            let config = resolve_config(cli.config.as_deref(), &target)?;
            if !json {
                output::print_banner(&config);
            }
            let file = read_input(&input)?;

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    if json {
                        continue;
                    }
                    for line in output::format_pipeline_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let session = Session::new(config.params()).with_events(tx);
            let conclusion = run_condition(session, file, on_mismatch, gestures.as_deref());
            printer
                .join()
                .map_err(|_| "progress printer thread panicked")?;

            match conclusion? {
                Conclusion::Ready(summary, artifact) => {
                    let path =
                        output_path.unwrap_or_else(|| input.with_file_name(&summary.download_name));
                    std::fs::write(&path, &artifact.bytes)?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&summary)?);
                    } else {
                        output::print_summary(&summary);
                        println!("==> Wrote {}", path.display());
                    }
                }
                Conclusion::Rejected(mismatch) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&mismatch.report())?);
                    } else {
                        output::print_mismatch(&mismatch, &config.params());
                    }
                    return Err("image ratio does not match target; see --on-mismatch".into());
                }
                Conclusion::Cancelled if json => {
                    eprintln!("manual crop cancelled, nothing written");
                }
                Conclusion::Cancelled => {
                    println!("==> Manual crop cancelled, nothing written");
                }
            }
        }
        Command::Check { input, target } => {
            let config = resolve_config(cli.config.as_deref(), &target)?;
            let file = read_input(&input)?;
            let source = RustBackend::new().decode(&file.bytes)?;
            output::print_ratio_check(&file.name, source.width, source.height, &config.params());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Drive one session to a conclusion.
///
/// Takes the session by value so its event sender is dropped on return,
/// which lets the progress printer finish.
fn run_condition(
    mut session: Session,
    file: InputFile,
    on_mismatch: OnMismatch,
    gestures: Option<&Path>,
) -> Result<Conclusion, Box<dyn Error>> {
    let backend = RustBackend::new();

    let summary = match session.open_file(&backend, file)? {
        RunOutcome::Ready(summary) => summary,
        RunOutcome::NeedsDecision(mismatch) => match on_mismatch {
            OnMismatch::Reject => return Ok(Conclusion::Rejected(mismatch)),
            OnMismatch::Auto => session.resolve(&backend, MismatchDecision::AutoCrop)?,
            OnMismatch::Ignore => session.resolve(&backend, MismatchDecision::IgnoreCheck)?,
            OnMismatch::Manual => {
                let path = gestures.ok_or("--on-mismatch manual needs --gestures FILE")?;
                let script: GestureScript =
                    serde_json::from_str(&std::fs::read_to_string(path)?)?;
                let mut controller = session.begin_manual_crop(script.display)?;
                match script.replay(&mut controller) {
                    GestureFinish::Execute => {
                        session.finish_manual_crop(&controller)?;
                        session.render_current(&backend)?
                    }
                    GestureFinish::Cancel => {
                        session.cancel_manual_crop();
                        return Ok(Conclusion::Cancelled);
                    }
                }
            }
        },
    };

    let artifact = session
        .artifact()
        .cloned()
        .ok_or("run finished without an artifact")?;
    Ok(Conclusion::Ready(summary, artifact))
}

/// Stock defaults, then the config file, then command-line flags.
fn resolve_config(path: Option<&Path>, args: &TargetArgs) -> Result<ConditionConfig, Box<dyn Error>> {
    let path = match path {
        Some(p) if !p.exists() => {
            return Err(format!("config file not found: {}", p.display()).into());
        }
        Some(p) => p,
        None => Path::new(config::DEFAULT_CONFIG_FILE),
    };
    let mut config = config::load_config(path, &args.overrides())?;

    if args.align_limits && config.align_limits() {
        info!(
            max_width = config.limits.max_width,
            max_height = config.limits.max_height,
            "aligned dimension caps to target ratio"
        );
    }
    Ok(config)
}

fn read_input(path: &Path) -> Result<InputFile, Box<dyn Error>> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(InputFile::new(name, bytes))
}

/// `--verbose` logs everything from this crate; otherwise `RUST_LOG`, falling
/// back to warnings only. Logs go to stderr so `--json` output stays clean.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("aspectfit=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
