//! Conditioning configuration.
//!
//! Handles loading, validating, and merging `aspectfit.toml` files. Values are
//! layered: stock defaults, then the config file, then command-line flags.
//! Each layer is a sparse TOML table merged with [`merge_toml`] before the
//! result is deserialized and validated.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [target]
//! ratio = "16:9"            # width:height
//! orientation = "landscape" # or "portrait" (inverts the ratio)
//!
//! [limits]
//! max_width = 1920          # Output width cap in pixels
//! max_height = 1080         # Output height cap in pixels
//! max_size_kb = 1000        # Encoded size budget in KB (1 KB = 1024 bytes)
//!
//! [output]
//! format = "jpeg"           # jpeg | png | webp
//! description = ""          # Shown before processing
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse, so override just the values you want:
//!
//! ```toml
//! [target]
//! ratio = "4:3"
//! orientation = "portrait"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{ConditionParams, Orientation, OutputFormat, Ratio, align_limits};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "aspectfit.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Conditioning configuration loaded from `aspectfit.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConditionConfig {
    /// Aspect ratio and orientation the output must have.
    pub target: TargetConfig,
    /// Output dimension caps and size budget.
    pub limits: LimitsConfig,
    /// Encoding format and banner text.
    pub output: OutputConfig,
}

impl ConditionConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_width == 0 || self.limits.max_height == 0 {
            return Err(ConfigError::Validation(
                "limits.max_width and limits.max_height must be non-zero".into(),
            ));
        }
        if !self.limits.max_size_kb.is_finite() || self.limits.max_size_kb <= 0.0 {
            return Err(ConfigError::Validation(
                "limits.max_size_kb must be a positive number".into(),
            ));
        }
        Ok(())
    }

    /// Immutable parameters for one conditioning run.
    pub fn params(&self) -> ConditionParams {
        ConditionParams {
            ratio: self.target.ratio,
            orientation: self.target.orientation,
            max_width: self.limits.max_width,
            max_height: self.limits.max_height,
            max_size_kb: self.limits.max_size_kb,
            format: self.output.format,
        }
    }

    /// Bring the dimension caps in line with the target ratio.
    ///
    /// Returns `true` when either cap changed.
    pub fn align_limits(&mut self) -> bool {
        let target = self.params().target_ratio();
        let aligned = align_limits(target, self.limits.max_width, self.limits.max_height);
        let changed = aligned != (self.limits.max_width, self.limits.max_height);
        (self.limits.max_width, self.limits.max_height) = aligned;
        changed
    }
}

/// Target shape of the output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    /// Aspect ratio as `"W:H"`, e.g. `"16:9"`.
    pub ratio: Ratio,
    /// Portrait swaps the ratio terms.
    pub orientation: Orientation,
}

/// Output caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum output width in pixels.
    pub max_width: u32,
    /// Maximum output height in pixels.
    pub max_height: u32,
    /// Encoded size budget in kilobytes.
    pub max_size_kb: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            max_size_kb: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Encoding format of the artifact.
    pub format: OutputFormat,
    /// Free text shown with the condition banner. Empty hides it.
    pub description: String,
}

/// Command-line values that override the config file.
///
/// Only fields that are set end up in the overlay table.
#[derive(Debug, Clone, Default)]
pub struct ConditionOverrides {
    pub ratio: Option<Ratio>,
    pub orientation: Option<Orientation>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub max_size_kb: Option<f64>,
    pub format: Option<OutputFormat>,
}

impl ConditionOverrides {
    /// Sparse TOML table with the same layout as `aspectfit.toml`.
    pub fn to_toml(&self) -> toml::Value {
        let mut target = toml::Table::new();
        if let Some(ratio) = self.ratio {
            target.insert("ratio".into(), ratio.to_string().into());
        }
        if let Some(orientation) = self.orientation {
            target.insert("orientation".into(), orientation.to_string().into());
        }

        let mut limits = toml::Table::new();
        if let Some(w) = self.max_width {
            limits.insert("max_width".into(), i64::from(w).into());
        }
        if let Some(h) = self.max_height {
            limits.insert("max_height".into(), i64::from(h).into());
        }
        if let Some(kb) = self.max_size_kb {
            limits.insert("max_size_kb".into(), kb.into());
        }

        let mut output = toml::Table::new();
        if let Some(format) = self.format {
            output.insert("format".into(), format.to_string().into());
        }

        let mut root = toml::Table::new();
        for (key, table) in [("target", target), ("limits", limits), ("output", output)] {
            if !table.is_empty() {
                root.insert(key.into(), toml::Value::Table(table));
            }
        }
        toml::Value::Table(root)
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Stock defaults as a TOML table: the bottom layer every overlay merges onto.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ConditionConfig::default()).expect("default config must serialize")
}

/// Deep-merge two TOML values, `overlay` winning.
///
/// Tables merge per key and recurse; any other overlay value replaces the
/// base value. Base keys missing from the overlay survive.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// A missing file is `Ok(None)`; unparsable TOML is an error.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge overlays onto a base value in order, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlays: impl IntoIterator<Item = toml::Value>,
) -> Result<ConditionConfig, ConfigError> {
    let merged = overlays.into_iter().fold(base, merge_toml);
    let config: ConditionConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a file, layered over stock defaults and under
/// command-line overrides.
///
/// A missing file yields the defaults. Unknown keys and out-of-range values
/// are errors.
pub fn load_config(
    path: &Path,
    overrides: &ConditionOverrides,
) -> Result<ConditionConfig, ConfigError> {
    let base = stock_defaults_value();
    let file = load_raw_config(path)?;
    resolve_config(base, file.into_iter().chain(Some(overrides.to_toml())))
}

/// Returns a fully-commented stock `aspectfit.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# aspectfit Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# aspectfit reads ./aspectfit.toml, or the file given with --config.
# Command-line flags override values from the file.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Target shape
# ---------------------------------------------------------------------------
[target]
# Aspect ratio as "width:height". Both terms must be positive integers.
# Common choices: "16:9", "4:3", "1:1", "3:2".
ratio = "16:9"

# "landscape" keeps the ratio as written; "portrait" swaps its terms,
# so "16:9" portrait produces 9:16 output.
orientation = "landscape"

# ---------------------------------------------------------------------------
# Limits
# ---------------------------------------------------------------------------
[limits]
# Output is scaled down to fit within these pixel caps. Never scaled up.
max_width = 1920
max_height = 1080

# Encoded size budget in KB (1 KB = 1024 bytes). JPEG quality steps down
# from 90 until the output fits; PNG and WebP are encoded once.
max_size_kb = 1000

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
# One of "jpeg", "png", "webp".
format = "jpeg"

# Free text printed before processing, e.g. who the images are for.
description = ""
"##
}
