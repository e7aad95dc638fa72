//! Harness configuration.
//!
//! Loaded from an optional TOML file; every field has a default matching
//! the reference run of the pipeline (64³ matrix, 3 mm voxels, 4 channels).

use crate::errors::ConfigError;
use crate::logging::LogFormat;
use crate::verify::Expectation;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Configuration for a harness run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// The pipeline executable.
    #[serde(default = "default_tool")]
    pub tool: String,
    /// Working directory where stage outputs are written.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    /// Shared file-name prefix for every stage output.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Matrix size.
    #[serde(default = "default_matrix")]
    pub matrix: usize,
    /// Voxel size in mm.
    #[serde(default = "default_voxel_size")]
    pub voxel_size: f64,
    /// Number of receive channels to simulate.
    #[serde(default = "default_channels")]
    pub channels: usize,
    /// Partial-sampling fraction (NEX).
    #[serde(default = "default_nex")]
    pub nex: f64,
    /// Phantom size in mm.
    #[serde(default = "default_phantom_size")]
    pub phantom_size: f64,
    /// Use the geometric test-pattern phantom.
    #[serde(default = "default_gradcubes")]
    pub gradcubes: bool,
    /// Sensitivity field-of-view override passed to the forward model.
    #[serde(default = "default_sense_fov")]
    pub sense_fov: f64,
    /// Per-stage process timeout in seconds.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_seconds: f64,
    /// Directory for diagnostic images.
    #[serde(default = "default_plot_dir")]
    pub plot_dir: PathBuf,
    /// Log level filter.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log format: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Where to write the JSON run report.
    #[serde(default)]
    pub report_path: Option<PathBuf>,
    /// Leave stage outputs on disk after the run.
    #[serde(default)]
    pub keep_outputs: bool,
    /// Per-stage overrides of the expected output contract.
    #[serde(default)]
    pub expect: BTreeMap<String, Expectation>,
}

fn default_tool() -> String {
    "riesling".to_string()
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

fn default_prefix() -> String {
    "unittest".to_string()
}

fn default_matrix() -> usize {
    64
}

fn default_voxel_size() -> f64 {
    3.0
}

fn default_channels() -> usize {
    4
}

fn default_nex() -> f64 {
    0.5
}

fn default_phantom_size() -> f64 {
    64.0
}

fn default_gradcubes() -> bool {
    true
}

fn default_sense_fov() -> f64 {
    -1.0
}

fn default_stage_timeout() -> f64 {
    600.0
}

fn default_plot_dir() -> PathBuf {
    PathBuf::from("plots")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            workdir: default_workdir(),
            prefix: default_prefix(),
            matrix: default_matrix(),
            voxel_size: default_voxel_size(),
            channels: default_channels(),
            nex: default_nex(),
            phantom_size: default_phantom_size(),
            gradcubes: default_gradcubes(),
            sense_fov: default_sense_fov(),
            stage_timeout_seconds: default_stage_timeout(),
            plot_dir: default_plot_dir(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            report_path: None,
            keep_outputs: false,
            expect: BTreeMap::new(),
        }
    }
}

#[allow(clippy::expect_used)]
static PREFIX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid prefix pattern"));

impl HarnessConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown fields,
    /// or the first validation error.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the file cannot be read or parsed,
    /// or the first validation error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Sets the pipeline executable.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Sets the output prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the per-stage timeout.
    #[must_use]
    pub fn with_stage_timeout(mut self, seconds: f64) -> Self {
        self.stage_timeout_seconds = seconds;
        self
    }

    /// Per-stage timeout as a `Duration`.
    ///
    /// A value [`validate`](Self::validate) would reject falls back to the
    /// default timeout.
    #[must_use]
    pub fn stage_timeout(&self) -> Duration {
        timeout_duration(self.stage_timeout_seconds)
            .unwrap_or_else(|| Duration::from_secs_f64(default_stage_timeout()))
    }

    /// The configured log format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unknown format name.
    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        self.log_format.parse()
    }

    /// Path of `<workdir>/<prefix><suffix>.h5`.
    #[must_use]
    pub fn output_path(&self, suffix: &str) -> PathBuf {
        self.workdir.join(format!("{}{suffix}.h5", self.prefix))
    }

    /// Validates ranges and formats.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tool.trim().is_empty() {
            return Err(ConfigError::invalid_value("tool", "must not be empty"));
        }
        if !PREFIX_PATTERN.is_match(&self.prefix) {
            return Err(ConfigError::invalid_value(
                "prefix",
                format!("'{}' must match [A-Za-z0-9_.-]+", self.prefix),
            ));
        }
        if self.matrix == 0 {
            return Err(ConfigError::invalid_value("matrix", "must be positive"));
        }
        if self.channels == 0 {
            return Err(ConfigError::invalid_value("channels", "must be positive"));
        }
        if !(self.voxel_size.is_finite() && self.voxel_size > 0.0) {
            return Err(ConfigError::invalid_value("voxel_size", "must be positive"));
        }
        if !(self.nex > 0.0 && self.nex <= 1.0) {
            return Err(ConfigError::invalid_value("nex", "must be in (0, 1]"));
        }
        if !(self.phantom_size.is_finite() && self.phantom_size > 0.0) {
            return Err(ConfigError::invalid_value("phantom_size", "must be positive"));
        }
        if !self.sense_fov.is_finite() {
            return Err(ConfigError::invalid_value("sense_fov", "must be finite"));
        }
        if timeout_duration(self.stage_timeout_seconds).is_none() {
            return Err(ConfigError::invalid_value(
                "stage_timeout_seconds",
                format!(
                    "{} must be a positive number of seconds no larger than {}",
                    self.stage_timeout_seconds,
                    Duration::MAX.as_secs()
                ),
            ));
        }
        self.log_format()?;
        Ok(())
    }
}

/// A positive timeout that fits in a `Duration`.
fn timeout_duration(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|d| !d.is_zero())
}
