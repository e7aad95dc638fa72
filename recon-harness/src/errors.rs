//! Error types for the reconstruction harness.
//!
//! The taxonomy mirrors how failures surface while driving the external
//! pipeline: configuration mistakes are fatal, process and contract
//! failures fail a single stage, and rendering failures never leave the
//! visualization hook.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The suite or its configuration is invalid.
    #[error("{0}")]
    Configuration(#[from] ConfigError),

    /// The external command could not be run to completion.
    #[error("{0}")]
    Process(#[from] ProcessError),

    /// A declared input or the primary output of a stage is absent.
    #[error("Stage '{stage}': missing file {}", path.display())]
    MissingFile {
        /// The stage that needed the file.
        stage: String,
        /// The file that was not found.
        path: PathBuf,
    },

    /// The produced array does not match the expected contract.
    #[error("{0}")]
    Contract(#[from] ContractViolation),

    /// The array reader failed on an existing file.
    #[error("Failed to read {}: {reason}", path.display())]
    Read {
        /// The file being read.
        path: PathBuf,
        /// Reader-specific failure description.
        reason: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Creates a missing file error.
    #[must_use]
    pub fn missing_file(stage: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::MissingFile {
            stage: stage.into(),
            path: path.into(),
        }
    }

    /// Creates a read error.
    #[must_use]
    pub fn read(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Read {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Attributes a missing file reported by a collaborator to `stage`.
    #[must_use]
    pub fn for_stage(self, stage: &str) -> Self {
        match self {
            Self::MissingFile { stage: s, path } if s.is_empty() => Self::MissingFile {
                stage: stage.to_string(),
                path,
            },
            other => other,
        }
    }

    /// Returns a stable error code for reports.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(err) => err.code(),
            Self::Process(err) => err.code(),
            Self::MissingFile { .. } => "HARNESS-MISSING-FILE",
            Self::Contract(_) => "HARNESS-CONTRACT",
            Self::Read { .. } => "HARNESS-READ",
            Self::Io(_) => "HARNESS-IO",
        }
    }

    /// Returns true if the error must abort the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Structured fields for reports, keyed in a stable order.
    #[must_use]
    pub fn to_dict(&self) -> BTreeMap<String, serde_json::Value> {
        let mut map = BTreeMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        match self {
            Self::MissingFile { stage, path } => {
                map.insert("stage".to_string(), serde_json::json!(stage));
                map.insert("path".to_string(), serde_json::json!(path.display().to_string()));
            }
            Self::Contract(violation) => {
                map.insert("stage".to_string(), serde_json::json!(violation.stage));
                map.insert(
                    "mismatches".to_string(),
                    serde_json::to_value(&violation.mismatches).unwrap_or_default(),
                );
            }
            Self::Read { path, .. } => {
                map.insert("path".to_string(), serde_json::json!(path.display().to_string()));
            }
            _ => {}
        }

        map
    }
}

/// Errors in the suite definition or the harness configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A stage name is not present in the declared order.
    #[error("Stage '{name}' is not registered in the execution order")]
    UnknownStage {
        /// The unregistered name.
        name: String,
    },

    /// The same stage was described twice.
    #[error("Stage '{name}' is described more than once")]
    DuplicateStage {
        /// The duplicated name.
        name: String,
    },

    /// A stage consumes the output of a stage that does not run before it.
    #[error("Stage '{stage}' consumes '{input}', which is not ordered before it")]
    OrderViolation {
        /// The consuming stage.
        stage: String,
        /// The input stage that runs too late.
        input: String,
    },

    /// A command-line option name or value was rejected.
    #[error("Invalid option '{name}': {reason}")]
    InvalidOption {
        /// The option name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A configuration value is out of range or malformed.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The configuration field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration {path}: {reason}")]
    Parse {
        /// The configuration file.
        path: String,
        /// Parser message.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an unknown stage error.
    #[must_use]
    pub fn unknown_stage(name: impl Into<String>) -> Self {
        Self::UnknownStage { name: name.into() }
    }

    /// Creates an invalid option error.
    #[must_use]
    pub fn invalid_option(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns a stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownStage { .. } => "HARNESS-CONFIG-UNKNOWN-STAGE",
            Self::DuplicateStage { .. } => "HARNESS-CONFIG-DUPLICATE-STAGE",
            Self::OrderViolation { .. } => "HARNESS-CONFIG-ORDER",
            Self::InvalidOption { .. } => "HARNESS-CONFIG-OPTION",
            Self::InvalidValue { .. } => "HARNESS-CONFIG-VALUE",
            Self::Parse { .. } => "HARNESS-CONFIG-PARSE",
        }
    }
}

/// Errors from running an external pipeline command.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process could not be started.
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The process did not exit within the stage timeout.
    #[error("'{program} {subcommand}' did not finish within {}s", timeout.as_secs_f64())]
    Timeout {
        /// The program.
        program: String,
        /// The pipeline subcommand.
        subcommand: String,
        /// The timeout that expired.
        timeout: Duration,
    },

    /// Waiting on the process failed.
    #[error("Failed waiting for '{program}': {source}")]
    Wait {
        /// The program.
        program: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Returns a stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "HARNESS-PROCESS-SPAWN",
            Self::Timeout { .. } => "HARNESS-PROCESS-TIMEOUT",
            Self::Wait { .. } => "HARNESS-PROCESS-WAIT",
        }
    }
}

/// One field of the output contract that did not match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// What was compared (e.g. "shape", "dims", "attrs.trajectory").
    pub field: String,
    /// The expected value, rendered for display.
    pub expected: String,
    /// The actual value, rendered for display.
    pub actual: String,
}

impl Mismatch {
    /// Creates a new mismatch.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: expected {}, got {}",
            self.field, self.expected, self.actual
        )
    }
}

/// Error raised when a produced array violates its expected contract.
#[derive(Debug, Clone, Error)]
#[error("Contract violation in '{stage}': {}", format_mismatches(mismatches))]
pub struct ContractViolation {
    /// The stage whose output was checked.
    pub stage: String,
    /// Every field that did not match.
    pub mismatches: Vec<Mismatch>,
}

impl ContractViolation {
    /// Creates a new contract violation.
    #[must_use]
    pub fn new(stage: impl Into<String>, mismatches: Vec<Mismatch>) -> Self {
        Self {
            stage: stage.into(),
            mismatches,
        }
    }

    /// Returns the mismatch for a field, if any.
    #[must_use]
    pub fn mismatch(&self, field: &str) -> Option<&Mismatch> {
        self.mismatches.iter().find(|m| m.field == field)
    }
}

fn format_mismatches(mismatches: &[Mismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from the diagnostic rendering path.
///
/// These are never converted into [`HarnessError`]: the visualization hook
/// logs and drops them.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The array carries no sample values to draw.
    #[error("Array has no values loaded")]
    NoValues,

    /// A named axis does not exist in the array.
    #[error("Unknown axis '{0}'")]
    UnknownAxis(String),

    /// A selected index is out of bounds.
    #[error("Index {index} out of bounds for axis '{axis}' of length {len}")]
    OutOfBounds {
        /// The axis.
        axis: String,
        /// The offending index.
        index: usize,
        /// The axis length.
        len: usize,
    },

    /// The reduction did not leave a drawable 2D image.
    #[error("Cannot display: {0}")]
    NotDisplayable(String),

    /// The renderer backend failed.
    #[error("Renderer failed: {0}")]
    Backend(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
