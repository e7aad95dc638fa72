//! Pipeline stage runner.
//!
//! Stages are invoked as `<tool> <subcommand> <positional>... --<option>=<value>...`.
//! Arguments are passed as a validated argv, never through a shell.

mod process;

pub use process::ProcessRunner;

use crate::errors::{ConfigError, HarnessError};
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

#[allow(clippy::expect_used)]
static OPTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("valid option name pattern"));

/// One `--name[=value]` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliOption {
    /// `--name=value`
    Value {
        /// Option name without dashes.
        name: String,
        /// Option value.
        value: String,
    },
    /// `--name`
    Flag {
        /// Option name without dashes.
        name: String,
    },
}

impl CliOption {
    /// Creates a validated `--name=value` option.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] for a malformed name or value.
    pub fn value(name: impl Into<String>, value: impl fmt::Display) -> Result<Self, ConfigError> {
        let name = validate_name(name.into())?;
        let value = value.to_string();
        validate_arg(&name, &value)?;
        Ok(Self::Value { name, value })
    }

    /// Creates a validated `--name` flag.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] for a malformed name.
    pub fn flag(name: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self::Flag {
            name: validate_name(name.into())?,
        })
    }

    /// The option name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Value { name, .. } | Self::Flag { name } => name,
        }
    }

    /// Renders the option as a single argv entry.
    #[must_use]
    pub fn to_arg(&self) -> String {
        match self {
            Self::Value { name, value } => format!("--{name}={value}"),
            Self::Flag { name } => format!("--{name}"),
        }
    }
}

fn validate_name(name: String) -> Result<String, ConfigError> {
    if OPTION_NAME.is_match(&name) {
        Ok(name)
    } else {
        Err(ConfigError::invalid_option(
            name,
            "option names must match [a-z][a-z0-9-]*",
        ))
    }
}

fn validate_arg(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::invalid_option(name, "value must not be empty"));
    }
    if value.contains(&['\0', '\n', '\r'][..]) {
        return Err(ConfigError::invalid_option(
            name,
            "value must not contain NUL or line breaks",
        ));
    }
    Ok(())
}

/// A structured invocation of the external pipeline tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// The executable.
    pub program: String,
    /// The pipeline subcommand.
    pub subcommand: String,
    /// Positional arguments, in order.
    pub positional: Vec<String>,
    /// Options, in order.
    pub options: Vec<CliOption>,
}

impl CommandSpec {
    /// Creates an invocation with no arguments beyond the subcommand.
    #[must_use]
    pub fn new(program: impl Into<String>, subcommand: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            subcommand: subcommand.into(),
            positional: Vec::new(),
            options: Vec::new(),
        }
    }

    /// Appends a positional argument.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] for an empty or multi-line value.
    pub fn arg(mut self, value: impl Into<String>) -> Result<Self, ConfigError> {
        let value = value.into();
        validate_arg("<positional>", &value)?;
        self.positional.push(value);
        Ok(self)
    }

    /// Appends an option.
    #[must_use]
    pub fn option(mut self, option: CliOption) -> Self {
        self.options.push(option);
        self
    }

    /// Looks up an option by name.
    #[must_use]
    pub fn get_option(&self, name: &str) -> Option<&CliOption> {
        self.options.iter().find(|o| o.name() == name)
    }

    /// The exact argv passed after the program name.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        std::iter::once(self.subcommand.clone())
            .chain(self.positional.iter().cloned())
            .chain(self.options.iter().map(CliOption::to_arg))
            .collect()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.program, self.args().join(" "))
    }
}

/// What the harness observed about a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code, `None` if killed by a signal.
    pub exit_code: Option<i32>,
    /// Wall-clock duration.
    pub duration: Duration,
    /// Last bytes of standard error.
    pub stderr_tail: String,
}

impl ProcessOutcome {
    /// An outcome for a process that exited with code 0.
    #[must_use]
    pub fn success(duration: Duration) -> Self {
        Self {
            exit_code: Some(0),
            duration,
            stderr_tail: String::new(),
        }
    }

    /// Returns true if the process exited with code 0.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Executes one pipeline command to completion.
///
/// The exit status is reported, not judged: a stage that fails silently is
/// caught when its output is read.
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Runs the command and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Process`] if the process cannot be started
    /// or does not finish within the runner's timeout.
    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutcome, HarnessError>;
}
