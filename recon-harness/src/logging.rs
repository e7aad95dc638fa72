//! Log output setup.
//!
//! Stage progress goes to stderr so the per-stage summary on stdout stays
//! clean. `RUST_LOG` overrides the configured level.

use crate::errors::ConfigError;
use anyhow::{Context, Result};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as log_fmt, EnvFilter, Layer, Registry};

/// How log records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line human-readable records.
    #[default]
    Pretty,
    /// One JSON object per record, with the enclosing stage span.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::invalid_value(
                "log_format",
                format!("unknown format '{other}', expected 'json' or 'pretty'"),
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        })
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn output_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Pretty => log_fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => log_fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed(),
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails on an unparsable level or if a global subscriber is already set.
pub fn init_tracing(log_level: &str, format: LogFormat) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level '{log_level}'"))?,
    };

    tracing_subscriber::registry()
        .with(output_layer(format))
        .with(filter)
        .try_init()
        .with_context(|| format!("failed to install {format} log subscriber"))
}
