//! # Recon Harness
//!
//! An ordered integration-test harness for the riesling MRI reconstruction
//! pipeline.
//!
//! Each pipeline stage runs as an external process and writes an array file
//! that later stages consume. The harness provides:
//!
//! - **Stage ordering**: an explicit declared order, validated against each
//!   stage's inputs
//! - **Structured invocation**: commands built from validated options, run
//!   without a shell and under a per-stage timeout
//! - **Contract checks**: exact shape, axis-name and attribute-shape checks
//!   after every stage
//! - **Visualization**: an optional hook that reduces an output to a 2D
//!   magnitude image and never affects the outcome
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use recon_harness::prelude::*;
//! use std::sync::Arc;
//!
//! let config = HarnessConfig::default().with_workdir("/tmp/riesling");
//! let suite = Suite::riesling(&config)?;
//! let runner = ProcessRunner::new(&config.workdir, config.stage_timeout());
//!
//! let report = SuiteRunner::new(config, Arc::new(runner), Arc::new(Hdf5Reader::default()))
//!     .run(&suite)
//!     .await?;
//! std::process::exit(report.exit_code());
//! ```

#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod array;
pub mod config;
pub mod errors;
pub mod events;
pub mod logging;
pub mod ordering;
pub mod report;
pub mod runner;
pub mod stages;
pub mod suite;
pub mod testing;
pub mod verify;
pub mod visualize;

/// Prelude module for convenient imports
pub mod prelude {
    #[cfg(feature = "hdf5")]
    pub use crate::array::Hdf5Reader;
    pub use crate::array::{ArrayReader, AttrValue, LabeledArray, MemoryArrayReader, ReadMode};
    pub use crate::config::HarnessConfig;
    pub use crate::errors::{
        ConfigError, ContractViolation, HarnessError, Mismatch, ProcessError, RenderError,
    };
    pub use crate::events::{EventSink, HarnessEvent, LoggingEventSink, NoOpEventSink};
    pub use crate::logging::LogFormat;
    pub use crate::ordering::StageOrder;
    pub use crate::report::{StageReport, StageStatus, SuiteReport};
    pub use crate::runner::{CliOption, CommandSpec, ProcessOutcome, ProcessRunner, StageRunner};
    pub use crate::stages::{riesling_stages, StageDescriptor, Subcommand};
    pub use crate::suite::{Suite, SuiteRunner};
    pub use crate::verify::{verify, Expectation};
    pub use crate::visualize::{DisplaySpec, VisualizationHook};
}
