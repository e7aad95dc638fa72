//! Command-line entry point for recon-harness.

use anyhow::{Context, Result};
use clap::Parser;
use recon_harness::array::ArrayReader;
use recon_harness::config::HarnessConfig;
use recon_harness::events::LoggingEventSink;
use recon_harness::logging::init_tracing;
use recon_harness::runner::ProcessRunner;
use recon_harness::suite::{Suite, SuiteRunner};
use recon_harness::visualize::VisualizationHook;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Ordered integration tests for the riesling reconstruction pipeline.
///
/// Runs phantom generation, sensitivity simulation, forward
/// reconstruction, RSS combination and NUFFT regridding in order, and
/// checks the shape, axis names and attributes of every output.
#[derive(Parser, Debug)]
#[command(name = "recon-harness")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a harness TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the pipeline executable.
    #[arg(long)]
    tool: Option<String>,

    /// Override the working directory for stage outputs.
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Override the shared output file prefix.
    #[arg(long)]
    prefix: Option<String>,

    /// Run only the named stages (repeatable), still in declared order.
    #[arg(long = "stage", value_name = "NAME")]
    stages: Vec<String>,

    /// Leave stage outputs on disk after the run.
    #[arg(long)]
    keep_outputs: bool,

    /// Write a JSON run report to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    log_format: Option<String>,

    /// Increase verbosity. `-v` logs at debug; `-vv` also renders each
    /// stage output to an image.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_config(self) -> Result<(HarnessConfig, Vec<String>, u8)> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => HarnessConfig::default(),
        };

        if let Some(tool) = self.tool {
            config.tool = tool;
        }
        if let Some(workdir) = self.workdir {
            config.workdir = workdir;
        }
        if let Some(prefix) = self.prefix {
            config.prefix = prefix;
        }
        if self.keep_outputs {
            config.keep_outputs = true;
        }
        if let Some(report) = self.report {
            config.report_path = Some(report);
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        } else if self.verbose > 0 && config.log_level == "info" {
            config.log_level = "debug".to_string();
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }

        config.validate()?;
        Ok((config, self.stages, self.verbose))
    }
}

#[cfg(feature = "hdf5")]
fn array_reader() -> Result<Arc<dyn ArrayReader>> {
    Ok(Arc::new(recon_harness::array::Hdf5Reader::default()))
}

#[cfg(not(feature = "hdf5"))]
fn array_reader() -> Result<Arc<dyn ArrayReader>> {
    anyhow::bail!("recon-harness was built without HDF5 support; rebuild with `--features hdf5`")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let (config, stages, verbose) = Cli::parse().into_config()?;
    init_tracing(&config.log_level, config.log_format()?)?;

    anyhow::ensure!(
        config.workdir.is_dir(),
        "working directory {} does not exist",
        config.workdir.display()
    );

    tracing::info!(
        tool = %config.tool,
        workdir = %config.workdir.display(),
        prefix = %config.prefix,
        "recon-harness starting"
    );

    let suite = Suite::riesling(&config)?;
    let runner = ProcessRunner::new(&config.workdir, config.stage_timeout());
    let hook = VisualizationHook::from_flag(verbose >= 2, &config.workdir.join(&config.plot_dir));
    let report_path = config.report_path.clone();

    let harness = SuiteRunner::new(config, Arc::new(runner), array_reader()?)
        .with_hook(hook)
        .with_event_sink(Arc::new(LoggingEventSink::default()));

    let report = harness.run_selected(&suite, &stages).await?;

    if let Some(path) = report_path {
        report
            .write(&path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "report written");
    }

    for stage in &report.stages {
        match &stage.error_message {
            None => println!("ok     {} ({:.0} ms)", stage.name, stage.duration_ms),
            Some(message) => println!("FAILED {}: {}", stage.name, message),
        }
    }

    Ok(if report.exit_code() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
