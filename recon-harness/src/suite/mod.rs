//! Suite scheduling, execution and teardown.
//!
//! A [`Suite`] is a validated, ordered set of stage descriptors. A
//! [`SuiteRunner`] executes it strictly sequentially: each stage's process
//! runs to completion before its output is read and checked. A failed stage
//! does not stop the run; stages that consume its output then fail on their
//! missing input.

#[cfg(test)]
mod integration_tests;

use crate::array::{ArrayReader, ReadMode};
use crate::config::HarnessConfig;
use crate::errors::{ConfigError, HarnessError};
use crate::events::{EventSink, HarnessEvent, LoggingEventSink};
use crate::ordering::StageOrder;
use crate::report::{StageReport, SuiteReport, TeardownFailure};
use crate::runner::{CommandSpec, StageRunner};
use crate::stages::{riesling_stages, StageDescriptor, RIESLING_ORDER};
use crate::verify::verify;
use crate::visualize::{DisplaySpec, VisualizationHook};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// A validated suite definition.
#[derive(Debug, Clone)]
pub struct Suite {
    order: StageOrder,
    stages: Vec<StageDescriptor>,
}

impl Suite {
    /// Validates descriptors against the order and schedules them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownStage`] for a descriptor or input not
    /// registered in the order, [`ConfigError::DuplicateStage`] for a name
    /// described twice, and [`ConfigError::OrderViolation`] for an input
    /// that does not run before its consumer.
    pub fn new(order: StageOrder, stages: Vec<StageDescriptor>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::with_capacity(stages.len());
        for stage in &stages {
            order.position(&stage.name)?;
            if !seen.insert(stage.name.as_str()) {
                return Err(ConfigError::DuplicateStage {
                    name: stage.name.clone(),
                });
            }
        }

        order.validate_dependencies(
            stages
                .iter()
                .map(|s| (s.name.as_str(), s.inputs.iter().map(String::as_str))),
        )?;
        if let Some(input) = stages
            .iter()
            .flat_map(|s| &s.inputs)
            .find(|input| !seen.contains(input.as_str()))
        {
            return Err(ConfigError::unknown_stage(input.clone()));
        }

        let names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
        let scheduled = order.sort(&names)?;
        let mut by_name: HashMap<String, StageDescriptor> = stages
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();
        let stages = scheduled
            .iter()
            .filter_map(|name| by_name.remove(name))
            .collect();

        Ok(Self { order, stages })
    }

    /// The five-stage reconstruction suite.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration yields invalid commands.
    pub fn riesling(config: &HarnessConfig) -> Result<Self, ConfigError> {
        Self::new(StageOrder::new(RIESLING_ORDER), riesling_stages(config)?)
    }

    /// The declared order.
    #[must_use]
    pub fn order(&self) -> &StageOrder {
        &self.order
    }

    /// Scheduled stages, in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    /// Scheduled stage names, in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Selects a subset of stages, still in execution order.
    ///
    /// An empty selection selects every stage.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownStage`] for a name not in the suite.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&StageDescriptor>, ConfigError> {
        if names.is_empty() {
            return Ok(self.stages.iter().collect());
        }
        let wanted = names
            .iter()
            .map(|n| {
                let n = n.as_ref();
                self.stage(n)
                    .map(|s| s.name.as_str())
                    .ok_or_else(|| ConfigError::unknown_stage(n))
            })
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(self
            .stages
            .iter()
            .filter(|s| wanted.contains(s.name.as_str()))
            .collect())
    }
}

/// What teardown did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownSummary {
    /// Files removed.
    pub removed: Vec<PathBuf>,
    /// Files that could not be removed.
    pub failures: Vec<TeardownFailure>,
}

/// Executes a [`Suite`] against a runner and an array reader.
pub struct SuiteRunner {
    config: HarnessConfig,
    runner: Arc<dyn StageRunner>,
    reader: Arc<dyn ArrayReader>,
    hook: VisualizationHook,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for SuiteRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteRunner")
            .field("config", &self.config)
            .field("hook", &self.hook)
            .finish_non_exhaustive()
    }
}

impl SuiteRunner {
    /// Creates a runner with visualization off and logged events.
    #[must_use]
    pub fn new(
        config: HarnessConfig,
        runner: Arc<dyn StageRunner>,
        reader: Arc<dyn ArrayReader>,
    ) -> Self {
        Self {
            config,
            runner,
            reader,
            hook: VisualizationHook::disabled(),
            events: Arc::new(LoggingEventSink::default()),
        }
    }

    /// Sets the visualization hook.
    #[must_use]
    pub fn with_hook(mut self, hook: VisualizationHook) -> Self {
        self.hook = hook;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Runs every stage, then tears down unless outputs are kept.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`HarnessError::Configuration`] before any stage runs.
    pub async fn run(&self, suite: &Suite) -> Result<SuiteReport, HarnessError> {
        self.run_selected::<&str>(suite, &[]).await
    }

    /// Runs the selected stages in order, then tears down unless outputs are
    /// kept. An empty selection runs every stage.
    ///
    /// Stage failures are recorded in the report, never returned.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`HarnessError::Configuration`] for an unknown stage
    /// name or an unbuildable command, before any stage runs.
    pub async fn run_selected<S: AsRef<str>>(
        &self,
        suite: &Suite,
        selection: &[S],
    ) -> Result<SuiteReport, HarnessError> {
        let scheduled = suite
            .select(selection)?
            .into_iter()
            .map(|stage| Ok((stage, stage.command(&self.config.tool)?)))
            .collect::<Result<Vec<(&StageDescriptor, CommandSpec)>, ConfigError>>()?;

        let mut report = SuiteReport::new();
        let names: Vec<String> = scheduled.iter().map(|(s, _)| s.name.clone()).collect();
        info!(run_id = %report.run_id, stages = ?names, "starting suite");
        self.events.emit(&HarnessEvent::SuiteStarted {
            run_id: report.run_id.to_string(),
            stages: names,
        });

        for (stage, command) in &scheduled {
            let span = info_span!("stage", stage = %stage.name, subcommand = %stage.subcommand);
            let stage_report = self.run_stage(suite, stage, command).instrument(span).await;
            report.push(stage_report);
        }

        if self.config.keep_outputs {
            info!(workdir = %self.config.workdir.display(), "keeping stage outputs");
        } else {
            report.teardown_failures = self.teardown().failures;
        }
        report.finish();

        let failed = report.failed_stages();
        if failed.is_empty() {
            info!(run_id = %report.run_id, "all stages passed");
        } else {
            warn!(run_id = %report.run_id, failed = ?failed, "suite finished with failures");
        }
        Ok(report)
    }

    /// Runs one stage and reports its outcome.
    pub async fn run_stage(
        &self,
        suite: &Suite,
        stage: &StageDescriptor,
        command: &CommandSpec,
    ) -> StageReport {
        let start = Instant::now();
        self.events.emit(&HarnessEvent::StageStarted {
            stage: stage.name.clone(),
            command: command.to_string(),
        });

        if let Err(err) = self.check_inputs(suite, stage) {
            return self.fail(stage, start, None, &err);
        }

        let outcome = match self.runner.run(command).await {
            Ok(outcome) => outcome,
            Err(err) => return self.fail(stage, start, None, &err),
        };
        debug!(exit_code = ?outcome.exit_code, "stage process exited");

        let output = stage.output_path(&self.config);
        if let Err(err) = self.check_output(stage, &output) {
            let report = self.fail(stage, start, outcome.exit_code, &err);
            return if output.is_file() {
                report.with_output(&output)
            } else {
                report
            };
        }

        let duration = start.elapsed();
        info!(duration_ms = duration.as_secs_f64() * 1000.0, "stage passed");
        self.events.emit(&HarnessEvent::StageCompleted {
            stage: stage.name.clone(),
            duration_ms: duration.as_secs_f64() * 1000.0,
        });
        StageReport::passed(&stage.name, duration)
            .with_exit_code(outcome.exit_code)
            .with_output(&output)
    }

    fn check_inputs(&self, suite: &Suite, stage: &StageDescriptor) -> Result<(), HarnessError> {
        for input in &stage.inputs {
            let producer = suite
                .stage(input)
                .ok_or_else(|| ConfigError::unknown_stage(input.clone()))?;
            let path = producer.output_path(&self.config);
            if !path.is_file() {
                return Err(HarnessError::missing_file(&stage.name, path));
            }
        }
        Ok(())
    }

    fn check_output(&self, stage: &StageDescriptor, output: &Path) -> Result<(), HarnessError> {
        if !output.is_file() {
            return Err(HarnessError::missing_file(&stage.name, output));
        }

        let array = self
            .reader
            .read(output, ReadMode::Header)
            .map_err(|e| e.for_stage(&stage.name))?;
        debug!(array = %array, "read stage output");

        verify(&stage.name, &array, &stage.expectation)?;

        if let Some(display) = &stage.display {
            self.show_output(stage, output, display);
        }
        Ok(())
    }

    /// Renders a verified output. Never affects the stage outcome.
    fn show_output(&self, stage: &StageDescriptor, output: &Path, display: &DisplaySpec) {
        if !self.hook.is_enabled() {
            return;
        }
        match self.reader.read(output, ReadMode::WithValues) {
            Ok(array) => {
                let _ = self.hook.show(&array, display);
            }
            Err(e) => warn!(
                stage = %stage.name,
                error = %e,
                "could not load values for rendering; skipping"
            ),
        }
    }

    fn fail(
        &self,
        stage: &StageDescriptor,
        start: Instant,
        exit_code: Option<i32>,
        err: &HarnessError,
    ) -> StageReport {
        error!(code = err.code(), error = %err, "stage failed");
        self.events.emit(&HarnessEvent::StageFailed {
            stage: stage.name.clone(),
            code: err.code().to_string(),
            message: err.to_string(),
        });
        StageReport::failed(&stage.name, start.elapsed(), err).with_exit_code(exit_code)
    }

    /// Removes every `<prefix>*.h5` file in the working directory.
    ///
    /// Best effort: failures are logged and returned, never raised.
    pub fn teardown(&self) -> TeardownSummary {
        let mut summary = TeardownSummary::default();
        let workdir = &self.config.workdir;

        let entries = match std::fs::read_dir(workdir) {
            Ok(entries) => entries,
            Err(err) => {
                self.teardown_failed(&mut summary, workdir, &err);
                return summary;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let matches = path.file_name().and_then(|n| n.to_str()).is_some_and(|name| {
                name.starts_with(&self.config.prefix) && name.ends_with(".h5")
            });
            if !matches || !path.is_file() {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "removed stage output");
                    summary.removed.push(path);
                }
                Err(err) => self.teardown_failed(&mut summary, &path, &err),
            }
        }

        info!(removed = summary.removed.len(), "teardown complete");
        self.events.emit(&HarnessEvent::TeardownCompleted {
            removed: summary.removed.len(),
        });
        summary
    }

    fn teardown_failed(&self, summary: &mut TeardownSummary, path: &Path, err: &std::io::Error) {
        warn!(path = %path.display(), error = %err, "teardown could not remove file");
        self.events.emit(&HarnessEvent::TeardownFailed {
            path: path.display().to_string(),
            error: err.to_string(),
        });
        summary.failures.push(TeardownFailure {
            path: path.to_path_buf(),
            error: err.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::Expectation;
    use crate::stages::Subcommand;
    use pretty_assertions::assert_eq;

    fn descriptor(name: &str, inputs: &[&str]) -> StageDescriptor {
        inputs.iter().fold(
            StageDescriptor::new(
                name,
                Subcommand::Rss,
                format!("-{name}"),
                Expectation::new(vec![1], ["volume"]),
            ),
            |stage, input| stage.input(*input),
        )
    }

    fn order() -> StageOrder {
        StageOrder::new(RIESLING_ORDER)
    }

    #[test]
    fn test_schedules_by_declared_order() {
        let suite = Suite::new(
            order(),
            vec![
                descriptor("nufft", &["kspace"]),
                descriptor("image", &[]),
                descriptor("kspace", &["image"]),
            ],
        )
        .unwrap();
        assert_eq!(suite.names(), vec!["image", "kspace", "nufft"]);
    }

    #[test]
    fn test_unknown_stage_is_fatal() {
        let err = Suite::new(order(), vec![descriptor("test_bogus", &[])]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStage { ref name } if name == "test_bogus"));
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let err = Suite::new(order(), vec![descriptor("rss", &[]), descriptor("rss", &[])])
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateStage { .. }));
    }

    #[test]
    fn test_input_must_run_first() {
        let err = Suite::new(
            order(),
            vec![descriptor("image", &["rss"]), descriptor("rss", &[])],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::OrderViolation { .. }));
    }

    #[test]
    fn test_input_must_be_described() {
        let err = Suite::new(order(), vec![descriptor("rss", &["kspace"])]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStage { ref name } if name == "kspace"));
    }

    #[test]
    fn test_select_keeps_order() {
        let suite = Suite::riesling(&HarnessConfig::default()).unwrap();
        let selected: Vec<&str> = suite
            .select(&["nufft", "image"])
            .unwrap()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(selected, vec!["image", "nufft"]);

        assert_eq!(suite.select::<&str>(&[]).unwrap().len(), 5);
        assert!(suite.select(&["recon"]).is_err());
    }
}
