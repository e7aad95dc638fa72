//! A stage runner that records commands instead of spawning them.

use crate::errors::HarnessError;
use crate::runner::{CommandSpec, ProcessOutcome, StageRunner};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

type Effect = Box<dyn Fn(&CommandSpec) -> std::io::Result<()> + Send + Sync>;

/// A [`StageRunner`] that records every command.
///
/// An optional effect runs for each command, typically writing the files the
/// real tool would have produced. Subcommands marked as failing exit with
/// code 1 and skip the effect.
#[derive(Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<CommandSpec>>,
    effect: Option<Effect>,
    failing: Vec<String>,
}

impl std::fmt::Debug for RecordingRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingRunner")
            .field("commands", &self.commands.lock().len())
            .field("failing", &self.failing)
            .finish_non_exhaustive()
    }
}

impl RecordingRunner {
    /// Creates a runner with no effect.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `effect` for every command that does not fail.
    #[must_use]
    pub fn with_effect<F>(mut self, effect: F) -> Self
    where
        F: Fn(&CommandSpec) -> std::io::Result<()> + Send + Sync + 'static,
    {
        self.effect = Some(Box::new(effect));
        self
    }

    /// Makes `subcommand` exit with code 1 without producing anything.
    #[must_use]
    pub fn failing(mut self, subcommand: impl Into<String>) -> Self {
        self.failing.push(subcommand.into());
        self
    }

    /// All recorded commands, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<CommandSpec> {
        self.commands.lock().clone()
    }

    /// Recorded subcommands, in order.
    #[must_use]
    pub fn subcommands(&self) -> Vec<String> {
        self.commands
            .lock()
            .iter()
            .map(|c| c.subcommand.clone())
            .collect()
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.commands.lock().len()
    }
}

#[async_trait]
impl StageRunner for RecordingRunner {
    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutcome, HarnessError> {
        self.commands.lock().push(command.clone());

        if self.failing.contains(&command.subcommand) {
            return Ok(ProcessOutcome {
                exit_code: Some(1),
                duration: Duration::ZERO,
                stderr_tail: format!("{} failed", command.subcommand),
            });
        }
        if let Some(effect) = &self.effect {
            effect(command)?;
        }
        Ok(ProcessOutcome::success(Duration::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_records_and_applies_effect() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let runner = RecordingRunner::new().with_effect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        runner.run(&CommandSpec::new("riesling", "phantom")).await.unwrap();
        runner.run(&CommandSpec::new("riesling", "rss")).await.unwrap();

        assert_eq!(runner.subcommands(), vec!["phantom", "rss"]);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failing_subcommand() {
        let runner = RecordingRunner::new()
            .failing("recon")
            .with_effect(|_| Err(std::io::Error::other("should not run")));

        let outcome = runner.run(&CommandSpec::new("riesling", "recon")).await.unwrap();
        assert_eq!(outcome.exit_code, Some(1));

        let err = runner.run(&CommandSpec::new("riesling", "rss")).await.unwrap_err();
        assert_eq!(err.code(), "HARNESS-IO");
        assert_eq!(runner.call_count(), 2);
    }
}
