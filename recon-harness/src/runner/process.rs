//! Runs pipeline commands as child processes.

use super::{CommandSpec, ProcessOutcome, StageRunner};
use crate::errors::{HarnessError, ProcessError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

const STDERR_TAIL_BYTES: usize = 2048;

/// A [`StageRunner`] that spawns the pipeline tool with tokio.
///
/// Each command runs to completion before `run` returns. A command still
/// running when the timeout expires is killed and reported as
/// [`ProcessError::Timeout`].
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    workdir: PathBuf,
    timeout: Duration,
}

impl ProcessRunner {
    /// Creates a runner that executes commands in `workdir`.
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            workdir: workdir.into(),
            timeout,
        }
    }

    /// The per-command timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl StageRunner for ProcessRunner {
    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutcome, HarnessError> {
        debug!(command = %command, workdir = %self.workdir.display(), "spawning stage command");

        let start = Instant::now();
        let mut child = Command::new(&command.program)
            .args(command.args())
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: command.program.clone(),
                source,
            })?;
        let stderr = child.stderr.take();

        let finished = async {
            let (status, stderr) = tokio::join!(child.wait(), read_tail(stderr));
            status.map(|status| (status, stderr))
        };
        // On timeout the child is dropped on return, which kills it.
        let (status, stderr) = match tokio::time::timeout(self.timeout, finished).await {
            Ok(result) => result.map_err(|source| ProcessError::Wait {
                program: command.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(ProcessError::Timeout {
                    program: command.program.clone(),
                    subcommand: command.subcommand.clone(),
                    timeout: self.timeout,
                }
                .into());
            }
        };

        let outcome = ProcessOutcome {
            exit_code: status.code(),
            duration: start.elapsed(),
            stderr_tail: tail(stderr),
        };

        if !outcome.succeeded() {
            warn!(
                command = %command,
                exit_code = ?outcome.exit_code,
                stderr = %outcome.stderr_tail,
                "stage command exited abnormally"
            );
        }

        Ok(outcome)
    }
}

/// Drains a stream, keeping only its last [`STDERR_TAIL_BYTES`] bytes.
///
/// A read error ends the stream early; whatever was kept is returned.
async fn read_tail<R: AsyncRead + Unpin>(stream: Option<R>) -> VecDeque<u8> {
    let mut kept = VecDeque::with_capacity(STDERR_TAIL_BYTES);
    let Some(mut stream) = stream else {
        return kept;
    };
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                kept.extend(&buf[..n]);
                let excess = kept.len().saturating_sub(STDERR_TAIL_BYTES);
                kept.drain(..excess);
            }
        }
    }
    kept
}

fn tail(kept: VecDeque<u8>) -> String {
    let bytes = Vec::from(kept);
    String::from_utf8_lossy(&bytes).trim().to_string()
}
