//! Harness events for observability.
//!
//! The suite runner reports its progress through an [`EventSink`]. The
//! default sink forwards to `tracing`; tests collect events in memory.

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn, Level};

/// Something the harness did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HarnessEvent {
    /// The suite began running.
    SuiteStarted {
        /// Run identifier.
        run_id: String,
        /// Stages scheduled, in order.
        stages: Vec<String>,
    },
    /// A stage command is about to run.
    StageStarted {
        /// Stage name.
        stage: String,
        /// Rendered command line.
        command: String,
    },
    /// A stage passed its contract check.
    StageCompleted {
        /// Stage name.
        stage: String,
        /// Duration in milliseconds.
        duration_ms: f64,
    },
    /// A stage failed.
    StageFailed {
        /// Stage name.
        stage: String,
        /// Error code.
        code: String,
        /// Error message.
        message: String,
    },
    /// Teardown removed the stage outputs.
    TeardownCompleted {
        /// Number of files removed.
        removed: usize,
    },
    /// Teardown could not remove a file.
    TeardownFailed {
        /// The file.
        path: String,
        /// Why removal failed.
        error: String,
    },
}

impl HarnessEvent {
    /// Dotted event type, e.g. `stage.started`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SuiteStarted { .. } => "suite.started",
            Self::StageStarted { .. } => "stage.started",
            Self::StageCompleted { .. } => "stage.completed",
            Self::StageFailed { .. } => "stage.failed",
            Self::TeardownCompleted { .. } => "teardown.completed",
            Self::TeardownFailed { .. } => "teardown.failed",
        }
    }

    /// Returns true for events describing a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::StageFailed { .. } | Self::TeardownFailed { .. })
    }
}

/// Receives harness events.
///
/// Emitting must never fail or panic; sinks swallow their own errors.
pub trait EventSink: Send + Sync {
    /// Emits an event.
    fn emit(&self, event: &HarnessEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &HarnessEvent) {}
}

/// A sink that logs events through `tracing`.
///
/// Failure events are always logged at warn.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &HarnessEvent) {
        let data = serde_json::to_string(event).unwrap_or_default();
        if event.is_failure() {
            warn!(event_type = %event.event_type(), event_data = %data, "Event: {}", event.event_type());
        } else if self.level == Level::DEBUG {
            debug!(event_type = %event.event_type(), event_data = %data, "Event: {}", event.event_type());
        } else {
            info!(event_type = %event.event_type(), event_data = %data, "Event: {}", event.event_type());
        }
    }
}

/// A sink that keeps every event, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<HarnessEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected events.
    #[must_use]
    pub fn events(&self) -> Vec<HarnessEvent> {
        self.events.read().clone()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().iter().map(HarnessEvent::event_type).collect()
    }

    /// Events whose type starts with the prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<HarnessEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(type_prefix))
            .cloned()
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &HarnessEvent) {
        self.events.write().push(event.clone());
    }
}
