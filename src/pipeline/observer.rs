use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Local;
use tracing::{debug, error, info, warn};

/// Severity of a pipeline message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational event.
    Info,
    /// Non-fatal problem; the run continues.
    Warning,
    /// The file failed.
    Error,
    /// Failure outside the normal flow (caught panic, failed recovery).
    Critical,
}

/// Position of a file in the processing state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Raw,
    MovingToProcessing,
    Downloading,
    Converting,
    MovingToCompleted,
    Done,
    MovingToError,
    Failed,
}

impl PipelineState {
    /// `Done` and `Failed` end a run.
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineState::Raw => "raw",
            PipelineState::MovingToProcessing => "moving-to-processing",
            PipelineState::Downloading => "downloading",
            PipelineState::Converting => "converting",
            PipelineState::MovingToCompleted => "moving-to-completed",
            PipelineState::Done => "done",
            PipelineState::MovingToError => "moving-to-error",
            PipelineState::Failed => "failed",
        })
    }
}

/// Bulk-loop progress; `index` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub index: usize,
    pub total: usize,
    pub filename: String,
}

impl Progress {
    /// Fraction of the batch started so far, in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.index as f64 / self.total as f64
        }
    }
}

/// Observer interface for pipeline events.
///
/// Implementors can feed progress bars, session logs or metrics.
pub trait PipelineObserver: Send + Sync {
    /// Called when a file enters a new state.
    fn on_transition(&self, _filename: &str, _state: PipelineState) {}

    /// Called for every human-readable step message.
    fn on_message(&self, _severity: Severity, _message: &str) {}

    /// Called before each file of a bulk run.
    fn on_progress(&self, _progress: &Progress) {}
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }

    pub fn push(&mut self, observer: Arc<dyn PipelineObserver>) {
        self.observers.push(observer);
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl PipelineObserver for CompositeObserver {
    fn on_transition(&self, filename: &str, state: PipelineState) {
        for o in &self.observers {
            o.on_transition(filename, state);
        }
    }

    fn on_message(&self, severity: Severity, message: &str) {
        for o in &self.observers {
            o.on_message(severity, message);
        }
    }

    fn on_progress(&self, progress: &Progress) {
        for o in &self.observers {
            o.on_progress(progress);
        }
    }
}

/// Forwards pipeline events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_transition(&self, filename: &str, state: PipelineState) {
        if state.is_terminal() {
            info!(file = filename, state = %state, "pipeline finished");
        } else {
            debug!(file = filename, state = %state, "pipeline transition");
        }
    }

    fn on_message(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => info!(target: "stage_extract::pipeline", "{message}"),
            Severity::Warning => warn!(target: "stage_extract::pipeline", "{message}"),
            Severity::Error | Severity::Critical => {
                error!(target: "stage_extract::pipeline", severity = ?severity, "{message}")
            }
        }
    }

    fn on_progress(&self, progress: &Progress) {
        info!(
            index = progress.index,
            total = progress.total,
            file = %progress.filename,
            "batch progress"
        );
    }
}

/// Rolling buffer of `[HH:MM:SS] message` lines for display.
#[derive(Debug)]
pub struct SessionLog {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl SessionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a timestamped line, dropping the oldest beyond capacity.
    pub fn push(&self, message: &str) {
        let line = format!("[{}] {message}", Local::now().format("%H:%M:%S"));
        let mut lines = self.lock();
        lines.push_back(line);
        while lines.len() > self.capacity {
            lines.pop_front();
        }
    }

    /// Lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl PipelineObserver for SessionLog {
    fn on_message(&self, _severity: Severity, message: &str) {
        self.push(message);
    }
}
