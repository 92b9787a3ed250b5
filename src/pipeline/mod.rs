//! The per-file processing state machine.
//!
//! ```text
//! Raw -> MovingToProcessing -> Downloading -> Converting
//!     -> MovingToCompleted -> Done
//!     |  MovingToError     -> Failed
//! ```
//!
//! Each [`ProcessingPipeline::process`] call writes exactly one `STARTED` row and exactly one
//! terminal (`SUCCESS` / `FAILED`) row to the operation log, whatever happens in between:
//! conversion errors, panics inside a converter, and unexpected errors all end in `FAILED`
//! with the file routed to the error stage where possible.

mod batch;
mod observer;

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};

use crate::audit::{AuditLog, LogRecord, LogStatus, OperationKind};
use crate::convert::{extension_of, ConversionReport, Converter};
use crate::error::{ExtractError, ExtractResult};
use crate::stage::{validate_filename, Stage, StageStore};

pub use batch::{BatchEntry, BatchReport, UploadFile};
pub use observer::{
    CompositeObserver, PipelineObserver, PipelineState, Progress, SessionLog, Severity,
    TracingObserver,
};

/// Result of one [`ProcessingPipeline::process`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub success: bool,
    pub message: String,
    /// Tables created (success only).
    pub tables: Vec<String>,
    pub rows: usize,
    /// Stage the file was last placed in, when known.
    pub final_stage: Option<Stage>,
}

impl ProcessOutcome {
    fn failed(message: impl Into<String>, final_stage: Option<Stage>) -> Self {
        Self {
            success: false,
            message: message.into(),
            tables: Vec::new(),
            rows: 0,
            final_stage,
        }
    }
}

/// Terminal row details plus the outcome handed back to the caller.
struct Finish {
    outcome: ProcessOutcome,
    target: Option<Stage>,
}

/// Drives files through the stages and records every step.
#[derive(Clone)]
pub struct ProcessingPipeline {
    stages: StageStore,
    converter: Arc<dyn Converter>,
    audit: AuditLog,
    observer: Arc<dyn PipelineObserver>,
}

impl std::fmt::Debug for ProcessingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingPipeline")
            .field("stages", &self.stages)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

impl ProcessingPipeline {
    /// Wire a pipeline; `observer` receives every message and state transition.
    pub fn new(
        stages: StageStore,
        converter: Arc<dyn Converter>,
        audit: AuditLog,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            stages,
            converter,
            audit,
            observer,
        }
    }

    /// The stages files move through.
    pub fn stages(&self) -> &StageStore {
        &self.stages
    }

    /// The operation log every run writes to.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    fn say(&self, severity: Severity, message: &str) {
        self.observer.on_message(severity, message);
    }

    /// Write a log row; a failed write is reported as a warning and never fails the caller.
    fn log(&self, record: &LogRecord) {
        if let Err(e) = self.audit.try_record(record) {
            self.say(Severity::Warning, &format!("Failed to log operation: {e}"));
        }
    }

    fn enter(&self, filename: &str, state: PipelineState) {
        self.observer.on_transition(filename, state);
    }

    /// Convert a file sitting in the raw stage into warehouse tables.
    ///
    /// Never fails: every problem is reported through the returned outcome and the log.
    pub fn process(&self, filename: &str) -> ProcessOutcome {
        let start = now();
        self.log(
            &LogRecord::new(OperationKind::Process, LogStatus::Started)
                .file(filename)
                .source(Stage::Raw)
                .started_at(start),
        );
        self.say(Severity::Info, &format!("Started processing {filename}"));

        let finish = match catch_unwind(AssertUnwindSafe(|| self.run(filename))) {
            Ok(Ok(finish)) => finish,
            Ok(Err(e)) => self.recover(filename, &format!("Error in process workflow: {e}")),
            Err(payload) => self.recover(
                filename,
                &format!("Error in process workflow: {}", panic_message(payload.as_ref())),
            ),
        };

        let outcome = finish.outcome;
        let mut record = LogRecord::new(
            OperationKind::Process,
            if outcome.success { LogStatus::Success } else { LogStatus::Failed },
        )
        .file(filename)
        .source(Stage::Raw)
        .started_at(start)
        .ended_at(now());
        if let Some(target) = finish.target {
            record = record.target(target);
        }
        record = if outcome.success {
            record
                .rows(outcome.rows as u64)
                .table(outcome.tables.join(", "))
        } else {
            record.error(outcome.message.clone())
        };
        self.log(&record);

        self.enter(
            filename,
            if outcome.success { PipelineState::Done } else { PipelineState::Failed },
        );
        outcome
    }

    fn run(&self, filename: &str) -> ExtractResult<Finish> {
        self.enter(filename, PipelineState::Raw);
        if let Err(e) = validate_filename(filename) {
            self.say(Severity::Error, &format!("Failed to process {filename}: {e}"));
            return Ok(Finish {
                outcome: ProcessOutcome::failed(e.to_string(), None),
                target: None,
            });
        }
        if !self.stages.contains(Stage::Raw, filename)? {
            let e = ExtractError::NotFound {
                stage: Stage::Raw.name().to_string(),
                filename: filename.to_string(),
            };
            self.say(Severity::Error, &format!("Failed to process {filename}: {e}"));
            return Ok(Finish {
                outcome: ProcessOutcome::failed(e.to_string(), None),
                target: None,
            });
        }

        self.enter(filename, PipelineState::MovingToProcessing);
        self.say(Severity::Info, &format!("Moving {filename} to processing stage..."));
        if let Err(e) = self.stages.move_file(filename, Stage::Raw, Stage::Processing) {
            self.say(Severity::Error, &format!("Failed to move {filename}: {e}"));
            return Ok(Finish {
                outcome: ProcessOutcome::failed(
                    format!("Failed to move file to processing stage: {e}"),
                    Some(Stage::Raw),
                ),
                target: Some(Stage::Processing),
            });
        }
        self.say(Severity::Info, &format!("Moved {filename} to processing stage"));

        self.enter(filename, PipelineState::Downloading);
        self.say(Severity::Info, &format!("Downloading {filename} from processing stage..."));
        let bytes = match self.stages.download(Stage::Processing, filename) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.say(Severity::Error, &format!("Failed to download {filename}: {e}"));
                let final_stage = self.route_to_error(filename);
                return Ok(Finish {
                    outcome: ProcessOutcome::failed(
                        format!("Error downloading file from processing stage: {e}"),
                        final_stage,
                    ),
                    target: Some(Stage::Error),
                });
            }
        };
        self.say(Severity::Info, &format!("Downloaded {filename} successfully"));

        self.enter(filename, PipelineState::Converting);
        self.say(
            Severity::Info,
            &format!("Processing {filename} as {} file...", extension_of(filename)),
        );
        match self.convert_guarded(filename, &bytes) {
            Ok(report) => {
                self.enter(filename, PipelineState::MovingToCompleted);
                self.say(Severity::Info, &format!("Moving {filename} to completed stage..."));
                let final_stage = if self.settle(filename, Stage::Processing, Stage::Completed) {
                    Stage::Completed
                } else {
                    Stage::Processing
                };
                self.say(
                    Severity::Info,
                    &format!(
                        "Successfully processed {filename} -> table {}",
                        report.tables.join(", ")
                    ),
                );
                Ok(Finish {
                    outcome: ProcessOutcome {
                        success: true,
                        message: report.message,
                        tables: report.tables,
                        rows: report.rows,
                        final_stage: Some(final_stage),
                    },
                    target: Some(Stage::Completed),
                })
            }
            Err(e) => {
                let message = e.to_string();
                self.say(Severity::Warning, &format!("Failed to process {filename}: {message}"));
                let final_stage = self.route_to_error(filename);
                Ok(Finish {
                    outcome: ProcessOutcome::failed(message, final_stage),
                    target: Some(Stage::Error),
                })
            }
        }
    }

    /// Run the converter, turning a panic into an error.
    fn convert_guarded(&self, filename: &str, bytes: &[u8]) -> ExtractResult<ConversionReport> {
        catch_unwind(AssertUnwindSafe(|| self.converter.convert(filename, bytes))).unwrap_or_else(
            |payload| {
                Err(ExtractError::Internal {
                    message: format!("converter panicked: {}", panic_message(payload.as_ref())),
                })
            },
        )
    }

    fn route_to_error(&self, filename: &str) -> Option<Stage> {
        self.enter(filename, PipelineState::MovingToError);
        self.say(Severity::Info, &format!("Moving {filename} to error stage..."));
        if self.settle(filename, Stage::Processing, Stage::Error) {
            Some(Stage::Error)
        } else {
            Some(Stage::Processing)
        }
    }

    /// Best-effort move; failures are reported, not raised.
    fn settle(&self, filename: &str, from: Stage, to: Stage) -> bool {
        match self.stages.move_file(filename, from, to) {
            Ok(_) => true,
            Err(e) => {
                self.say(
                    Severity::Warning,
                    &format!("Could not move {filename} from {from} to {to}: {e}"),
                );
                false
            }
        }
    }

    /// Something escaped the normal flow: try PROCESSING -> ERROR, then RAW -> ERROR.
    fn recover(&self, filename: &str, message: &str) -> Finish {
        self.say(Severity::Critical, &format!("Error in workflow for {filename}: {message}"));
        self.enter(filename, PipelineState::MovingToError);

        let final_stage = [Stage::Processing, Stage::Raw].into_iter().find_map(|from| {
            let moved = catch_unwind(AssertUnwindSafe(|| {
                self.stages.move_file(filename, from, Stage::Error)
            }));
            matches!(moved, Ok(Ok(_))).then_some(Stage::Error)
        });
        if final_stage.is_none() {
            self.say(Severity::Critical, &format!("Could not route {filename} to error stage"));
        }

        Finish {
            outcome: ProcessOutcome::failed(message, final_stage),
            target: Some(Stage::Error),
        }
    }

    /// Upload one file to the raw stage, logged as `UPLOAD`.
    pub fn upload(&self, filename: &str, bytes: &[u8]) -> ExtractResult<String> {
        let start = now();
        let result = self.stages.upload(Stage::Raw, filename, bytes);
        let record = LogRecord::new(
            OperationKind::Upload,
            if result.is_ok() { LogStatus::Success } else { LogStatus::Failed },
        )
        .file(filename)
        .target(Stage::Raw)
        .started_at(start)
        .ended_at(now());

        match result {
            Ok(receipt) => {
                self.log(&record);
                self.say(Severity::Info, &format!("Uploaded {filename} to {}", Stage::Raw));
                Ok(receipt.message)
            }
            Err(e) => {
                self.log(&record.error(format!("Error uploading file: {e}")));
                self.say(Severity::Error, &format!("Failed to upload {filename}: {e}"));
                Err(e)
            }
        }
    }

    /// Delete one file from `stage`, logged as `DELETE`.
    pub fn delete(&self, stage: Stage, filename: &str) -> ExtractResult<String> {
        let start = now();
        let result = self.stages.delete(stage, filename);
        let record = LogRecord::new(
            OperationKind::Delete,
            if result.is_ok() { LogStatus::Success } else { LogStatus::Failed },
        )
        .file(filename)
        .source(stage)
        .started_at(start)
        .ended_at(now());

        match result {
            Ok(message) => {
                self.log(&record);
                self.say(Severity::Info, &format!("Deleted file {filename} from {stage}"));
                Ok(message)
            }
            Err(e) => {
                self.log(&record.error(e.to_string()));
                self.say(Severity::Error, &format!("Failed to delete {filename}: {e}"));
                Err(e)
            }
        }
    }

    /// Move a file between stages by hand (e.g. back to RAW for a retry), logged as `MOVE`.
    pub fn move_file(&self, filename: &str, from: Stage, to: Stage) -> ExtractResult<String> {
        let start = now();
        let result = self.stages.move_file(filename, from, to);
        let record = LogRecord::new(
            OperationKind::Move,
            if result.is_ok() { LogStatus::Success } else { LogStatus::Failed },
        )
        .file(filename)
        .source(from)
        .target(to)
        .started_at(start)
        .ended_at(now());

        match result {
            Ok(message) => {
                self.log(&record);
                self.say(Severity::Info, &message);
                Ok(message)
            }
            Err(e) => {
                self.log(&record.error(e.to_string()));
                self.say(Severity::Error, &format!("Failed to move {filename}: {e}"));
                Err(e)
            }
        }
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_readable() {
        let payload = catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom 1");
        let payload = catch_unwind(|| std::panic::panic_any(7u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
