//! Sequential bulk loops over the single-file operations.

use crate::stage::Stage;

use super::{ProcessingPipeline, Progress};

/// A file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Per-file result of a bulk run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub filename: String,
    pub success: bool,
    pub message: String,
}

/// Results of a bulk run, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    fn push(&mut self, filename: &str, success: bool, message: String) {
        self.entries.push(BatchEntry {
            filename: filename.to_string(),
            success,
            message,
        });
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.success).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.entries.iter().all(|e| e.success)
    }
}

impl ProcessingPipeline {
    fn report_progress(&self, index: usize, total: usize, filename: &str) {
        self.observer.on_progress(&Progress {
            index: index + 1,
            total,
            filename: filename.to_string(),
        });
    }

    /// Process files one after another; a failure never stops the batch.
    pub fn process_all<S: AsRef<str>>(&self, filenames: &[S]) -> BatchReport {
        let mut report = BatchReport::default();
        for (idx, filename) in filenames.iter().enumerate() {
            let filename = filename.as_ref();
            self.report_progress(idx, filenames.len(), filename);
            let outcome = self.process(filename);
            report.push(filename, outcome.success, outcome.message);
        }
        report
    }

    /// Upload files to the raw stage one after another.
    pub fn upload_all(&self, files: &[UploadFile]) -> BatchReport {
        let mut report = BatchReport::default();
        for (idx, file) in files.iter().enumerate() {
            self.report_progress(idx, files.len(), &file.name);
            match self.upload(&file.name, &file.bytes) {
                Ok(message) => report.push(&file.name, true, message),
                Err(e) => report.push(&file.name, false, format!("Error uploading file: {e}")),
            }
        }
        report
    }

    /// Delete files from `stage` one after another.
    pub fn delete_files<S: AsRef<str>>(&self, stage: Stage, filenames: &[S]) -> BatchReport {
        let mut report = BatchReport::default();
        for (idx, filename) in filenames.iter().enumerate() {
            let filename = filename.as_ref();
            self.report_progress(idx, filenames.len(), filename);
            match self.delete(stage, filename) {
                Ok(message) => report.push(filename, true, message),
                Err(e) => report.push(filename, false, format!("Error deleting file: {e}")),
            }
        }
        report
    }
}
