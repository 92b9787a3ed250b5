//! Named file stages and the [`StageStore`] façade.
//!
//! Files move through four stages: [`Stage::Raw`] on upload, [`Stage::Processing`] while a
//! conversion runs, then [`Stage::Completed`] or [`Stage::Error`]. A [`StageBackend`] provides
//! the primitive put/get/list/remove; [`StageStore`] layers verification, basename
//! normalization, restriction handling and moves on top.

mod fs_backend;
mod sql_backend;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ExtractError, ExtractResult};

pub use fs_backend::FsStageBackend;
pub use sql_backend::SqlStageBackend;

/// Pipeline stage a file can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "RAW_STAGE")]
    Raw,
    #[serde(rename = "PROCESSING_STAGE")]
    Processing,
    #[serde(rename = "COMPLETED_STAGE")]
    Completed,
    #[serde(rename = "ERROR_STAGE")]
    Error,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Raw, Stage::Processing, Stage::Completed, Stage::Error];

    /// Warehouse name of the stage.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Raw => "RAW_STAGE",
            Stage::Processing => "PROCESSING_STAGE",
            Stage::Completed => "COMPLETED_STAGE",
            Stage::Error => "ERROR_STAGE",
        }
    }

    /// Parse a warehouse stage name (case-insensitive, optional leading `@`).
    pub fn from_name(name: &str) -> Option<Stage> {
        let name = name.trim().trim_start_matches('@');
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A file as listed in a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub stage: Stage,
    /// Basename; any path prefix reported by the backend is stripped.
    pub name: String,
    pub size: u64,
    pub md5: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Primitive stage operations.
///
/// `list` returns names as the backend reports them, possibly with a path prefix.
/// `pattern` is a regular expression over that reported name.
pub trait StageBackend: Send + Sync {
    fn put(&self, stage: Stage, filename: &str, bytes: &[u8]) -> ExtractResult<()>;

    /// Fetch a file; [`ExtractError::NotFound`] when the stage has no such file.
    fn get(&self, stage: Stage, filename: &str) -> ExtractResult<Vec<u8>>;

    fn list(&self, stage: Stage, pattern: Option<&str>) -> ExtractResult<Vec<StagedFile>>;

    fn remove(&self, stage: Stage, filename: &str) -> ExtractResult<()>;
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Basename the stage reports after the upload.
    pub stored_name: String,
    /// `true` when the stage stored the file under a different name.
    pub renamed: bool,
    pub message: String,
}

/// Result of a best-effort removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// The platform refused the removal; the file stays in the stage.
    Restricted(String),
}

impl RemoveOutcome {
    pub fn is_removed(&self) -> bool {
        matches!(self, RemoveOutcome::Removed)
    }
}

/// Reject names that cannot be embedded in stage paths or temp file names.
pub fn validate_filename(filename: &str) -> ExtractResult<()> {
    let bad = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename
            .chars()
            .any(|c| c == '\'' || c == '/' || c == '\\' || c.is_control());
    if bad {
        return Err(ExtractError::invalid(format!("invalid file name {filename:?}")));
    }
    Ok(())
}

/// Strip any path prefix from a reported stage name.
pub fn basename(reported: &str) -> &str {
    reported.rsplit('/').next().unwrap_or(reported)
}

/// Stage operations used by the pipeline and the presentation layer.
#[derive(Clone)]
pub struct StageStore {
    backend: Arc<dyn StageBackend>,
}

impl fmt::Debug for StageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageStore").finish_non_exhaustive()
    }
}

impl StageStore {
    /// Store backed by warehouse stages or local directories.
    pub fn new(backend: Arc<dyn StageBackend>) -> Self {
        Self { backend }
    }

    /// Upload `bytes` as `filename`, overwriting any same-named file.
    ///
    /// The stage is listed afterwards to confirm the stored name. A rename by the platform is
    /// reported with a warning but still counts as success.
    pub fn upload(&self, stage: Stage, filename: &str, bytes: &[u8]) -> ExtractResult<UploadReceipt> {
        validate_filename(filename)?;
        self.backend.put(stage, filename, bytes)?;
        debug!(stage = %stage, file = filename, bytes = bytes.len(), "file written to stage");

        let pattern = crate::sql::basename_pattern(filename);
        let stored_name = match self.backend.list(stage, Some(&pattern)) {
            Ok(listed) => listed
                .first()
                .map(|f| basename(&f.name).to_string())
                .unwrap_or_else(|| filename.to_string()),
            Err(e) => {
                warn!(stage = %stage, file = filename, error = %e, "could not verify upload");
                filename.to_string()
            }
        };

        if stored_name != filename {
            warn!(stage = %stage, requested = filename, stored = %stored_name, "file stored under a different name");
            return Ok(UploadReceipt {
                message: format!("File uploaded to {stage} as {stored_name}"),
                stored_name,
                renamed: true,
            });
        }

        info!(stage = %stage, file = filename, "file uploaded");
        Ok(UploadReceipt {
            message: format!("File {filename} uploaded successfully to {stage}"),
            stored_name,
            renamed: false,
        })
    }

    /// Contents of `filename`; [`ExtractError::NotFound`] if the stage has no file by that exact name.
    pub fn download(&self, stage: Stage, filename: &str) -> ExtractResult<Vec<u8>> {
        validate_filename(filename)?;
        self.backend.get(stage, filename)
    }

    /// Files in `stage`, by basename.
    pub fn list(&self, stage: Stage) -> ExtractResult<Vec<StagedFile>> {
        let mut files = self.backend.list(stage, None)?;
        for file in &mut files {
            let name = basename(&file.name).to_string();
            file.name = name;
            file.stage = stage;
        }
        Ok(files)
    }

    /// Whether `stage` lists a file whose basename is `filename`.
    pub fn contains(&self, stage: Stage, filename: &str) -> ExtractResult<bool> {
        Ok(self.list(stage)?.iter().any(|f| f.name == filename))
    }

    /// Remove a file; platform restrictions are reported, not raised.
    pub fn remove(&self, stage: Stage, filename: &str) -> ExtractResult<RemoveOutcome> {
        validate_filename(filename)?;
        match self.backend.remove(stage, filename) {
            Ok(()) => Ok(RemoveOutcome::Removed),
            Err(e) if e.is_platform_restriction() => {
                info!(stage = %stage, file = filename, reason = %e, "removal restricted; file stays in stage");
                Ok(RemoveOutcome::Restricted(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Copy `filename` from `from` to `to`, then remove the original.
    ///
    /// Not atomic: once the copy exists in `to` the move counts as done, and a failed removal
    /// only leaves a duplicate behind in `from`.
    pub fn move_file(&self, filename: &str, from: Stage, to: Stage) -> ExtractResult<String> {
        let bytes = self.download(from, filename)?;
        self.upload(to, filename, &bytes)?;
        match self.remove(from, filename) {
            Ok(RemoveOutcome::Removed) => {}
            Ok(RemoveOutcome::Restricted(_)) => {
                debug!(file = filename, stage = %from, "source copy kept after move")
            }
            Err(e) => {
                warn!(file = filename, stage = %from, error = %e, "source copy could not be removed after move")
            }
        }
        info!(file = filename, from = %from, to = %to, "file moved");
        Ok(format!("File moved from {from} to {to}"))
    }

    /// User-facing delete.
    pub fn delete(&self, stage: Stage, filename: &str) -> ExtractResult<String> {
        match self.remove(stage, filename)? {
            RemoveOutcome::Removed => Ok(format!("File {filename} deleted successfully from {stage}")),
            RemoveOutcome::Restricted(_) => Ok(format!(
                "Note: File '{filename}' marked as processed. File remains in {stage} due to platform security restrictions. Remove it manually if needed."
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_parse_back() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_name(stage.name()), Some(stage));
        }
        assert_eq!(Stage::from_name("@raw_stage"), Some(Stage::Raw));
        assert_eq!(Stage::from_name("ARCHIVE"), None);
    }

    #[test]
    fn filenames_with_path_or_quote_are_rejected() {
        assert!(validate_filename("report.csv").is_ok());
        assert!(validate_filename("q1 sales (final).xlsx").is_ok());
        for bad in ["", ".", "..", "a/b.csv", "a\\b.csv", "o'neil.csv", "tab\there.csv"] {
            assert!(validate_filename(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn basename_strips_prefix() {
        assert_eq!(basename("raw_stage/data.csv"), "data.csv");
        assert_eq!(basename("db/schema/raw_stage/data.csv"), "data.csv");
        assert_eq!(basename("data.csv"), "data.csv");
    }
}
