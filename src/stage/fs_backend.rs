use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{ExtractError, ExtractResult};

use super::{Stage, StageBackend, StagedFile};

/// Stage backend keeping one local directory per stage below `root`.
///
/// Listings report names as `<stage dir>/<file>`, the way warehouse stages prefix them.
/// Patterns are the exact-basename expressions built by [`crate::sql::basename_pattern`];
/// anything else is compared literally against the basename.
#[derive(Debug, Clone)]
pub struct FsStageBackend {
    root: PathBuf,
}

impl FsStageBackend {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.root.join(stage_dir_name(stage))
    }
}

fn stage_dir_name(stage: Stage) -> String {
    stage.name().to_ascii_lowercase()
}

impl StageBackend for FsStageBackend {
    fn put(&self, stage: Stage, filename: &str, bytes: &[u8]) -> ExtractResult<()> {
        let dir = self.stage_dir(stage);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(filename), bytes)?;
        Ok(())
    }

    fn get(&self, stage: Stage, filename: &str) -> ExtractResult<Vec<u8>> {
        match fs::read(self.stage_dir(stage).join(filename)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ExtractError::NotFound {
                stage: stage.name().to_string(),
                filename: filename.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, stage: Stage, pattern: Option<&str>) -> ExtractResult<Vec<StagedFile>> {
        let dir = self.stage_dir(stage);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let wanted = pattern.map(literal_basename);
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if wanted.as_deref().is_some_and(|w| w != name) {
                continue;
            }
            files.push(StagedFile {
                stage,
                name: format!("{}/{name}", stage_dir_name(stage)),
                size: meta.len(),
                md5: None,
                last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    fn remove(&self, stage: Stage, filename: &str) -> ExtractResult<()> {
        match fs::remove_file(self.stage_dir(stage).join(filename)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Undo [`crate::sql::basename_pattern`]: drop the optional-prefix group and the escapes.
fn literal_basename(pattern: &str) -> String {
    let body = pattern.strip_prefix("(.*/)?").unwrap_or(pattern);
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::basename_pattern;

    #[test]
    fn put_list_get_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FsStageBackend::new(tmp.path());

        backend.put(Stage::Raw, "a.csv", b"1").unwrap();
        backend.put(Stage::Raw, "b (1).csv", b"22").unwrap();

        let all = backend.list(Stage::Raw, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "raw_stage/a.csv");

        let one = backend
            .list(Stage::Raw, Some(&basename_pattern("b (1).csv")))
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].size, 2);

        assert_eq!(backend.get(Stage::Raw, "a.csv").unwrap(), b"1");
        backend.remove(Stage::Raw, "a.csv").unwrap();
        backend.remove(Stage::Raw, "a.csv").unwrap();
        assert!(backend.get(Stage::Raw, "a.csv").unwrap_err().is_not_found());
    }

    #[test]
    fn missing_stage_lists_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FsStageBackend::new(tmp.path());
        assert!(backend.list(Stage::Error, None).unwrap().is_empty());
    }
}
