use std::fs;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use walkdir::WalkDir;

use crate::connection::{Connection, ConnectionExt};
use crate::error::{ExtractError, ExtractResult};
use crate::sql::{basename_pattern, file_uri, quote_literal};
use crate::types::Value;

use super::{Stage, StageBackend, StagedFile};

/// Stage backend that issues `PUT`/`GET`/`LIST`/`REMOVE` statements over a warehouse
/// connection, staging bytes through a temporary directory.
#[derive(Clone)]
pub struct SqlStageBackend {
    conn: Arc<dyn Connection>,
}

impl SqlStageBackend {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }
}

impl StageBackend for SqlStageBackend {
    fn put(&self, stage: Stage, filename: &str, bytes: &[u8]) -> ExtractResult<()> {
        // PUT keeps the local file name, so the temp file must carry the original name.
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(filename);
        fs::write(&path, bytes)?;

        let statement = format!(
            "PUT {} @{stage} AUTO_COMPRESS=FALSE OVERWRITE=TRUE",
            quote_literal(&file_uri(&path))
        );
        self.conn.query(&statement, &[])?;
        Ok(())
    }

    fn get(&self, stage: Stage, filename: &str) -> ExtractResult<Vec<u8>> {
        let dir = tempfile::tempdir()?;
        let target = format!("{}/", file_uri(dir.path()).trim_end_matches('/'));
        let statement = format!(
            "GET {} {} PATTERN = {}",
            stage_location(stage, filename),
            quote_literal(&target),
            quote_literal(&basename_pattern(filename))
        );
        self.conn.query(&statement, &[])?;

        // GET may recreate the stage's directory structure below the target.
        let downloaded = WalkDir::new(dir.path())
            .into_iter()
            .filter_map(Result::ok)
            .find(|entry| entry.file_type().is_file() && entry.file_name() == filename);
        match downloaded {
            Some(entry) => {
                debug!(stage = %stage, file = filename, path = %entry.path().display(), "file fetched from stage");
                Ok(fs::read(entry.path())?)
            }
            None => Err(ExtractError::NotFound {
                stage: stage.name().to_string(),
                filename: filename.to_string(),
            }),
        }
    }

    fn list(&self, stage: Stage, pattern: Option<&str>) -> ExtractResult<Vec<StagedFile>> {
        let statement = match pattern {
            Some(pattern) => format!("LIST @{stage} PATTERN = {}", quote_literal(pattern)),
            None => format!("LIST @{stage}"),
        };
        let rows = self.conn.query(&statement, &[])?;
        Ok(rows
            .into_iter()
            .filter_map(|row| listed_file(stage, &row))
            .collect())
    }

    fn remove(&self, stage: Stage, filename: &str) -> ExtractResult<()> {
        let statement = format!(
            "REMOVE {} PATTERN = {}",
            stage_location(stage, filename),
            quote_literal(&basename_pattern(filename))
        );
        self.conn.query(&statement, &[])?;
        Ok(())
    }
}

/// Quoted `'@STAGE/file'`. Stage paths match by prefix, so callers pair it with an
/// exact-basename `PATTERN`.
fn stage_location(stage: Stage, filename: &str) -> String {
    quote_literal(&format!("@{stage}/{filename}"))
}

/// `LIST` rows are `(name, size, md5, last_modified)`.
fn listed_file(stage: Stage, row: &[Value]) -> Option<StagedFile> {
    let name = row.first()?.as_text()?;
    Some(StagedFile {
        stage,
        name,
        size: row
            .get(1)
            .and_then(Value::as_i64)
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(0),
        md5: row.get(2).and_then(Value::as_text),
        last_modified: row.get(3).and_then(parse_last_modified),
    })
}

fn parse_last_modified(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Timestamp(ts) => Some(ts.and_utc()),
        Value::Utf8(text) => DateTime::parse_from_rfc2822(text)
            .or_else(|_| DateTime::parse_from_rfc3339(text))
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Cursor, RecordingConnection, Row};

    /// Answers `GET` the way a prefix-matching stage does: every listed sibling sharing the
    /// requested prefix lands in the target directory.
    struct PrefixStage {
        files: Vec<(&'static str, &'static [u8])>,
    }

    struct PrefixCursor {
        files: Vec<(&'static str, &'static [u8])>,
    }

    impl Connection for PrefixStage {
        fn cursor(&self) -> ExtractResult<Box<dyn Cursor>> {
            Ok(Box::new(PrefixCursor {
                files: self.files.clone(),
            }))
        }
    }

    impl Cursor for PrefixCursor {
        fn execute(&mut self, query: &str, _params: &[Value]) -> ExtractResult<()> {
            let literals: Vec<&str> = query.split('\'').collect();
            let target = literals[3].trim_start_matches("file://");
            let dir = std::path::Path::new(target).join("raw_stage");
            fs::create_dir_all(&dir)?;
            for (name, bytes) in &self.files {
                fs::write(dir.join(name), bytes)?;
            }
            Ok(())
        }

        fn fetchone(&mut self) -> ExtractResult<Option<Row>> {
            Ok(None)
        }

        fn fetchall(&mut self) -> ExtractResult<Vec<Row>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn list_reads_rows_and_pattern() {
        let conn = RecordingConnection::new();
        conn.respond_to(
            "LIST @RAW_STAGE",
            vec![vec![
                Value::from("raw_stage/people.csv"),
                Value::Int64(64),
                Value::from("abc123"),
                Value::from("Tue, 7 May 2024 10:00:00 GMT"),
            ]],
        );
        let backend = SqlStageBackend::new(Arc::new(conn.clone()));

        let files = backend.list(Stage::Raw, Some("(.*/)?people\\.csv")).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "raw_stage/people.csv");
        assert_eq!(files[0].size, 64);
        assert!(files[0].last_modified.is_some());
        assert_eq!(
            conn.executed(),
            vec!["LIST @RAW_STAGE PATTERN = '(.*/)?people\\.csv'"]
        );
    }

    #[test]
    fn get_without_downloaded_file_is_not_found() {
        let conn = RecordingConnection::new();
        let backend = SqlStageBackend::new(Arc::new(conn.clone()));

        let err = backend.get(Stage::Processing, "missing.csv").unwrap_err();
        assert!(err.is_not_found());
        let executed = conn.executed();
        assert!(executed[0].starts_with("GET '@PROCESSING_STAGE/missing.csv' 'file://"));
        assert!(executed[0].ends_with("/' PATTERN = '(.*/)?missing\\.csv'"));
    }

    #[test]
    fn put_and_remove_statements() {
        let conn = RecordingConnection::new();
        let backend = SqlStageBackend::new(Arc::new(conn.clone()));

        backend.put(Stage::Raw, "a.csv", b"x,y\n1,2\n").unwrap();
        backend.remove(Stage::Raw, "a.csv").unwrap();

        let executed = conn.executed();
        assert!(executed[0].starts_with("PUT 'file://"));
        assert!(executed[0].ends_with("/a.csv' @RAW_STAGE AUTO_COMPRESS=FALSE OVERWRITE=TRUE"));
        assert_eq!(
            executed[1],
            "REMOVE '@RAW_STAGE/a.csv' PATTERN = '(.*/)?a\\.csv'"
        );
    }

    #[test]
    fn get_returns_the_exact_file_among_prefixed_siblings() {
        let backend = SqlStageBackend::new(Arc::new(PrefixStage {
            files: vec![
                ("a.csv.bak", &b"old"[..]),
                ("a.csv.2024", &b"older"[..]),
                ("a.csv", &b"current"[..]),
            ],
        }));
        assert_eq!(backend.get(Stage::Raw, "a.csv").unwrap(), b"current");

        let backend = SqlStageBackend::new(Arc::new(PrefixStage {
            files: vec![("a.csv.bak", &b"old"[..])],
        }));
        assert!(backend.get(Stage::Raw, "a.csv").unwrap_err().is_not_found());
    }

    #[test]
    fn names_with_spaces_and_parentheses_are_quoted() {
        let conn = RecordingConnection::new();
        let backend = SqlStageBackend::new(Arc::new(conn.clone()));

        assert!(backend.get(Stage::Raw, "q1 sales (final).csv").is_err());
        backend.remove(Stage::Raw, "q1 sales (final).csv").unwrap();

        let executed = conn.executed();
        assert!(executed[0].starts_with("GET '@RAW_STAGE/q1 sales (final).csv' 'file://"));
        assert!(executed[0].ends_with("PATTERN = '(.*/)?q1 sales \\(final\\)\\.csv'"));
        assert_eq!(
            executed[1],
            "REMOVE '@RAW_STAGE/q1 sales (final).csv' PATTERN = '(.*/)?q1 sales \\(final\\)\\.csv'"
        );
    }
}
