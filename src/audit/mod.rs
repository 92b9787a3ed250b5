//! Append-only operation log in `LOGS.FILE_OPERATION_LOG`.
//!
//! Every upload, processing run, move and delete writes rows here. Writing is best effort:
//! [`AuditLog::record`] reports failure as `false` and never disturbs the operation being
//! logged.

mod query;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionExt};
use crate::error::{ExtractError, ExtractResult};
use crate::sql::{literal_or_null, render_value};
use crate::stage::Stage;
use crate::types::Value;

pub use query::{LogQuery, LogSummary, OperationLogEntry, DEFAULT_LOG_LIMIT, MAX_LOG_LIMIT, MIN_LOG_LIMIT};

/// Fully qualified log table.
pub const LOG_TABLE: &str = "LOGS.FILE_OPERATION_LOG";
/// User and role recorded when the actor cannot be resolved.
pub const UNKNOWN_ACTOR: &str = "UNKNOWN";

const ACTOR_QUERY: &str = "SELECT CURRENT_USER(), CURRENT_ROLE(), CURRENT_SESSION()";

/// Logged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Upload,
    Process,
    Move,
    Delete,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Upload => "UPLOAD",
            OperationKind::Process => "PROCESS",
            OperationKind::Move => "MOVE",
            OperationKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UPLOAD" => Ok(OperationKind::Upload),
            "PROCESS" => Ok(OperationKind::Process),
            "MOVE" => Ok(OperationKind::Move),
            "DELETE" => Ok(OperationKind::Delete),
            other => Err(ExtractError::invalid(format!("unknown operation {other:?}"))),
        }
    }
}

/// Status of a log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogStatus {
    Started,
    InProgress,
    Success,
    Failed,
}

impl LogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LogStatus::Started => "STARTED",
            LogStatus::InProgress => "IN_PROGRESS",
            LogStatus::Success => "SUCCESS",
            LogStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogStatus {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STARTED" => Ok(LogStatus::Started),
            "IN_PROGRESS" => Ok(LogStatus::InProgress),
            "SUCCESS" => Ok(LogStatus::Success),
            "FAILED" => Ok(LogStatus::Failed),
            other => Err(ExtractError::invalid(format!("unknown status {other:?}"))),
        }
    }
}

/// One row to append.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub operation: OperationKind,
    pub status: LogStatus,
    pub file_name: Option<String>,
    pub source_stage: Option<Stage>,
    pub target_stage: Option<Stage>,
    /// Defaults to the time of writing.
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub error_message: Option<String>,
    pub rows_processed: Option<u64>,
    pub table_name: Option<String>,
}

impl LogRecord {
    pub fn new(operation: OperationKind, status: LogStatus) -> Self {
        Self {
            operation,
            status,
            file_name: None,
            source_stage: None,
            target_stage: None,
            start_time: None,
            end_time: None,
            error_message: None,
            rows_processed: None,
            table_name: None,
        }
    }

    pub fn file(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn source(mut self, stage: Stage) -> Self {
        self.source_stage = Some(stage);
        self
    }

    pub fn target(mut self, stage: Stage) -> Self {
        self.target_stage = Some(stage);
        self
    }

    pub fn started_at(mut self, at: NaiveDateTime) -> Self {
        self.start_time = Some(at);
        self
    }

    pub fn ended_at(mut self, at: NaiveDateTime) -> Self {
        self.end_time = Some(at);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn rows(mut self, rows: u64) -> Self {
        self.rows_processed = Some(rows);
        self
    }

    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    /// Seconds between start and end, when both are known.
    pub fn duration_seconds(&self) -> Option<f64> {
        let (start, end) = (self.start_time?, self.end_time?);
        Some((end - start).num_milliseconds() as f64 / 1000.0)
    }
}

/// Identity the warehouse reports for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user: String,
    pub role: String,
    pub session: Option<String>,
}

impl Actor {
    pub fn unknown() -> Self {
        Self {
            user: UNKNOWN_ACTOR.to_string(),
            role: UNKNOWN_ACTOR.to_string(),
            session: None,
        }
    }
}

/// Writer and reader for the operation log.
#[derive(Clone)]
pub struct AuditLog {
    conn: Arc<dyn Connection>,
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog")
            .field("table", &LOG_TABLE)
            .field("transport", &self.conn.transport())
            .finish()
    }
}

impl AuditLog {
    /// Log writing to [`LOG_TABLE`] over `conn`.
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }

    /// Append a row; `false` if it could not be written.
    pub fn record(&self, record: &LogRecord) -> bool {
        match self.try_record(record) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    operation = %record.operation,
                    status = %record.status,
                    file = record.file_name.as_deref().unwrap_or(""),
                    error = %e,
                    "failed to log operation"
                );
                false
            }
        }
    }

    /// Append a row, returning the write error to the caller.
    pub fn try_record(&self, record: &LogRecord) -> ExtractResult<()> {
        let actor = self.resolve_actor();
        let statement = insert_statement(record, &actor, Local::now().naive_local());
        self.conn.query(&statement, &[])?;
        debug!(operation = %record.operation, status = %record.status, "operation logged");
        Ok(())
    }

    /// Current user, role and session; [`Actor::unknown`] if the lookup fails.
    pub fn resolve_actor(&self) -> Actor {
        let row = match self.conn.query_one(ACTOR_QUERY, &[]) {
            Ok(Some(row)) => row,
            Ok(None) => return Actor::unknown(),
            Err(e) => {
                debug!(error = %e, "could not resolve current user");
                return Actor::unknown();
            }
        };
        let text = |idx: usize| row.get(idx).and_then(Value::as_text);
        Actor {
            user: text(0).unwrap_or_else(|| UNKNOWN_ACTOR.to_string()),
            role: text(1).unwrap_or_else(|| UNKNOWN_ACTOR.to_string()),
            session: text(2),
        }
    }

    /// Create the log table if missing.
    pub fn ensure_table(&self) -> ExtractResult<()> {
        self.conn.query(&create_table_statement(), &[])?;
        Ok(())
    }
}

pub fn create_table_statement() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {LOG_TABLE} (\
LOG_ID NUMBER AUTOINCREMENT PRIMARY KEY, \
OPERATION_NAME VARCHAR, FILE_NAME VARCHAR, USER_NAME VARCHAR, ROLE_NAME VARCHAR, \
SOURCE_STAGE VARCHAR, TARGET_STAGE VARCHAR, STATUS VARCHAR, \
START_TIME TIMESTAMP_NTZ, END_TIME TIMESTAMP_NTZ, DURATION_SECONDS FLOAT, \
ERROR_MESSAGE VARCHAR, ROWS_PROCESSED NUMBER, TABLE_NAME VARCHAR, SESSION_ID VARCHAR)"
    )
}

/// `INSERT` for one row with every value inlined as an escaped literal.
pub fn insert_statement(record: &LogRecord, actor: &Actor, now: NaiveDateTime) -> String {
    let start = record.start_time.unwrap_or(now);
    let timestamp = |ts: Option<NaiveDateTime>| {
        ts.map_or_else(|| "NULL".to_string(), |ts| render_value(&Value::Timestamp(ts)))
    };
    let duration = record
        .duration_seconds()
        .map_or_else(|| "NULL".to_string(), |d| render_value(&Value::Float64(d)));
    let rows = record
        .rows_processed
        .map_or_else(|| "NULL".to_string(), |r| r.to_string());

    let values = [
        literal_or_null(Some(record.operation.as_str())),
        literal_or_null(record.file_name.as_deref()),
        literal_or_null(Some(actor.user.as_str())),
        literal_or_null(Some(actor.role.as_str())),
        literal_or_null(record.source_stage.map(Stage::name)),
        literal_or_null(record.target_stage.map(Stage::name)),
        literal_or_null(Some(record.status.as_str())),
        timestamp(Some(start)),
        timestamp(record.end_time),
        duration,
        literal_or_null(record.error_message.as_deref()),
        rows,
        literal_or_null(record.table_name.as_deref()),
        literal_or_null(actor.session.as_deref()),
    ];

    format!(
        "INSERT INTO {LOG_TABLE} (OPERATION_NAME, FILE_NAME, USER_NAME, ROLE_NAME, SOURCE_STAGE, \
TARGET_STAGE, STATUS, START_TIME, END_TIME, DURATION_SECONDS, ERROR_MESSAGE, ROWS_PROCESSED, \
TABLE_NAME, SESSION_ID) VALUES ({})",
        values.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::RecordingConnection;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn insert_escapes_and_nulls() {
        let record = LogRecord::new(OperationKind::Process, LogStatus::Failed)
            .file("o'neil.csv")
            .source(Stage::Processing)
            .target(Stage::Error)
            .started_at(at(10, 0, 0))
            .ended_at(at(10, 0, 3))
            .error("bad 'quote'");
        let sql = insert_statement(&record, &Actor::unknown(), at(11, 0, 0));

        assert!(sql.starts_with("INSERT INTO LOGS.FILE_OPERATION_LOG"));
        assert!(sql.contains("'PROCESS', 'o''neil.csv', 'UNKNOWN', 'UNKNOWN', 'PROCESSING_STAGE', 'ERROR_STAGE', 'FAILED'"));
        assert!(sql.contains("'2024-06-01 10:00:03.000000'::TIMESTAMP_NTZ, 3.0, 'bad ''quote''', NULL, NULL, NULL)"));
    }

    #[test]
    fn start_defaults_to_now_and_duration_needs_both_ends() {
        let record = LogRecord::new(OperationKind::Upload, LogStatus::Started).ended_at(at(9, 0, 0));
        assert_eq!(record.duration_seconds(), None);
        let sql = insert_statement(&record, &Actor::unknown(), at(8, 59, 0));
        assert!(sql.contains("'2024-06-01 08:59:00.000000'::TIMESTAMP_NTZ, '2024-06-01 09:00:00.000000'::TIMESTAMP_NTZ, NULL"));
    }

    #[test]
    fn actor_falls_back_to_unknown() {
        let conn = RecordingConnection::new();
        conn.fail_on("CURRENT_USER", "no session");
        let log = AuditLog::new(Arc::new(conn.clone()));
        assert_eq!(log.resolve_actor(), Actor::unknown());

        conn.clear_failures();
        conn.respond_to(
            "CURRENT_USER",
            vec![vec![Value::from("ADA"), Value::from("LOADER"), Value::Int64(42)]],
        );
        let actor = log.resolve_actor();
        assert_eq!(actor.user, "ADA");
        assert_eq!(actor.session.as_deref(), Some("42"));
    }

    #[test]
    fn write_failure_is_reported_not_raised() {
        let conn = RecordingConnection::new();
        conn.fail_on("INSERT INTO LOGS.FILE_OPERATION_LOG", "table does not exist");
        let log = AuditLog::new(Arc::new(conn));
        assert!(!log.record(&LogRecord::new(OperationKind::Upload, LogStatus::Started)));
    }

    #[test]
    fn kinds_and_statuses_parse() {
        assert_eq!("process".parse::<OperationKind>().unwrap(), OperationKind::Process);
        assert_eq!("in_progress".parse::<LogStatus>().unwrap(), LogStatus::InProgress);
        assert!("ARCHIVE".parse::<OperationKind>().is_err());
    }
}
