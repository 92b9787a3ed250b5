use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use crate::connection::{ConnectionExt, Row};
use crate::error::{ExtractError, ExtractResult};
use crate::stage::Stage;
use crate::types::Value;

use super::{AuditLog, LogStatus, OperationKind, LOG_TABLE};

pub const DEFAULT_LOG_LIMIT: usize = 100;
pub const MIN_LOG_LIMIT: usize = 10;
pub const MAX_LOG_LIMIT: usize = 500;

const EXPORT_HEADERS: [&str; 15] = [
    "Log ID",
    "Operation",
    "File Name",
    "User",
    "Role",
    "Source Stage",
    "Target Stage",
    "Status",
    "Start Time",
    "End Time",
    "Duration (s)",
    "Error Message",
    "Rows Processed",
    "Table Name",
    "Session ID",
];

/// Filters for [`AuditLog::query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub operation: Option<OperationKind>,
    pub status: Option<LogStatus>,
    /// Clamped to `10..=500`.
    pub limit: usize,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            operation: None,
            status: None,
            limit: DEFAULT_LOG_LIMIT,
        }
    }
}

impl LogQuery {
    pub fn operation(mut self, operation: OperationKind) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn status(mut self, status: LogStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(MIN_LOG_LIMIT, MAX_LOG_LIMIT)
    }

    /// Newest rows first.
    pub fn statement(&self) -> String {
        let mut filters = Vec::new();
        if let Some(op) = self.operation {
            filters.push(format!("OPERATION_NAME = '{op}'"));
        }
        if let Some(status) = self.status {
            filters.push(format!("STATUS = '{status}'"));
        }
        let filter = if filters.is_empty() {
            "1=1".to_string()
        } else {
            filters.join(" AND ")
        };
        format!(
            "SELECT LOG_ID, OPERATION_NAME, FILE_NAME, USER_NAME, ROLE_NAME, SOURCE_STAGE, \
TARGET_STAGE, STATUS, START_TIME, END_TIME, DURATION_SECONDS, ERROR_MESSAGE, ROWS_PROCESSED, \
TABLE_NAME, SESSION_ID FROM {LOG_TABLE} WHERE {filter} ORDER BY START_TIME DESC LIMIT {}",
            self.effective_limit()
        )
    }
}

/// A row read back from the log table. Serializes with human-readable column names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationLogEntry {
    #[serde(rename = "Log ID")]
    pub log_id: Option<i64>,
    #[serde(rename = "Operation")]
    pub operation: String,
    #[serde(rename = "File Name")]
    pub file_name: Option<String>,
    #[serde(rename = "User")]
    pub user_name: Option<String>,
    #[serde(rename = "Role")]
    pub role_name: Option<String>,
    #[serde(rename = "Source Stage")]
    pub source_stage: Option<Stage>,
    #[serde(rename = "Target Stage")]
    pub target_stage: Option<Stage>,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Start Time")]
    pub start_time: Option<NaiveDateTime>,
    #[serde(rename = "End Time")]
    pub end_time: Option<NaiveDateTime>,
    #[serde(rename = "Duration (s)")]
    pub duration_seconds: Option<f64>,
    #[serde(rename = "Error Message")]
    pub error_message: Option<String>,
    #[serde(rename = "Rows Processed")]
    pub rows_processed: Option<i64>,
    #[serde(rename = "Table Name")]
    pub table_name: Option<String>,
    #[serde(rename = "Session ID")]
    pub session_id: Option<String>,
}

impl OperationLogEntry {
    /// Decode a row in the column order of [`LogQuery::statement`].
    pub fn from_row(row: &Row) -> Self {
        let text = |idx: usize| row.get(idx).and_then(Value::as_text);
        Self {
            log_id: row.get(0).and_then(Value::as_i64),
            operation: text(1).unwrap_or_default(),
            file_name: text(2),
            user_name: text(3),
            role_name: text(4),
            source_stage: text(5).as_deref().and_then(Stage::from_name),
            target_stage: text(6).as_deref().and_then(Stage::from_name),
            status: text(7).unwrap_or_default(),
            start_time: row.get(8).and_then(timestamp),
            end_time: row.get(9).and_then(timestamp),
            duration_seconds: row.get(10).and_then(Value::as_f64),
            error_message: text(11),
            rows_processed: row.get(12).and_then(Value::as_i64),
            table_name: text(13),
            session_id: text(14),
        }
    }

    pub fn status(&self) -> Option<LogStatus> {
        self.status.parse().ok()
    }

    fn matches(&self, needle: &str) -> bool {
        let fields = [
            self.log_id.map(|id| id.to_string()),
            Some(self.operation.clone()),
            self.file_name.clone(),
            self.user_name.clone(),
            self.role_name.clone(),
            self.source_stage.map(|s| s.name().to_string()),
            self.target_stage.map(|s| s.name().to_string()),
            Some(self.status.clone()),
            self.start_time.map(|t| t.to_string()),
            self.end_time.map(|t| t.to_string()),
            self.error_message.clone(),
            self.table_name.clone(),
            self.session_id.clone(),
        ];
        fields
            .iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

fn timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::Utf8(text) => NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok(),
        _ => None,
    }
}

/// Aggregate figures over a set of log rows.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LogSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Mean over rows that have a duration; `0.0` when none do.
    pub average_duration_secs: f64,
}

impl LogSummary {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a OperationLogEntry>) -> Self {
        let mut summary = LogSummary::default();
        let (mut duration_sum, mut durations) = (0.0, 0usize);
        for entry in entries {
            summary.total += 1;
            match entry.status() {
                Some(LogStatus::Success) => summary.succeeded += 1,
                Some(LogStatus::Failed) => summary.failed += 1,
                _ => {}
            }
            if let Some(d) = entry.duration_seconds {
                duration_sum += d;
                durations += 1;
            }
        }
        if durations > 0 {
            summary.average_duration_secs = duration_sum / durations as f64;
        }
        summary
    }
}

impl AuditLog {
    pub fn query(&self, query: &LogQuery) -> ExtractResult<Vec<OperationLogEntry>> {
        let rows = self.conn.query(&query.statement(), &[])?;
        Ok(rows.iter().map(OperationLogEntry::from_row).collect())
    }

    /// Entries with any field containing `term`, ignoring case. An empty term keeps all.
    pub fn search<'a>(entries: &'a [OperationLogEntry], term: &str) -> Vec<&'a OperationLogEntry> {
        let needle = term.trim().to_lowercase();
        entries.iter().filter(|e| e.matches(&needle)).collect()
    }

    pub fn summarize<'a>(entries: impl IntoIterator<Item = &'a OperationLogEntry>) -> LogSummary {
        LogSummary::from_entries(entries)
    }

    /// CSV with a header row, even when there are no entries.
    pub fn export_csv<'a>(
        entries: impl IntoIterator<Item = &'a OperationLogEntry>,
    ) -> ExtractResult<Vec<u8>> {
        let mut entries = entries.into_iter().peekable();
        let mut wtr = csv::Writer::from_writer(Vec::new());
        if entries.peek().is_none() {
            wtr.write_record(EXPORT_HEADERS)?;
        }
        for entry in entries {
            wtr.serialize(entry)?;
        }
        wtr.into_inner().map_err(|e| ExtractError::Io(e.into_error()))
    }

    /// Remove every log row.
    pub fn clear_all(&self) -> ExtractResult<()> {
        self.conn.query(&format!("TRUNCATE TABLE {LOG_TABLE}"), &[])?;
        info!(table = LOG_TABLE, "operation log cleared");
        Ok(())
    }

    /// Delete rows that started more than `days` ago (1..=365). Returns the deleted count when
    /// the warehouse reports one.
    pub fn delete_older_than(&self, days: u32) -> ExtractResult<Option<u64>> {
        if !(1..=365).contains(&days) {
            return Err(ExtractError::invalid(format!(
                "retention must be between 1 and 365 days, got {days}"
            )));
        }
        let statement = format!(
            "DELETE FROM {LOG_TABLE} WHERE START_TIME < DATEADD(day, -{days}, CURRENT_TIMESTAMP())"
        );
        let deleted = self
            .conn
            .query_one(&statement, &[])?
            .and_then(|row| row.first().and_then(Value::as_i64))
            .and_then(|n| u64::try_from(n).ok());
        info!(table = LOG_TABLE, days, deleted = ?deleted, "old log rows deleted");
        Ok(deleted)
    }
}
