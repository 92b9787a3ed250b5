use std::sync::Arc;

use chrono::NaiveDate;
use stage_extract::audit::{AuditLog, LogQuery, LogRecord, LogStatus, OperationKind};
use stage_extract::connection::RecordingConnection;
use stage_extract::stage::Stage;
use stage_extract::types::Value;

fn log_row(id: i64, op: &str, file: &str, status: &str, error: Option<&str>) -> Vec<Value> {
    vec![
        Value::Int64(id),
        Value::from(op),
        Value::from(file),
        Value::from("LOADER"),
        Value::from("SYSADMIN"),
        Value::from("RAW_STAGE"),
        Value::from("ERROR_STAGE"),
        Value::from(status),
        Value::from("2024-06-01 10:00:00.000"),
        Value::from("2024-06-01 10:00:02.500"),
        Value::Float64(2.5),
        error.map_or(Value::Null, Value::from),
        Value::Null,
        Value::Null,
        Value::from("4711"),
    ]
}

#[test]
fn records_carry_the_resolved_actor() {
    let conn = RecordingConnection::new();
    conn.respond_to(
        "CURRENT_USER()",
        vec![vec![Value::from("LOADER"), Value::from("SYSADMIN"), Value::from("4711")]],
    );
    let audit = AuditLog::new(Arc::new(conn.clone()));

    let start = NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    let record = LogRecord::new(OperationKind::Process, LogStatus::Failed)
        .file("o'brien.csv")
        .source(Stage::Raw)
        .target(Stage::Error)
        .started_at(start)
        .ended_at(start + chrono::Duration::milliseconds(2500))
        .error("Unsupported file type: .zip");
    assert!(audit.record(&record));

    let inserts = conn.executed_matching("INSERT INTO LOGS.FILE_OPERATION_LOG");
    assert_eq!(inserts.len(), 1);
    let sql = &inserts[0];
    assert!(sql.contains("'o''brien.csv'"));
    assert!(sql.contains("'LOADER', 'SYSADMIN'"));
    assert!(sql.contains("2.5"));
    assert!(sql.ends_with("'4711')"));
}

#[test]
fn failed_insert_is_swallowed() {
    let conn = RecordingConnection::new();
    conn.fail_on("INSERT INTO LOGS", "table does not exist");
    let audit = AuditLog::new(Arc::new(conn.clone()));

    let ok = audit.record(&LogRecord::new(OperationKind::Upload, LogStatus::Success).file("a.csv"));
    assert!(!ok);
    assert!(audit
        .try_record(&LogRecord::new(OperationKind::Upload, LogStatus::Success))
        .is_err());
}

#[test]
fn viewer_query_search_and_export() {
    let conn = RecordingConnection::new();
    conn.respond_to(
        "FROM LOGS.FILE_OPERATION_LOG WHERE",
        vec![
            log_row(2, "PROCESS", "bundle.zip", "FAILED", Some("Unsupported file type: .zip")),
            log_row(1, "PROCESS", "people.csv", "SUCCESS", None),
        ],
    );
    let audit = AuditLog::new(Arc::new(conn.clone()));

    let query = LogQuery::default()
        .operation(OperationKind::Process)
        .limit(1000);
    let entries = audit.query(&query).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].status(), Some(LogStatus::Failed));
    assert_eq!(entries[0].duration_seconds, Some(2.5));
    assert_eq!(entries[0].source_stage, Some(Stage::Raw));
    assert_eq!(entries[0].target_stage, Some(Stage::Error));

    let executed = conn.executed_matching("SELECT LOG_ID");
    assert!(executed[0].contains("WHERE OPERATION_NAME = 'PROCESS'"));
    assert!(executed[0].ends_with("ORDER BY START_TIME DESC LIMIT 500"));

    let hits = AuditLog::search(&entries, "UNSUPPORTED");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].file_name.as_deref(), Some("bundle.zip"));

    let summary = AuditLog::summarize(&entries);
    assert_eq!((summary.total, summary.succeeded, summary.failed), (2, 1, 1));

    let csv = String::from_utf8(AuditLog::export_csv(&entries).unwrap()).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("Log ID,Operation,File Name,User"));
    assert_eq!(lines.count(), 2);
}

#[test]
fn retention_is_bounded() {
    let conn = RecordingConnection::new();
    conn.respond_to("DELETE FROM LOGS.FILE_OPERATION_LOG", vec![vec![Value::Int64(12)]]);
    let audit = AuditLog::new(Arc::new(conn.clone()));

    assert_eq!(audit.delete_older_than(30).unwrap(), Some(12));
    assert!(audit.delete_older_than(0).is_err());
    assert!(audit.delete_older_than(366).is_err());
    assert_eq!(conn.executed_matching("DELETE FROM").len(), 1);

    audit.clear_all().unwrap();
    assert_eq!(
        conn.executed_matching("TRUNCATE TABLE LOGS.FILE_OPERATION_LOG").len(),
        1
    );
}
