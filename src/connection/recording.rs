use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ExtractError, ExtractResult};
use crate::types::Value;

use super::{Connection, Cursor, Row};

/// A statement seen by a [`RecordingConnection`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Default)]
struct RecordingState {
    statements: Vec<RecordedStatement>,
    responses: Vec<(String, Vec<Row>)>,
    failures: Vec<(String, String)>,
}

/// In-process connection that records statements instead of executing them.
///
/// Results and failures are scripted by statement fragment: a statement containing the
/// fragment gets the rows (or error) registered for it, later registrations taking precedence.
/// Failing statements are not recorded. Clones share state.
#[derive(Clone, Default)]
pub struct RecordingConnection {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answer statements containing `fragment` with `rows`.
    pub fn respond_to(&self, fragment: &str, rows: Vec<Row>) -> &Self {
        self.lock().responses.push((fragment.to_string(), rows));
        self
    }

    /// Fail statements containing `fragment` with `message`.
    pub fn fail_on(&self, fragment: &str, message: &str) -> &Self {
        self.lock()
            .failures
            .push((fragment.to_string(), message.to_string()));
        self
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.lock().statements.clone()
    }

    /// Statement texts in execution order.
    pub fn executed(&self) -> Vec<String> {
        self.lock().statements.iter().map(|s| s.sql.clone()).collect()
    }

    /// Recorded statements containing `fragment`.
    pub fn executed_matching(&self, fragment: &str) -> Vec<String> {
        self.lock()
            .statements
            .iter()
            .filter(|s| s.sql.contains(fragment))
            .map(|s| s.sql.clone())
            .collect()
    }
}

impl fmt::Debug for RecordingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("RecordingConnection")
            .field("statements", &state.statements.len())
            .field("responses", &state.responses.len())
            .field("failures", &state.failures.len())
            .finish()
    }
}

impl Connection for RecordingConnection {
    fn cursor(&self) -> ExtractResult<Box<dyn Cursor>> {
        Ok(Box::new(RecordingCursor {
            connection: self.clone(),
            pending: VecDeque::new(),
        }))
    }

    fn transport(&self) -> &str {
        "recording"
    }
}

struct RecordingCursor {
    connection: RecordingConnection,
    pending: VecDeque<Row>,
}

impl Cursor for RecordingCursor {
    fn execute(&mut self, query: &str, params: &[Value]) -> ExtractResult<()> {
        let mut state = self.connection.lock();
        if let Some((_, message)) = state
            .failures
            .iter()
            .rev()
            .find(|(fragment, _)| query.contains(fragment.as_str()))
        {
            return Err(ExtractError::sql(query, message.clone()));
        }

        state.statements.push(RecordedStatement {
            sql: query.to_string(),
            params: params.to_vec(),
        });
        self.pending = state
            .responses
            .iter()
            .rev()
            .find(|(fragment, _)| query.contains(fragment.as_str()))
            .map(|(_, rows)| rows.iter().cloned().collect())
            .unwrap_or_default();
        Ok(())
    }

    fn fetchone(&mut self) -> ExtractResult<Option<Row>> {
        Ok(self.pending.pop_front())
    }

    fn fetchall(&mut self) -> ExtractResult<Vec<Row>> {
        Ok(self.pending.drain(..).collect())
    }

    fn close(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionExt;

    #[test]
    fn scripted_rows_and_failures_apply_by_fragment() {
        let conn = RecordingConnection::new();
        conn.respond_to("CURRENT_USER", vec![vec![Value::from("ADA"), Value::from("LOADER")]]);
        conn.fail_on("DROP", "not allowed");

        let row = conn.query_one("SELECT CURRENT_USER(), CURRENT_ROLE()", &[]).unwrap();
        assert_eq!(row, Some(vec![Value::from("ADA"), Value::from("LOADER")]));

        let err = conn.query("DROP TABLE X", &[]).unwrap_err();
        assert!(err.to_string().contains("not allowed"));

        assert!(conn.query("SELECT 2", &[]).unwrap().is_empty());
        assert_eq!(conn.executed(), vec!["SELECT CURRENT_USER(), CURRENT_ROLE()", "SELECT 2"]);
    }

    #[test]
    fn later_registrations_take_precedence() {
        let conn = RecordingConnection::new();
        conn.respond_to("SELECT", vec![vec![Value::Int64(1)]]);
        conn.respond_to("SELECT", vec![vec![Value::Int64(2)]]);
        assert_eq!(conn.query_one("SELECT x", &[]).unwrap(), Some(vec![Value::Int64(2)]));
    }
}
