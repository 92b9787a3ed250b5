//! Warehouse connection adapters and the connection provider.
//!
//! Every transport (managed in-platform session, driver connection, named connection) is
//! adapted to the same small cursor contract: [`Cursor::execute`], [`Cursor::fetchone`],
//! [`Cursor::fetchall`] and [`Cursor::close`]. Business code only ever sees
//! `Arc<dyn Connection>`.
//!
//! [`ConnectionProvider`] tries its [`ConnectStrategy`] candidates in priority order and
//! memoizes the first one that yields a working connection.

mod recording;
mod strategy;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::ExtractResult;
use crate::types::Value;

pub use recording::{RecordedStatement, RecordingConnection};
pub use strategy::{
    default_strategies, ConnectStrategy, CredentialStrategy, Driver, ManagedSessionStrategy,
    NamedConnectionStrategy, SessionSource,
};

/// One result row.
pub type Row = Vec<Value>;

/// Cursor over a single statement execution.
///
/// Parameters bind to `?` placeholders in order.
pub trait Cursor: Send {
    fn execute(&mut self, query: &str, params: &[Value]) -> ExtractResult<()>;

    /// Next row of the last result, or `None` when exhausted.
    fn fetchone(&mut self) -> ExtractResult<Option<Row>>;

    /// All remaining rows of the last result.
    fn fetchall(&mut self) -> ExtractResult<Vec<Row>>;

    fn close(&mut self) {}
}

/// A live warehouse connection.
pub trait Connection: Send + Sync {
    fn cursor(&self) -> ExtractResult<Box<dyn Cursor>>;

    /// Short label of the underlying transport, used in log fields.
    fn transport(&self) -> &str {
        "connection"
    }
}

/// Convenience helpers for one-shot statements.
pub trait ConnectionExt {
    /// Execute `query` and return all rows.
    fn query(&self, query: &str, params: &[Value]) -> ExtractResult<Vec<Row>>;

    /// Execute `query` and return the first row, if any.
    fn query_one(&self, query: &str, params: &[Value]) -> ExtractResult<Option<Row>>;
}

impl<C: Connection + ?Sized> ConnectionExt for C {
    fn query(&self, query: &str, params: &[Value]) -> ExtractResult<Vec<Row>> {
        let mut cursor = self.cursor()?;
        let result = cursor
            .execute(query, params)
            .and_then(|_| cursor.fetchall());
        cursor.close();
        result
    }

    fn query_one(&self, query: &str, params: &[Value]) -> ExtractResult<Option<Row>> {
        let mut cursor = self.cursor()?;
        let result = cursor
            .execute(query, params)
            .and_then(|_| cursor.fetchone());
        cursor.close();
        result
    }
}

/// Query used to confirm a candidate connection actually works.
pub const VALIDATION_QUERY: &str = "SELECT 1";

/// Lazily builds and memoizes the shared warehouse connection.
pub struct ConnectionProvider {
    strategies: Vec<Box<dyn ConnectStrategy>>,
    cached: Option<(&'static str, Arc<dyn Connection>)>,
}

impl ConnectionProvider {
    /// Candidates are tried in the given order.
    pub fn new(strategies: Vec<Box<dyn ConnectStrategy>>) -> Self {
        Self {
            strategies,
            cached: None,
        }
    }

    /// Provider that always hands out `connection`; useful for tests and embedding.
    pub fn fixed(connection: Arc<dyn Connection>) -> Self {
        Self {
            strategies: Vec::new(),
            cached: Some(("fixed", connection)),
        }
    }

    /// Return the memoized connection, establishing it on first use.
    ///
    /// Returns `None` when every strategy fails; failures are not memoized, so the next call
    /// tries again.
    pub fn get_connection(&mut self) -> Option<Arc<dyn Connection>> {
        if let Some((_, conn)) = &self.cached {
            return Some(Arc::clone(conn));
        }

        for strategy in &self.strategies {
            let name = strategy.name();
            match strategy.connect() {
                Ok(None) => debug!(strategy = name, "connection strategy not applicable"),
                Ok(Some(conn)) => match conn.query_one(VALIDATION_QUERY, &[]) {
                    Ok(_) => {
                        info!(strategy = name, transport = conn.transport(), "warehouse connection established");
                        self.cached = Some((name, Arc::clone(&conn)));
                        return Some(conn);
                    }
                    Err(e) => warn!(strategy = name, error = %e, "connection failed validation"),
                },
                Err(e) => warn!(strategy = name, error = %e, "connection strategy failed"),
            }
        }

        warn!(candidates = self.strategies.len(), "no connection strategy produced a working connection");
        None
    }

    /// Name of the strategy that produced the memoized connection.
    pub fn active_strategy(&self) -> Option<&'static str> {
        self.cached.as_ref().map(|(name, _)| *name)
    }

    /// Drop the memoized connection; the next [`Self::get_connection`] reconnects.
    pub fn invalidate(&mut self) {
        if let Some((name, _)) = self.cached.take() {
            info!(strategy = name, "warehouse connection invalidated");
        }
    }
}

impl std::fmt::Debug for ConnectionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProvider")
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("active", &self.active_strategy())
            .finish()
    }
}
