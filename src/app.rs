//! Explicit application state shared by every page handler.

use std::sync::Arc;

use tracing::{info, warn};

use crate::audit::AuditLog;
use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::connection::{Connection, ConnectionExt, ConnectionProvider};
use crate::convert::{TableWriter, WarehouseConverter};
use crate::error::{ExtractError, ExtractResult};
use crate::pipeline::{CompositeObserver, PipelineObserver, ProcessingPipeline, SessionLog, TracingObserver};
use crate::sql::quote_identifier;
use crate::stage::{SqlStageBackend, StageBackend, StageStore};
use crate::types::Value;

/// Schema holding the operation log.
pub const LOG_SCHEMA: &str = "LOGS";

/// Current warehouse, database and schema of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
}

/// Configuration, the memoized connection and the session log.
#[derive(Debug)]
pub struct AppState {
    config: AppConfig,
    provider: ConnectionProvider,
    session_log: Arc<SessionLog>,
}

impl AppState {
    /// Application state; nothing connects until first use.
    pub fn new(config: AppConfig, provider: ConnectionProvider) -> Self {
        let session_log = Arc::new(SessionLog::new(config.pipeline.session_log_capacity));
        Self {
            config,
            provider,
            session_log,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Messages shown to the user this session.
    pub fn session_log(&self) -> &Arc<SessionLog> {
        &self.session_log
    }

    /// The shared connection, or [`ExtractError::NotConnected`].
    pub fn connect(&mut self) -> ExtractResult<Arc<dyn Connection>> {
        self.provider.get_connection().ok_or(ExtractError::NotConnected)
    }

    /// Drop the memoized connection so the next call reconnects.
    pub fn disconnect(&mut self) {
        self.provider.invalidate();
    }

    /// Create the output and log schemas and the log table.
    ///
    /// Individual statements may fail (e.g. missing privileges on an existing setup); those are
    /// logged and skipped. Returns the number of statements that failed.
    pub fn bootstrap(&mut self) -> ExtractResult<usize> {
        let conn = self.connect()?;
        let statements = [
            format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                quote_identifier(&self.config.pipeline.converted_schema)
            ),
            format!("CREATE SCHEMA IF NOT EXISTS {LOG_SCHEMA}"),
            crate::audit::create_table_statement(),
        ];

        let mut failures = 0;
        for statement in &statements {
            if let Err(e) = conn.query(statement, &[]) {
                warn!(statement = %statement, error = %e, "bootstrap statement failed");
                failures += 1;
            }
        }
        info!(failures, "bootstrap finished");
        Ok(failures)
    }

    /// Current warehouse, database and schema of the session.
    pub fn session_info(&mut self) -> ExtractResult<SessionInfo> {
        let conn = self.connect()?;
        let row = conn
            .query_one("SELECT CURRENT_WAREHOUSE(), CURRENT_DATABASE(), CURRENT_SCHEMA()", &[])?
            .unwrap_or_default();
        let text = |idx: usize| row.get(idx).and_then(Value::as_text);
        Ok(SessionInfo {
            warehouse: text(0),
            database: text(1),
            schema: text(2),
        })
    }

    /// Operation log over the shared connection.
    pub fn audit_log(&mut self) -> ExtractResult<AuditLog> {
        Ok(AuditLog::new(self.connect()?))
    }

    /// Catalog of the converted-tables schema.
    pub fn catalog(&mut self) -> ExtractResult<Catalog> {
        Ok(Catalog::new(self.connect()?, self.config.pipeline.converted_schema.clone()))
    }

    /// Pipeline with warehouse stages.
    pub fn pipeline(&mut self) -> ExtractResult<ProcessingPipeline> {
        let conn = self.connect()?;
        self.build_pipeline(Arc::new(SqlStageBackend::new(Arc::clone(&conn))), conn)
    }

    /// Pipeline over a caller-supplied stage backend, with tables and logs still written
    /// through the warehouse connection.
    pub fn pipeline_with_backend(
        &mut self,
        backend: Arc<dyn StageBackend>,
    ) -> ExtractResult<ProcessingPipeline> {
        let conn = self.connect()?;
        self.build_pipeline(backend, conn)
    }

    fn build_pipeline(
        &self,
        backend: Arc<dyn StageBackend>,
        conn: Arc<dyn Connection>,
    ) -> ExtractResult<ProcessingPipeline> {
        let writer = TableWriter::new(
            Arc::clone(&conn),
            self.config.pipeline.converted_schema.clone(),
            self.config.pipeline.insert_batch_size,
        );
        let tracing_observer: Arc<dyn PipelineObserver> = Arc::new(TracingObserver);
        let session_log: Arc<dyn PipelineObserver> = self.session_log.clone();
        let observer = Arc::new(CompositeObserver::new(vec![tracing_observer, session_log]));
        Ok(ProcessingPipeline::new(
            StageStore::new(backend),
            Arc::new(WarehouseConverter::new(writer)),
            AuditLog::new(conn),
            observer,
        ))
    }
}
