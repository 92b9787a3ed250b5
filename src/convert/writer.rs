use std::sync::Arc;

use tracing::debug;

use crate::connection::{Connection, ConnectionExt};
use crate::error::ExtractResult;
use crate::sql::{quote_identifier, render_value};

use super::ConvertedTable;

/// Materializes converted tables with `CREATE OR REPLACE TABLE` and batched `INSERT`s.
#[derive(Clone)]
pub struct TableWriter {
    conn: Arc<dyn Connection>,
    schema: String,
    batch_size: usize,
}

impl TableWriter {
    pub fn new(conn: Arc<dyn Connection>, schema: impl Into<String>, batch_size: usize) -> Self {
        Self {
            conn,
            schema: schema.into(),
            batch_size: batch_size.max(1),
        }
    }

    /// `"<schema>"."<table>"`.
    pub fn qualified_name(&self, table: &str) -> String {
        format!("{}.{}", quote_identifier(&self.schema), quote_identifier(table))
    }

    pub fn create_statement(&self, table: &ConvertedTable) -> String {
        let columns: Vec<String> = table
            .data
            .schema
            .fields
            .iter()
            .map(|f| format!("{} {}", quote_identifier(&f.name), f.data_type.warehouse_type()))
            .collect();
        format!(
            "CREATE OR REPLACE TABLE {} ({})",
            self.qualified_name(&table.name),
            columns.join(", ")
        )
    }

    /// One statement per batch of rows; empty tables yield none.
    pub fn insert_statements(&self, table: &ConvertedTable) -> Vec<String> {
        let target = self.qualified_name(&table.name);
        let columns: Vec<String> = table
            .data
            .schema
            .field_names()
            .map(quote_identifier)
            .collect();
        let columns = columns.join(", ");

        table
            .data
            .rows
            .chunks(self.batch_size)
            .map(|batch| {
                let values: Vec<String> = batch
                    .iter()
                    .map(|row| {
                        let cells: Vec<String> = row.iter().map(render_value).collect();
                        format!("({})", cells.join(", "))
                    })
                    .collect();
                format!("INSERT INTO {target} ({columns}) VALUES {}", values.join(", "))
            })
            .collect()
    }

    /// Create (or replace) the table and load its rows. Returns the number of rows written.
    pub fn write(&self, table: &ConvertedTable) -> ExtractResult<usize> {
        self.conn.query(&self.create_statement(table), &[])?;
        let statements = self.insert_statements(table);
        for statement in &statements {
            self.conn.query(statement, &[])?;
        }
        debug!(
            table = %self.qualified_name(&table.name),
            rows = table.data.row_count(),
            batches = statements.len(),
            "table written"
        );
        Ok(table.data.row_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::RecordingConnection;
    use crate::types::{DataSet, DataType, Field, Schema, Value};

    fn table(rows: usize) -> ConvertedTable {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64),
            Field::new("name", DataType::Utf8),
        ]);
        let rows = (0..rows)
            .map(|i| vec![Value::Int64(i as i64), Value::from(format!("n'{i}"))])
            .collect();
        ConvertedTable {
            name: "PEOPLE".to_string(),
            data: DataSet::new(schema, rows),
        }
    }

    #[test]
    fn create_uses_quoted_identifiers_and_types() {
        let writer = TableWriter::new(Arc::new(RecordingConnection::new()), "CONVERTED_FILES", 500);
        assert_eq!(
            writer.create_statement(&table(0)),
            "CREATE OR REPLACE TABLE \"CONVERTED_FILES\".\"PEOPLE\" (\"id\" NUMBER(38,0), \"name\" VARCHAR)"
        );
    }

    #[test]
    fn rows_are_split_into_batches() {
        let conn = RecordingConnection::new();
        let writer = TableWriter::new(Arc::new(conn.clone()), "CONVERTED_FILES", 2);

        let written = writer.write(&table(5)).unwrap();
        assert_eq!(written, 5);

        let inserts = conn.executed_matching("INSERT INTO");
        assert_eq!(inserts.len(), 3);
        assert!(inserts[0].ends_with("VALUES (0, 'n''0'), (1, 'n''1')"));
        assert!(writer.insert_statements(&table(0)).is_empty());
    }
}
