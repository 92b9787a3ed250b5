//! Inspection of converted tables: listing, columns, previews, null metrics, drop.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::info;

use crate::connection::{Connection, ConnectionExt, Row};
use crate::error::ExtractResult;
use crate::sql::{quote_identifier, quote_literal};
use crate::types::Value;

pub const MIN_PREVIEW_ROWS: usize = 5;
pub const MAX_PREVIEW_ROWS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub name: String,
    pub row_count: Option<u64>,
    pub bytes: Option<u64>,
    pub created: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Null statistics for one table.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DataQuality {
    pub total_cells: u64,
    pub null_cells: u64,
    pub columns_with_nulls: usize,
    /// Percentage of non-null cells; `0.0` for an empty table.
    pub completeness_pct: f64,
}

/// Read-mostly view over the schema holding converted tables.
#[derive(Clone)]
pub struct Catalog {
    conn: Arc<dyn Connection>,
    schema: String,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog").field("schema", &self.schema).finish()
    }
}

impl Catalog {
    /// Catalog over the tables in `schema`.
    pub fn new(conn: Arc<dyn Connection>, schema: impl Into<String>) -> Self {
        Self {
            conn,
            schema: schema.into(),
        }
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_identifier(&self.schema), quote_identifier(table))
    }

    /// Base tables, newest first.
    pub fn list_tables(&self) -> ExtractResult<Vec<TableInfo>> {
        let statement = format!(
            "SELECT table_name, row_count, bytes, created FROM information_schema.tables \
WHERE table_schema = {} AND table_type = 'BASE TABLE' ORDER BY created DESC",
            quote_literal(&self.schema)
        );
        let rows = self.conn.query(&statement, &[])?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(TableInfo {
                    name: row.first()?.as_text()?,
                    row_count: row.get(1).and_then(non_negative),
                    bytes: row.get(2).and_then(non_negative),
                    created: row.get(3).and_then(created_at),
                })
            })
            .collect())
    }

    /// Column names, types and nullability, in ordinal order.
    pub fn columns(&self, table: &str) -> ExtractResult<Vec<ColumnInfo>> {
        let statement = format!(
            "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
WHERE table_schema = {} AND table_name = {} ORDER BY ordinal_position",
            quote_literal(&self.schema),
            quote_literal(table)
        );
        let rows = self.conn.query(&statement, &[])?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(ColumnInfo {
                    name: row.first()?.as_text()?,
                    data_type: row.get(1).and_then(Value::as_text).unwrap_or_default(),
                    nullable: row
                        .get(2)
                        .and_then(Value::as_text)
                        .is_none_or(|v| v.eq_ignore_ascii_case("YES")),
                })
            })
            .collect())
    }

    /// First rows of `table`; `limit` is clamped to `5..=100`.
    pub fn preview(&self, table: &str, limit: usize) -> ExtractResult<Vec<Row>> {
        let limit = limit.clamp(MIN_PREVIEW_ROWS, MAX_PREVIEW_ROWS);
        self.conn
            .query(&format!("SELECT * FROM {} LIMIT {limit}", self.qualified(table)), &[])
    }

    /// Count nulls per column. `row_count` comes from [`Self::list_tables`].
    pub fn quality(&self, table: &str, row_count: u64) -> ExtractResult<DataQuality> {
        if row_count == 0 {
            return Ok(DataQuality::default());
        }
        let mut quality = DataQuality::default();
        for column in self.columns(table)? {
            let statement = format!(
                "SELECT COUNT(*) - COUNT({}) FROM {}",
                quote_identifier(&column.name),
                self.qualified(table)
            );
            let nulls = self
                .conn
                .query_one(&statement, &[])?
                .and_then(|row| row.first().and_then(non_negative))
                .unwrap_or(0);
            quality.total_cells += row_count;
            quality.null_cells += nulls;
            if nulls > 0 {
                quality.columns_with_nulls += 1;
            }
        }
        if quality.total_cells > 0 {
            quality.completeness_pct = (quality.total_cells - quality.null_cells) as f64
                / quality.total_cells as f64
                * 100.0;
        }
        Ok(quality)
    }

    /// Drop `table` if it exists.
    pub fn drop_table(&self, table: &str) -> ExtractResult<()> {
        self.conn
            .query(&format!("DROP TABLE {}", self.qualified(table)), &[])?;
        info!(table = %self.qualified(table), "table dropped");
        Ok(())
    }
}

fn non_negative(value: &Value) -> Option<u64> {
    value.as_i64().and_then(|v| u64::try_from(v).ok())
}

fn created_at(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::Utf8(text) => NaiveDateTime::parse_from_str(text.get(..19)?, "%Y-%m-%d %H:%M:%S").ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::RecordingConnection;

    fn catalog() -> (RecordingConnection, Catalog) {
        let conn = RecordingConnection::new();
        let catalog = Catalog::new(Arc::new(conn.clone()), "CONVERTED_FILES");
        (conn, catalog)
    }

    #[test]
    fn lists_tables_from_information_schema() {
        let (conn, catalog) = catalog();
        conn.respond_to(
            "information_schema.tables",
            vec![vec![
                Value::from("PEOPLE"),
                Value::Int64(3),
                Value::Int64(1024),
                Value::from("2024-06-01 10:00:00.000 -0700"),
            ]],
        );
        let tables = catalog.list_tables().unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].row_count, Some(3));
        assert!(tables[0].created.is_some());
        assert!(conn.executed()[0].contains("table_schema = 'CONVERTED_FILES'"));
    }

    #[test]
    fn quality_counts_nulls_per_column() {
        let (conn, catalog) = catalog();
        conn.respond_to(
            "information_schema.columns",
            vec![
                vec![Value::from("a"), Value::from("NUMBER"), Value::from("YES")],
                vec![Value::from("b"), Value::from("TEXT"), Value::from("YES")],
            ],
        );
        conn.respond_to("COUNT(\"a\")", vec![vec![Value::Int64(0)]]);
        conn.respond_to("COUNT(\"b\")", vec![vec![Value::Int64(2)]]);

        let q = catalog.quality("PEOPLE", 4).unwrap();
        assert_eq!(q.total_cells, 8);
        assert_eq!(q.null_cells, 2);
        assert_eq!(q.columns_with_nulls, 1);
        assert!((q.completeness_pct - 75.0).abs() < 1e-9);

        assert_eq!(catalog.quality("EMPTY", 0).unwrap(), DataQuality::default());
    }

    #[test]
    fn preview_limit_is_clamped_and_identifiers_quoted() {
        let (conn, catalog) = catalog();
        catalog.preview("my table", 1000).unwrap();
        catalog.drop_table("my table").unwrap();
        assert_eq!(
            conn.executed(),
            vec![
                "SELECT * FROM \"CONVERTED_FILES\".\"my table\" LIMIT 100",
                "DROP TABLE \"CONVERTED_FILES\".\"my table\"",
            ]
        );
    }
}
