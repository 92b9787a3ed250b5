//! Core data model types.
//!
//! Converters parse uploaded files into an in-memory [`DataSet`] (a [`Schema`] of typed
//! [`Field`]s plus row-major [`Value`]s) before it is written to the warehouse. The same
//! [`Value`] type carries query parameters and result rows through [`crate::connection::Cursor`].

use std::fmt;

use chrono::NaiveDateTime;

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
    /// Timestamp without time zone.
    Timestamp,
}

impl DataType {
    /// Column type used in `CREATE TABLE` statements.
    pub fn warehouse_type(&self) -> &'static str {
        match self {
            Self::Int64 => "NUMBER(38,0)",
            Self::Float64 => "FLOAT",
            Self::Bool => "BOOLEAN",
            Self::Utf8 => "VARCHAR",
            Self::Timestamp => "TIMESTAMP_NTZ",
        }
    }
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of fields describing the shape of a table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A single typed value: a table cell, a statement parameter or a result column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text form of a non-null value.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Utf8(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Integer view; numeric strings are accepted since drivers often return numbers as text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            Self::Float64(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::Utf8(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int64(v) => Some(*v as f64),
            Self::Float64(v) => Some(*v),
            Self::Utf8(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Utf8(s) => f.write_str(s),
            Self::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Utf8(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Utf8(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

/// In-memory tabular dataset.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.schema.len()
    }

    /// Returns a copy with one more column holding `value` in every row.
    ///
    /// Used to annotate converted tables with the file they came from.
    pub fn with_constant_column(&self, name: &str, data_type: DataType, value: Value) -> Self {
        let mut fields = self.schema.fields.clone();
        fields.push(Field::new(name, data_type));
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut out = Vec::with_capacity(row.len() + 1);
                out.extend(row.iter().cloned());
                out.push(value.clone());
                out
            })
            .collect();
        Self::new(Schema::new(fields), rows)
    }

    /// Iterate the values of column `idx`.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |row| row.get(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::{DataSet, DataType, Field, Schema, Value};

    fn sample_dataset() -> DataSet {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64),
            Field::new("name", DataType::Utf8),
        ]);
        DataSet::new(
            schema,
            vec![
                vec![Value::Int64(1), Value::Utf8("a".to_string())],
                vec![Value::Int64(2), Value::Null],
            ],
        )
    }

    #[test]
    fn schema_index_of_works() {
        let ds = sample_dataset();
        assert_eq!(ds.schema.index_of("id"), Some(0));
        assert_eq!(ds.schema.index_of("name"), Some(1));
        assert_eq!(ds.schema.index_of("missing"), None);
    }

    #[test]
    fn constant_column_is_appended_to_every_row() {
        let ds = sample_dataset();
        let out = ds.with_constant_column("SOURCE_FILE_NAME", DataType::Utf8, Value::from("people.csv"));

        assert_eq!(out.column_count(), 3);
        assert_eq!(out.schema.index_of("SOURCE_FILE_NAME"), Some(2));
        assert!(out.column(2).all(|v| *v == Value::from("people.csv")));
        // Original unchanged
        assert_eq!(ds.column_count(), 2);
    }

    #[test]
    fn numeric_views_accept_text() {
        assert_eq!(Value::from("42").as_i64(), Some(42));
        assert_eq!(Value::Float64(3.0).as_i64(), Some(3));
        assert_eq!(Value::from("1.5").as_f64(), Some(1.5));
        assert_eq!(Value::Null.as_text(), None);
        assert_eq!(Value::Bool(true).as_text().as_deref(), Some("true"));
    }
}
