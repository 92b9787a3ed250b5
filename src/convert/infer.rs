//! Column type inference for untyped tabular input.
//!
//! A column is the narrowest of Int64, Float64, Bool and Utf8 (checked in that order) that
//! accepts every non-empty cell. Empty cells become [`Value::Null`]; all-empty columns are Utf8.

use crate::types::{DataSet, DataType, Field, Schema, Value};

/// Infer the type of one column from its raw cells.
pub fn infer_column<'a, I>(cells: I) -> DataType
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut int = true;
    let mut float = true;
    let mut boolean = true;
    let mut seen = false;

    for cell in cells {
        let Some(raw) = cell.map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        seen = true;
        int = int && raw.parse::<i64>().is_ok();
        float = float && parse_float(raw).is_some();
        boolean = boolean && parse_bool(raw).is_some();
        if !int && !float && !boolean {
            return DataType::Utf8;
        }
    }

    if !seen {
        DataType::Utf8
    } else if int {
        DataType::Int64
    } else if float {
        DataType::Float64
    } else if boolean {
        DataType::Bool
    } else {
        DataType::Utf8
    }
}

/// Convert a raw cell to a value of the inferred type.
///
/// Cells are only ever converted with the type inferred from their own column, so parsing
/// cannot fail; a mismatch falls back to text.
pub fn typed_value(cell: Option<&str>, data_type: DataType) -> Value {
    let Some(raw) = cell.map(str::trim).filter(|s| !s.is_empty()) else {
        return Value::Null;
    };
    let parsed = match data_type {
        DataType::Int64 => raw.parse().ok().map(Value::Int64),
        DataType::Float64 => parse_float(raw).map(Value::Float64),
        DataType::Bool => parse_bool(raw).map(Value::Bool),
        DataType::Utf8 | DataType::Timestamp => None,
    };
    parsed.unwrap_or_else(|| Value::Utf8(raw.to_string()))
}

/// Build a typed [`DataSet`] from headers and raw rows (each row as long as `headers`).
pub fn build_dataset(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> DataSet {
    let fields: Vec<Field> = headers
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let data_type = infer_column(rows.iter().map(|row| row.get(idx).and_then(|c| c.as_deref())));
            Field::new(name, data_type)
        })
        .collect();

    let rows = rows
        .iter()
        .map(|row| {
            fields
                .iter()
                .enumerate()
                .map(|(idx, field)| typed_value(row.get(idx).and_then(|c| c.as_deref()), field.data_type))
                .collect()
        })
        .collect();

    DataSet::new(Schema::new(fields), rows)
}

/// Floats need at least one digit, so `inf` and `NaN` words stay text.
fn parse_float(raw: &str) -> Option<f64> {
    if !raw.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_bool(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
