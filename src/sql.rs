//! Statement text helpers: identifier quoting and literal rendering.
//!
//! Statements built by this crate inline their values as escaped literals; stage commands
//! (`PUT`/`GET`/`LIST`/`REMOVE`) cannot be parameterized and the log insert follows the same
//! path so every transport sees plain statement text.

use std::path::Path;

use crate::types::Value;

/// Quote an identifier (`"name"`), doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal (`'text'`), doubling embedded single quotes.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Render an optional string as a literal or `NULL`.
pub fn literal_or_null(text: Option<&str>) -> String {
    text.map(quote_literal).unwrap_or_else(|| "NULL".to_string())
}

/// Render a [`Value`] as a statement literal.
///
/// Non-finite floats have no literal form and are written as `NULL`.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Float64(v) if v.is_finite() => format!("{v:?}"),
        Value::Float64(_) => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Utf8(s) => quote_literal(s),
        Value::Timestamp(ts) => format!(
            "'{}'::TIMESTAMP_NTZ",
            ts.format("%Y-%m-%d %H:%M:%S%.6f")
        ),
    }
}

/// `file://` URI for a local path, with forward slashes.
pub fn file_uri(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    if text.starts_with('/') {
        format!("file://{text}")
    } else {
        format!("file:///{text}")
    }
}

/// Regular expression matching a staged object whose basename is exactly `filename`.
///
/// Stage listings report names with a path prefix (`raw_stage/report.csv`), so the pattern
/// allows any prefix ending in `/`.
pub fn basename_pattern(filename: &str) -> String {
    let mut escaped = String::with_capacity(filename.len() + 8);
    for c in filename.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("(.*/)?{escaped}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn literals_escape_single_quotes() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
        assert_eq!(literal_or_null(None), "NULL");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn values_render_as_literals() {
        assert_eq!(render_value(&Value::Null), "NULL");
        assert_eq!(render_value(&Value::Int64(-3)), "-3");
        assert_eq!(render_value(&Value::Float64(2.0)), "2.0");
        assert_eq!(render_value(&Value::Float64(f64::NAN)), "NULL");
        assert_eq!(render_value(&Value::Bool(true)), "TRUE");
        assert_eq!(render_value(&Value::from("it's")), "'it''s'");

        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert_eq!(
            render_value(&Value::Timestamp(ts)),
            "'2024-05-01 08:30:00.000000'::TIMESTAMP_NTZ"
        );
    }

    #[test]
    fn basename_pattern_escapes_regex_metacharacters() {
        assert_eq!(basename_pattern("sales (q1).csv"), "(.*/)?sales \\(q1\\)\\.csv");
    }

    #[test]
    fn file_uri_uses_forward_slashes() {
        assert_eq!(file_uri(Path::new("/tmp/x/a.csv")), "file:///tmp/x/a.csv");
    }
}
