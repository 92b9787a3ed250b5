//! PDF handling: no text extraction, only a one-row metadata table.

use chrono::NaiveDateTime;

use crate::types::{DataSet, DataType, Field, Schema, Value};

use super::SOURCE_FILE_COLUMN;

/// Metadata row describing a PDF file: `NOTE`, `SOURCE_FILE_NAME`, `PROCESSED_AT`,
/// `FILE_SIZE_BYTES`.
pub fn pdf_metadata(filename: &str, size_bytes: usize, processed_at: NaiveDateTime) -> DataSet {
    let schema = Schema::new(vec![
        Field::new("NOTE", DataType::Utf8),
        Field::new(SOURCE_FILE_COLUMN, DataType::Utf8),
        Field::new("PROCESSED_AT", DataType::Timestamp),
        Field::new("FILE_SIZE_BYTES", DataType::Int64),
    ]);
    let row = vec![
        Value::Utf8(format!("PDF file: {filename}")),
        Value::from(filename),
        Value::Timestamp(processed_at),
        Value::Int64(i64::try_from(size_bytes).unwrap_or(i64::MAX)),
    ];
    DataSet::new(schema, vec![row])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn metadata_row_carries_size_and_name() {
        let at = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let ds = pdf_metadata("manual.pdf", 2048, at);

        assert_eq!(ds.row_count(), 1);
        assert_eq!(ds.rows[0][0], Value::from("PDF file: manual.pdf"));
        assert_eq!(ds.rows[0][3], Value::Int64(2048));
        assert_eq!(ds.schema.index_of("PROCESSED_AT"), Some(2));
    }
}
