//! File-to-table conversion.
//!
//! Dispatch is by lowercase extension:
//!
//! - `.csv`, `.txt`: delimited text, one table named after the file
//! - `.xlsx`, `.xls`: one table per non-empty sheet, `{FILE}_{SHEET}` (feature `excel`)
//! - `.pdf`: a one-row metadata table, no text extraction
//!
//! Parsing ([`parse_file`]) is pure and produces [`ConvertedTable`]s; a [`Converter`] turns
//! them into warehouse tables. Every converted table carries a `SOURCE_FILE_NAME` column.

pub mod delimited;
pub mod infer;
pub mod pdf;
#[cfg(feature = "excel")]
pub mod workbook;
mod writer;

use std::fmt;

use chrono::Local;
use tracing::info;

use crate::error::{ExtractError, ExtractResult};
use crate::types::{DataSet, DataType, Value};

pub use writer::TableWriter;

/// Column appended to every converted table.
pub const SOURCE_FILE_COLUMN: &str = "SOURCE_FILE_NAME";

/// Derive a table name: drop the extension, replace anything but ASCII letters, digits and
/// `_` with `_`, collapse runs of `_`, trim them from both ends, uppercase.
pub fn sanitize(name: &str) -> String {
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    let mut out = String::with_capacity(stem.len());
    for c in stem.chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c.to_ascii_uppercase());
    }
    out.trim_matches('_').to_string()
}

/// Lowercase extension including the dot (`.csv`), or `""` when there is none.
pub fn extension_of(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) => format!(".{}", ext.to_ascii_lowercase()),
        None => String::new(),
    }
}

/// Supported input kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Delimited,
    Excel,
    Pdf,
}

impl FileKind {
    /// `ext` as returned by [`extension_of`].
    pub fn from_extension(ext: &str) -> Option<FileKind> {
        match ext {
            ".csv" | ".txt" => Some(FileKind::Delimited),
            ".xlsx" | ".xls" => Some(FileKind::Excel),
            ".pdf" => Some(FileKind::Pdf),
            _ => None,
        }
    }

    pub fn from_filename(filename: &str) -> ExtractResult<FileKind> {
        let ext = extension_of(filename);
        Self::from_extension(&ext).ok_or(ExtractError::UnsupportedFileType(ext))
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileKind::Delimited => "delimited",
            FileKind::Excel => "excel",
            FileKind::Pdf => "pdf",
        })
    }
}

/// A table ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedTable {
    pub name: String,
    pub data: DataSet,
}

/// Everything parsed out of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub kind: FileKind,
    pub tables: Vec<ConvertedTable>,
    /// Malformed rows dropped while parsing delimited text.
    pub skipped_rows: usize,
}

impl Conversion {
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.data.row_count()).sum()
    }
}

/// Parse `bytes` according to the extension of `filename`.
pub fn parse_file(filename: &str, bytes: &[u8]) -> ExtractResult<Conversion> {
    let kind = FileKind::from_filename(filename)?;
    let base = sanitize(filename);
    if base.is_empty() {
        return Err(ExtractError::invalid(format!(
            "cannot derive a table name from {filename}"
        )));
    }
    let source = Value::from(filename);

    match kind {
        FileKind::Delimited => {
            let table = delimited::parse_delimited(bytes)?;
            Ok(Conversion {
                kind,
                tables: vec![ConvertedTable {
                    name: base,
                    data: table
                        .data
                        .with_constant_column(SOURCE_FILE_COLUMN, DataType::Utf8, source),
                }],
                skipped_rows: table.skipped_rows,
            })
        }
        FileKind::Excel => parse_excel(filename, &base, bytes, source),
        FileKind::Pdf => Ok(Conversion {
            kind,
            tables: vec![ConvertedTable {
                name: base,
                data: pdf::pdf_metadata(filename, bytes.len(), Local::now().naive_local()),
            }],
            skipped_rows: 0,
        }),
    }
}

#[cfg(feature = "excel")]
fn parse_excel(filename: &str, base: &str, bytes: &[u8], source: Value) -> ExtractResult<Conversion> {
    let contents = workbook::parse_workbook(bytes)?;
    if contents.sheet_count == 0 {
        return Err(ExtractError::NoSheets {
            filename: filename.to_string(),
        });
    }
    if contents.tables.is_empty() {
        return Err(ExtractError::EmptyWorkbook {
            filename: filename.to_string(),
        });
    }

    let tables = contents
        .tables
        .into_iter()
        .map(|sheet| ConvertedTable {
            name: format!("{base}_{}", sanitize(&sheet.sheet)),
            data: sheet
                .data
                .with_constant_column(SOURCE_FILE_COLUMN, DataType::Utf8, source.clone()),
        })
        .collect();
    Ok(Conversion {
        kind: FileKind::Excel,
        tables,
        skipped_rows: 0,
    })
}

#[cfg(not(feature = "excel"))]
fn parse_excel(filename: &str, _base: &str, _bytes: &[u8], _source: Value) -> ExtractResult<Conversion> {
    Err(ExtractError::UnsupportedFileType(extension_of(filename)))
}

/// Outcome of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    /// Names of the tables created, in creation order.
    pub tables: Vec<String>,
    /// Data rows written across all tables.
    pub rows: usize,
    pub message: String,
}

/// Turns a file's bytes into warehouse tables.
pub trait Converter: Send + Sync {
    fn convert(&self, filename: &str, bytes: &[u8]) -> ExtractResult<ConversionReport>;
}

/// Parses files and writes the resulting tables through a [`TableWriter`].
#[derive(Clone)]
pub struct WarehouseConverter {
    writer: TableWriter,
}

impl WarehouseConverter {
    pub fn new(writer: TableWriter) -> Self {
        Self { writer }
    }
}

impl Converter for WarehouseConverter {
    fn convert(&self, filename: &str, bytes: &[u8]) -> ExtractResult<ConversionReport> {
        let conversion = parse_file(filename, bytes)?;

        let mut rows = 0;
        for table in &conversion.tables {
            rows += self.writer.write(table)?;
        }
        let tables: Vec<String> = conversion.tables.iter().map(|t| t.name.clone()).collect();

        let message = match conversion.kind {
            FileKind::Delimited => format!(
                "File {filename} processed successfully. Table {} created.",
                tables.join(", ")
            ),
            FileKind::Excel => format!(
                "File {filename} processed successfully. Created {} table(s): {}",
                tables.len(),
                tables.join(", ")
            ),
            FileKind::Pdf => format!(
                "File {filename} processed. Table {} created with metadata. Note: Full PDF text extraction requires additional processing.",
                tables.join(", ")
            ),
        };
        info!(
            file = filename,
            kind = %conversion.kind,
            tables = tables.len(),
            rows,
            skipped_rows = conversion.skipped_rows,
            "file converted"
        );

        Ok(ConversionReport {
            tables,
            rows,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_builds_table_names() {
        assert_eq!(sanitize("sales report (Q1).csv"), "SALES_REPORT_Q1");
        assert_eq!(sanitize("__data--2024__.xlsx"), "DATA_2024");
        assert_eq!(sanitize("archive.tar.gz"), "ARCHIVE_TAR");
        assert_eq!(sanitize("README"), "README");
        assert_eq!(sanitize("Überblick.csv"), "BERBLICK");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for name in ["sales report (Q1).csv", "a..b", "x_y", "__", "Jan 2024", "a-b-c.d.e"] {
            let once = sanitize(name);
            assert_eq!(sanitize(&once), once, "{name:?}");
        }
    }

    #[test]
    fn extension_dispatch() {
        assert_eq!(FileKind::from_filename("A.CSV").unwrap(), FileKind::Delimited);
        assert_eq!(FileKind::from_filename("notes.txt").unwrap(), FileKind::Delimited);
        assert_eq!(FileKind::from_filename("book.xls").unwrap(), FileKind::Excel);
        assert_eq!(FileKind::from_filename("doc.pdf").unwrap(), FileKind::Pdf);

        let err = FileKind::from_filename("bundle.zip").unwrap_err();
        assert_eq!(err.to_string(), "Unsupported file type: .zip");
        let err = FileKind::from_filename("Makefile").unwrap_err();
        assert_eq!(err.to_string(), "Unsupported file type: ");
    }

    #[test]
    fn delimited_file_gets_source_column() {
        let conversion = parse_file("people.csv", b"a,b,c\n1,2,3\n4,5,6\n7,8,9\n").unwrap();
        let table = &conversion.tables[0];
        assert_eq!(table.name, "PEOPLE");
        let names: Vec<&str> = table.data.schema.field_names().collect();
        assert_eq!(names, vec!["a", "b", "c", SOURCE_FILE_COLUMN]);
        assert_eq!(conversion.row_count(), 3);
    }

    #[test]
    fn nameless_file_is_rejected() {
        assert!(matches!(
            parse_file("___.csv", b"a\n1\n"),
            Err(ExtractError::InvalidData { .. })
        ));
    }
}
