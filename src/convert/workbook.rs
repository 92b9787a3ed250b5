//! Excel workbook parsing (`.xlsx`, `.xls`); every sheet becomes its own dataset.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use tracing::debug;

use crate::error::ExtractResult;
use crate::types::DataSet;

use super::delimited::header_names;
use super::infer::build_dataset;

/// One sheet with data.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub sheet: String,
    pub data: DataSet,
}

/// Parsed workbook. `tables` omits sheets without data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookContents {
    pub sheet_count: usize,
    pub tables: Vec<SheetTable>,
}

/// Read every sheet of an in-memory workbook.
///
/// - The first non-empty row of a sheet is its header
/// - Fully empty rows are ignored
/// - A sheet with no rows after the header is skipped
pub fn parse_workbook(bytes: &[u8]) -> ExtractResult<WorkbookContents> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let sheet_names = workbook.sheet_names();

    let mut tables = Vec::new();
    for sheet in &sheet_names {
        let range = workbook.worksheet_range(sheet)?;
        match sheet_dataset(&range) {
            Some(data) => tables.push(SheetTable {
                sheet: sheet.clone(),
                data,
            }),
            None => debug!(sheet = %sheet, "sheet has no data rows; skipped"),
        }
    }

    Ok(WorkbookContents {
        sheet_count: sheet_names.len(),
        tables,
    })
}

fn sheet_dataset(range: &Range<Data>) -> Option<DataSet> {
    let mut rows = range
        .rows()
        .filter(|row| row.iter().any(|c| !is_blank(c)));

    let header_cells: Vec<String> = rows.next()?.iter().map(cell_to_header_string).collect();
    let header = header_names(header_cells.iter().map(String::as_str));

    let body: Vec<Vec<Option<String>>> = rows
        .map(|row| {
            let mut cells: Vec<Option<String>> = row.iter().map(cell_text).collect();
            cells.resize(header.len(), None);
            cells
        })
        .collect();
    if body.is_empty() {
        return None;
    }

    Some(build_dataset(header, body))
}

fn is_blank(c: &Data) -> bool {
    match c {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn cell_to_header_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 => (*f as i64).to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Text form used for type inference; whole floats are written without a fraction.
fn cell_text(c: &Data) -> Option<String> {
    match c {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some((*f as i64).to_string()),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
