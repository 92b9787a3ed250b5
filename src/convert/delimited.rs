//! Delimited text (`.csv`, `.txt`) parsing with delimiter sniffing.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{ExtractError, ExtractResult};
use crate::types::DataSet;

use super::infer::build_dataset;

/// Delimiters considered by [`detect_delimiter`], in tie-break order.
pub const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

const SNIFF_LINES: usize = 20;

/// Parsed delimited file.
#[derive(Debug, Clone, PartialEq)]
pub struct DelimitedTable {
    pub data: DataSet,
    /// Rows dropped for having more fields than the header.
    pub skipped_rows: usize,
    pub delimiter: u8,
}

/// Guess the delimiter from the first lines of `text`.
///
/// For each candidate, count occurrences outside quotes on every sampled line; the candidate
/// whose header count is repeated on the most lines wins, then the one with more fields.
/// Falls back to `,` when no candidate appears.
pub fn detect_delimiter(text: &str) -> u8 {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    let Some(header) = lines.first() else {
        return b',';
    };

    let mut best = (b',', 0usize, 0usize);
    for candidate in CANDIDATE_DELIMITERS {
        let expected = count_unquoted(header, candidate);
        if expected == 0 {
            continue;
        }
        let consistent = lines
            .iter()
            .filter(|line| count_unquoted(line, candidate) == expected)
            .count();
        if (consistent, expected) > (best.1, best.2) {
            best = (candidate, consistent, expected);
        }
    }
    best.0
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for b in line.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

/// Parse delimited text: the first record is the header, types are inferred per column.
///
/// Rows longer than the header are skipped and counted; shorter rows are padded with nulls;
/// blank lines are ignored. Input must be UTF-8 (a leading byte-order mark is dropped).
pub fn parse_delimited(bytes: &[u8]) -> ExtractResult<DelimitedTable> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ExtractError::invalid(format!("file is not valid UTF-8: {e}")))?;
    let delimiter = detect_delimiter(text);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut header: Option<Vec<String>> = None;
    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    let mut skipped_rows = 0;

    for result in rdr.records() {
        let record = result?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let Some(columns) = header.as_ref() else {
            header = Some(header_names(record.iter()));
            continue;
        };

        if record.len() > columns.len() {
            skipped_rows += 1;
            continue;
        }
        let mut row: Vec<Option<String>> = record.iter().map(|f| Some(f.to_string())).collect();
        row.resize(columns.len(), None);
        rows.push(row);
    }

    let header = header.ok_or_else(|| ExtractError::invalid("no columns to parse from file"))?;
    if skipped_rows > 0 {
        debug!(skipped_rows, delimiter = %(delimiter as char).escape_default(), "malformed rows skipped");
    }

    Ok(DelimitedTable {
        data: build_dataset(header, rows),
        skipped_rows,
        delimiter,
    })
}

/// Trimmed header names; blanks become `Unnamed: <i>` and repeats get `.1`, `.2`, ...
pub(crate) fn header_names<'a>(cells: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for (idx, cell) in cells.enumerate() {
        let base = match cell.trim() {
            "" => format!("Unnamed: {idx}"),
            name => name.to_string(),
        };
        let mut name = base.clone();
        let mut n = 1;
        while !seen.insert(name.clone()) {
            name = format!("{base}.{n}");
            n += 1;
        }
        names.push(name);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, Value};

    #[test]
    fn sniffs_common_delimiters() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3\n"), b',');
        assert_eq!(detect_delimiter("a;b;c\n1;2,5;3\n"), b';');
        assert_eq!(detect_delimiter("a\tb\n1\t2\n"), b'\t');
        assert_eq!(detect_delimiter("a|b\n1|2\n"), b'|');
        assert_eq!(detect_delimiter("\"x,y\";b\n\"1,2\";3\n"), b';');
        assert_eq!(detect_delimiter("single\n1\n"), b',');
    }

    #[test]
    fn malformed_and_short_rows() {
        let table = parse_delimited(b"a,b,c\n1,2,3\n4,5\n6,7,8,9\n\n10,11,12\n").unwrap();
        assert_eq!(table.skipped_rows, 1);
        assert_eq!(table.data.row_count(), 3);
        assert_eq!(table.data.rows[1][2], Value::Null);
        assert_eq!(table.data.schema.fields[0].data_type, DataType::Int64);
    }

    #[test]
    fn headers_are_filled_and_deduplicated() {
        let table = parse_delimited("\u{feff}id,,id\n1,x,2\n".as_bytes()).unwrap();
        let names: Vec<&str> = table.data.schema.field_names().collect();
        assert_eq!(names, vec!["id", "Unnamed: 1", "id.1"]);
    }

    #[test]
    fn invalid_utf8_and_empty_input_fail() {
        assert!(parse_delimited(&[0x61, 0xff, 0x0a]).is_err());
        assert!(parse_delimited(b"\n\n").is_err());
    }
}
