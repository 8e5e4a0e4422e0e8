//! CSV file reading into a string table.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;

use crate::error::{IngestError, Result};

use super::header::{header_matches, normalize_header};

/// A CSV file held as trimmed strings. The first non-empty record is the
/// header row.
#[derive(Debug, Clone)]
pub struct CsvTable {
    pub path: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// File line of each data row, for error messages.
    pub lines: Vec<usize>,
}

impl CsvTable {
    /// Index of the column named `name`, compared case-insensitively.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|header| header_matches(header, name))
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column(name).ok_or_else(|| IngestError::MissingColumn {
            column: name.to_string(),
            path: self.path.clone(),
        })
    }

    /// Cell at `row`, `column`; short records read as empty.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map_or("", String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn invalid(&self, row: usize, field: &str, value: &str) -> IngestError {
        IngestError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            path: self.path.clone(),
            line: self.lines.get(row).copied().unwrap_or_default(),
        }
    }
}

fn normalize_cell(raw: &str) -> String {
    raw.trim().trim_matches('\u{feff}').to_string()
}

/// Physical file line of each record. A record's byte offset points at the
/// end of the previous record, before any blank lines the reader skipped, so
/// line breaks right after the offset are counted too.
struct LineCounter<'a> {
    bytes: &'a [u8],
    offset: usize,
    line: usize,
}

impl<'a> LineCounter<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            line: 1,
        }
    }

    fn line_at(&mut self, byte: usize) -> usize {
        let mut start = byte.min(self.bytes.len());
        while start < self.bytes.len() && matches!(self.bytes[start], b'\r' | b'\n') {
            start += 1;
        }
        if start > self.offset {
            self.line += self.bytes[self.offset..start]
                .iter()
                .filter(|b| **b == b'\n')
                .count();
            self.offset = start;
        }
        self.line
    }
}

/// Read a CSV file. Blank records are skipped.
pub fn read_csv_table(path: &Path, delimiter: u8) -> Result<CsvTable> {
    let bytes = fs::read(path).map_err(|err| read_error(path, err))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes.as_slice());
    let mut counter = LineCounter::new(&bytes);

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let row: Vec<String> = record.iter().map(normalize_cell).collect();
        if row.iter().all(String::is_empty) {
            continue;
        }
        if headers.is_none() {
            headers = Some(row.iter().map(|cell| normalize_header(cell)).collect());
            continue;
        }
        let line = record
            .position()
            .map_or(0, |pos| counter.line_at(pos.byte() as usize));
        rows.push(row);
        lines.push(line);
    }

    let Some(headers) = headers else {
        return Err(IngestError::EmptyCsv {
            path: path.to_path_buf(),
        });
    };
    tracing::debug!(
        path = %path.display(),
        columns = headers.len(),
        rows = rows.len(),
        "read csv"
    );
    Ok(CsvTable {
        path: path.to_path_buf(),
        headers,
        rows,
        lines,
    })
}

fn read_error(path: &Path, source: io::Error) -> IngestError {
    if source.kind() == io::ErrorKind::NotFound {
        IngestError::FileNotFound {
            path: path.to_path_buf(),
        }
    } else {
        IngestError::FileRead {
            path: path.to_path_buf(),
            source,
        }
    }
}
