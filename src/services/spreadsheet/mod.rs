//! Spreadsheet import/export
//!
//! Uploaded workbooks are read with `calamine` into a grid of [`Cell`]s; the
//! first non-empty row is the header. Exports are written with
//! `rust_xlsxwriter`.

pub mod columns;
pub mod export;
pub mod products;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde::Serialize;
use std::io::Cursor;

pub use columns::{ImportField, MatchedColumn};
pub use export::{ExportCell, SheetExport};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Cell value normalized away from the reader's representation
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Trimmed text form; numbers that are whole print without a fraction
    /// so SKUs like `1001` survive a round trip through a numeric cell.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Text(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Self::Number(n) => Some(n.to_string()),
            Self::Bool(b) => Some(b.to_string()),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Self::Empty,
            Data::String(s) => Self::Text(s.clone()),
            Data::Int(i) => Self::Number(*i as f64),
            Data::Float(f) => Self::Number(*f),
            Data::Bool(b) => Self::Bool(*b),
            Data::DateTime(dt) => Self::Number(dt.as_f64()),
            Data::Error(_) => Self::Empty,
            other => Self::Text(other.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("The file could not be read as a spreadsheet: {0}")]
    Unreadable(String),
    #[error("The workbook has no worksheets")]
    NoWorksheet,
    #[error("The worksheet has no header row")]
    NoHeader,
    #[error("Required columns are missing: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),
}

/// Read the first worksheet of an xlsx/xls/ods workbook.
pub fn read_first_sheet(bytes: Vec<u8>) -> Result<Vec<Vec<Cell>>, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| ImportError::Unreadable(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::NoWorksheet)?
        .map_err(|e| ImportError::Unreadable(e.to_string()))?;

    // `rows()` starts at the first used cell; pad so grid index N is sheet row N + 1
    let leading = range.start().map_or(0, |(row, _)| row as usize);
    let mut grid: Vec<Vec<Cell>> = vec![Vec::new(); leading];
    grid.extend(range.rows().map(|row| row.iter().map(Cell::from).collect::<Vec<_>>()));
    Ok(grid)
}

/// Split a grid into its header (first non-blank row) and the data rows
/// after it, each paired with its 1-based spreadsheet row number.
pub fn split_header(grid: &[Vec<Cell>]) -> Result<(Vec<String>, Vec<(usize, &[Cell])>), ImportError> {
    let header_idx = grid
        .iter()
        .position(|row| row.iter().any(|c| !c.is_blank()))
        .ok_or(ImportError::NoHeader)?;

    let headers = grid[header_idx]
        .iter()
        .map(|c| c.as_text().unwrap_or_default())
        .collect();

    let rows = grid
        .iter()
        .enumerate()
        .skip(header_idx + 1)
        .map(|(idx, row)| (idx + 1, row.as_slice()))
        .collect();

    Ok((headers, rows))
}

/// Problem with a single spreadsheet row
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RowError {
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, column: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            row,
            column: column.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Summary returned by an import
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub dry_run: bool,
    pub total_rows: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<RowError>,
    pub column_mapping: Vec<MatchedColumn>,
    pub unmatched_headers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn numeric_text_form() {
        assert_eq!(Cell::Number(1001.0).as_text().as_deref(), Some("1001"));
        assert_eq!(Cell::Number(12.5).as_text().as_deref(), Some("12.5"));
        assert_eq!(text("  ").as_text(), None);
    }

    #[test]
    fn header_is_first_non_blank_row() {
        let grid = vec![
            vec![Cell::Empty, text(" ")],
            vec![text("SKU"), text("Name")],
            vec![text("A-1"), text("Mug")],
        ];
        let (headers, rows) = split_header(&grid).unwrap();
        assert_eq!(headers, ["SKU", "Name"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, 3);
    }

    #[test]
    fn empty_grid_has_no_header() {
        assert_eq!(split_header(&[]).unwrap_err(), ImportError::NoHeader);
    }

    #[test]
    fn rows_keep_sheet_numbering_below_blank_leading_rows() {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.write_string(2, 0, "SKU").unwrap();
        worksheet.write_string(2, 1, "Name").unwrap();
        worksheet.write_string(3, 0, "A-1").unwrap();
        worksheet.write_string(3, 1, "Mug").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let grid = read_first_sheet(bytes).unwrap();
        let (headers, rows) = split_header(&grid).unwrap();
        assert_eq!(headers, ["SKU", "Name"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, 4);
        assert_eq!(rows[0].1[0], text("A-1"));
    }

    #[test]
    fn garbage_bytes_are_unreadable() {
        let err = read_first_sheet(b"definitely not a workbook".to_vec()).unwrap_err();
        assert!(matches!(err, ImportError::Unreadable(_)));
    }
}
