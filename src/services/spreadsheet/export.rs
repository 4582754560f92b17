//! Workbook writer for exports

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{ColNum, Format, RowNum, Workbook, XlsxError};

#[derive(Debug, Clone, PartialEq)]
pub enum ExportCell {
    Empty,
    Text(String),
    Int(i64),
    Money(Decimal),
    Timestamp(DateTime<Utc>),
}

impl From<String> for ExportCell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ExportCell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Option<String>> for ExportCell {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Empty, Self::Text)
    }
}

impl From<i64> for ExportCell {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Decimal> for ExportCell {
    fn from(value: Decimal) -> Self {
        Self::Money(value)
    }
}

impl From<Option<Decimal>> for ExportCell {
    fn from(value: Option<Decimal>) -> Self {
        value.map_or(Self::Empty, Self::Money)
    }
}

impl From<DateTime<Utc>> for ExportCell {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// One worksheet: a bold, frozen header row followed by data rows
#[derive(Debug, Clone)]
pub struct SheetExport {
    pub name: &'static str,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<ExportCell>>,
}

impl SheetExport {
    pub fn new(name: &'static str, headers: Vec<&'static str>) -> Self {
        Self {
            name,
            headers,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<ExportCell>) {
        self.rows.push(row);
    }

    /// File name for the attachment disposition
    pub fn file_name(&self) -> String {
        format!("{}-{}.xlsx", self.name.to_lowercase(), Utc::now().format("%Y%m%d"))
    }
}

pub fn write_workbook(sheet: &SheetExport) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let money = Format::new().set_num_format("#,##0.00");

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet.name)?;

    for (col, header) in sheet.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as ColNum, *header, &bold)?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    for (idx, row) in sheet.rows.iter().enumerate() {
        let r = (idx + 1) as RowNum;
        for (col, cell) in row.iter().enumerate() {
            let c = col as ColNum;
            match cell {
                ExportCell::Empty => {}
                ExportCell::Text(s) => {
                    worksheet.write_string(r, c, s.as_str())?;
                }
                ExportCell::Int(n) => {
                    worksheet.write_number(r, c, *n as f64)?;
                }
                ExportCell::Money(d) => {
                    worksheet.write_number_with_format(r, c, d.to_f64().unwrap_or_default(), &money)?;
                }
                ExportCell::Timestamp(ts) => {
                    worksheet.write_string(r, c, &ts.format("%Y-%m-%d %H:%M:%S").to_string())?;
                }
            }
        }
    }
    worksheet.autofit();

    workbook.save_to_buffer()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::spreadsheet::{read_first_sheet, Cell};
    use rust_decimal_macros::dec;

    #[test]
    fn written_workbook_reads_back() {
        let mut sheet = SheetExport::new("Products", vec!["SKU", "Name", "Price", "Variants", "Brand"]);
        sheet.push(vec![
            "MUG-1".into(),
            "Mug".into(),
            dec!(12.50).into(),
            ExportCell::Int(2),
            ExportCell::from(None::<String>),
        ]);

        let bytes = write_workbook(&sheet).unwrap();
        let grid = read_first_sheet(bytes).unwrap();

        assert_eq!(grid[0][0], Cell::Text("SKU".into()));
        assert_eq!(grid[0][4], Cell::Text("Brand".into()));
        assert_eq!(grid[1][0], Cell::Text("MUG-1".into()));
        assert_eq!(grid[1][2], Cell::Number(12.5));
        assert_eq!(grid[1][3], Cell::Number(2.0));
        assert!(grid[1].get(4).map_or(true, Cell::is_blank));
    }

    #[test]
    fn file_name_is_dated() {
        let sheet = SheetExport::new("Orders", vec![]);
        let name = sheet.file_name();
        assert!(name.starts_with("orders-"));
        assert!(name.ends_with(".xlsx"));
    }
}
