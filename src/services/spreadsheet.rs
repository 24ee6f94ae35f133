use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum SpreadsheetError {
    #[error("workbook could not be read: {0}")]
    Read(#[from] calamine::Error),
    #[error("workbook has no worksheets")]
    NoWorksheet,
    #[error("workbook could not be written: {0}")]
    Write(#[from] XlsxError),
}

/// First worksheet of a workbook: the first non-blank row is the header row,
/// every later non-blank row is a data row.
#[derive(Debug, Clone, Default)]
pub(crate) struct Sheet {
    pub(crate) headers: Vec<String>,
    pub(crate) rows: Vec<Vec<Data>>,
}

impl Sheet {
    /// Index of the first header for which `matches` holds, tested against the
    /// trimmed, lowercased header text.
    pub(crate) fn find_column(&self, matches: impl Fn(&str) -> bool) -> Option<usize> {
        self.headers.iter().position(|header| matches(&header.trim().to_lowercase()))
    }

    pub(crate) fn text(row: &[Data], column: usize) -> Option<String> {
        row.get(column).map(cell_text).filter(|value| !value.is_empty())
    }

    pub(crate) fn number(row: &[Data], column: usize) -> Option<f64> {
        let value = match row.get(column)? {
            Data::Float(value) => Some(*value),
            Data::Int(value) => Some(*value as f64),
            Data::String(value) => value.trim().replace(',', ".").parse::<f64>().ok(),
            _ => None,
        };
        value.filter(|value| value.is_finite())
    }
}

/// Renders a cell the way a person reading the sheet would: trimmed text,
/// integral floats without a fractional part, empty cells as "".
pub(crate) fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.trim().to_string(),
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            format!("{}", *value as i64)
        }
        other => other.to_string().trim().to_string(),
    }
}

fn is_blank(row: &[Data]) -> bool {
    row.iter().all(|cell| cell_text(cell).is_empty())
}

pub(crate) fn read_first_sheet(bytes: Vec<u8>) -> Result<Sheet, SpreadsheetError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook.worksheet_range_at(0).ok_or(SpreadsheetError::NoWorksheet)??;

    let mut rows = range.rows().filter(|row| !is_blank(row));
    let Some(header_row) = rows.next() else {
        return Ok(Sheet::default());
    };

    let headers = header_row.iter().map(cell_text).collect();
    let rows = rows.map(|row| row.to_vec()).collect();

    Ok(Sheet { headers, rows })
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CellValue {
    Text(String),
    Number(f64),
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<u32> for CellValue {
    fn from(value: u32) -> Self {
        CellValue::Number(f64::from(value))
    }
}

/// Builds a single-worksheet `.xlsx` with a bold header row.
pub(crate) fn render_workbook(
    sheet_name: &str,
    headers: &[&str],
    rows: &[Vec<CellValue>],
) -> Result<Vec<u8>, SpreadsheetError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    for (column, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, column as u16, *header, &header_format)?;
    }

    for (index, row) in rows.iter().enumerate() {
        let row_number = index as u32 + 1;
        for (column, value) in row.iter().enumerate() {
            match value {
                CellValue::Text(text) => {
                    worksheet.write_string(row_number, column as u16, text)?;
                }
                CellValue::Number(number) => {
                    worksheet.write_number(row_number, column as u16, *number)?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
pub(crate) fn workbook_bytes(headers: &[&str], rows: &[Vec<CellValue>]) -> Vec<u8> {
    render_workbook("Sheet1", headers, rows).expect("render workbook")
}
