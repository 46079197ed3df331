//! XLSX output via rust_xlsxwriter

use std::path::Path;

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};
use serde_json::Value;

use crate::application::errors::RenderError;
use crate::domain::table::{cell_text, DataTable};

const HEADER_COLOR: Color = Color::RGB(0xD7E4BC);
const MAX_COLUMN_WIDTH: usize = 50;

/// Write the table as a single-worksheet XLSX file
pub fn write_xlsx(table: &DataTable, path: &Path, sheet_name: &str) -> Result<(), RenderError> {
    let xlsx_err = |source| RenderError::Xlsx {
        path: path.to_path_buf(),
        source,
    };

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(safe_sheet_name(sheet_name)).map_err(xlsx_err)?;

    let header_format = Format::new()
        .set_bold()
        .set_text_wrap()
        .set_align(FormatAlign::Top)
        .set_background_color(HEADER_COLOR)
        .set_border(FormatBorder::Thin);

    for (col, name) in table.columns().iter().enumerate() {
        sheet
            .write_with_format(0, col as u16, name, &header_format)
            .map_err(xlsx_err)?;
    }

    for (idx, row) in table.rows().iter().enumerate() {
        for (col, column) in table.columns().iter().enumerate() {
            let cell = row.get(column).unwrap_or(&Value::Null);
            write_cell(sheet, (idx + 1) as u32, col as u16, cell).map_err(xlsx_err)?;
        }
    }

    for (col, column) in table.columns().iter().enumerate() {
        sheet
            .set_column_width(col as u16, column_width(table, column) as f64)
            .map_err(xlsx_err)?;
    }

    workbook.save(path).map_err(xlsx_err)?;
    Ok(())
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &Value) -> Result<(), XlsxError> {
    match value {
        Value::Null => Ok(()),
        Value::Number(n) => match n.as_f64() {
            Some(f) => {
                sheet.write_number(row, col, f)?;
                Ok(())
            }
            None => {
                sheet.write_string(row, col, n.to_string())?;
                Ok(())
            }
        },
        Value::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
            Ok(())
        }
        Value::String(s) => {
            sheet.write_string(row, col, s)?;
            Ok(())
        }
        other => {
            sheet.write_string(row, col, other.to_string())?;
            Ok(())
        }
    }
}

/// Widths track the longest rendered cell, padded and capped
fn column_width(table: &DataTable, column: &str) -> usize {
    let mut longest = column.chars().count();
    for row in table.rows() {
        let cell = row.get(column).unwrap_or(&Value::Null);
        longest = longest.max(cell_text(cell).chars().count());
    }
    (longest + 2).min(MAX_COLUMN_WIDTH)
}

/// Excel rejects worksheet names over 31 characters
fn safe_sheet_name(name: &str) -> String {
    if name.chars().count() > 31 {
        let head: String = name.chars().take(28).collect();
        format!("{}...", head)
    } else {
        name.to_string()
    }
}
