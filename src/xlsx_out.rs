use std::path::Path;

use rust_xlsxwriter::{Format, Workbook, Worksheet};

use crate::error::ExtractError;
use crate::model::{Dataset, HeaderLabel};

const SHEET_NAME: &str = "Sheet1";
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;

fn check_limits(dataset: &Dataset) -> Result<(), ExtractError> {
    // One header row sits above the data.
    if dataset.row_count() + 1 > MAX_ROWS {
        return Err(ExtractError::SheetTooLarge(format!(
            "{} rows exceed the limit of {}",
            dataset.row_count(),
            MAX_ROWS - 1
        )));
    }
    if dataset.column_count() > MAX_COLUMNS {
        return Err(ExtractError::SheetTooLarge(format!(
            "{} columns exceed the limit of {MAX_COLUMNS}",
            dataset.column_count()
        )));
    }
    Ok(())
}

fn sheet_row(index: usize) -> Result<u32, ExtractError> {
    u32::try_from(index).map_err(|_| ExtractError::SheetTooLarge(format!("row {index}")))
}

fn sheet_column(index: usize) -> Result<u16, ExtractError> {
    u16::try_from(index).map_err(|_| ExtractError::SheetTooLarge(format!("column {index}")))
}

fn fill_worksheet(worksheet: &mut Worksheet, dataset: &Dataset) -> Result<(), ExtractError> {
    worksheet.set_name(SHEET_NAME)?;

    let bold = Format::new().set_bold();
    for (index, header) in dataset.headers().into_iter().enumerate() {
        let column = sheet_column(index)?;
        match header {
            HeaderLabel::Page => {
                worksheet.write_string_with_format(0, column, "Page", &bold)?;
            }
            HeaderLabel::Position(position) => {
                let label = sheet_column(position).map(f64::from)?;
                worksheet.write_number_with_format(0, column, label, &bold)?;
            }
        }
    }

    for (index, row) in dataset.rows.iter().enumerate() {
        let sheet_row = sheet_row(index + 1)?;
        worksheet.write_number(sheet_row, 0, row.page)?;
        for (column, cell) in row.cells.iter().enumerate() {
            if let Some(value) = cell {
                worksheet.write_string(sheet_row, sheet_column(column + 1)?, value)?;
            }
        }
    }

    Ok(())
}

fn build_workbook(dataset: &Dataset) -> Result<Workbook, ExtractError> {
    check_limits(dataset)?;
    let mut workbook = Workbook::new();
    fill_worksheet(workbook.add_worksheet(), dataset)?;
    Ok(workbook)
}

/// Writes the dataset as a single-sheet workbook, replacing any existing file.
pub fn write_xlsx(path: &Path, dataset: &Dataset) -> Result<(), ExtractError> {
    let mut workbook = build_workbook(dataset)?;
    workbook.save(path)?;
    Ok(())
}

pub fn write_xlsx_to_buffer(dataset: &Dataset) -> Result<Vec<u8>, ExtractError> {
    let mut workbook = build_workbook(dataset)?;
    Ok(workbook.save_to_buffer()?)
}
