use crate::error::ExtractError;
use crate::model::{Dataset, Table, TaggedRow};
use crate::table_parse::pad_row;

/// Concatenates every table's rows in encounter order and pads them to the widest
/// row found across all tables.
pub(crate) fn assemble(tables: &[Table]) -> Result<Dataset, ExtractError> {
    let width = tables.iter().map(Table::width).max().unwrap_or(0);

    let mut rows = Vec::new();
    for table in tables {
        for data_row in &table.rows {
            rows.push(TaggedRow {
                page: table.page,
                cells: pad_row(data_row, width),
            });
        }
    }

    if rows.is_empty() {
        return Err(ExtractError::NoContent);
    }

    Ok(Dataset { width, rows })
}
