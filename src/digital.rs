use std::path::Path;

use lopdf::Document;
use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::model::Table;
use crate::options::{ExtractOptions, TableStrategy};
use crate::page_layout::read_page_layout;
use crate::pdf_reader::{read_page_texts, select_pages};
use crate::table_detect::{find_ruled_tables, find_text_tables};
use crate::warning::{ExtractWarning, WarningCode};

/// Detects tables in the PDF's own text and graphics layer.
///
/// `Ok` with an empty vector means the document was readable but holds no tables;
/// `Err` means it could not be opened or scanned. Whether an error is fatal is left
/// to the caller.
pub fn extract_digital_tables(
    input_pdf: &Path,
    options: &ExtractOptions,
    warnings: &mut Vec<ExtractWarning>,
) -> Result<Vec<Table>, ExtractError> {
    let document = Document::load(input_pdf)?;
    let pages = select_pages(&document, options)?;
    debug!(
        pages = pages.len(),
        strategy = ?options.strategy,
        "scanning PDF for digital tables"
    );

    let mut tables = Vec::new();
    match options.strategy {
        TableStrategy::Lines => {
            for (page_no, page_id) in &pages {
                let layout = match read_page_layout(&document, *page_id, *page_no) {
                    Ok(layout) => layout,
                    Err(error) => {
                        warn!(page = page_no, %error, "skipping unreadable page");
                        warnings.push(
                            ExtractWarning::new(
                                WarningCode::PageContentUnreadable,
                                error.to_string(),
                            )
                            .with_page(*page_no),
                        );
                        continue;
                    }
                };

                let found = find_ruled_tables(&layout, &options.table_settings);
                debug!(page = page_no, tables = found.len(), "ruled tables detected");
                tables.extend(found.into_iter().map(|rows| Table::new(*page_no, rows)));
            }
        }
        TableStrategy::Text => {
            for page in read_page_texts(&document, input_pdf, &pages) {
                let found = find_text_tables(&page, options.min_cols);
                debug!(
                    page = page.page_number,
                    tables = found.len(),
                    "text tables detected"
                );
                tables.extend(
                    found
                        .into_iter()
                        .map(|rows| Table::new(page.page_number, rows)),
                );
            }
        }
    }

    Ok(tables)
}
