use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to load PDF: {0}")]
    PdfLoad(#[from] lopdf::Error),

    #[error("failed to read content of page {page}: {reason}")]
    PdfContent { page: u32, reason: String },

    #[error("invalid page selection: {0}")]
    InvalidPageSelection(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("no pages available after applying selection")]
    NoPagesSelected,

    #[error("failed to run '{program}': {source}")]
    ToolUnavailable {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to rasterize PDF: {0}")]
    Rasterize(String),

    #[error("text recognition failed on page {page}: {reason}")]
    Recognize { page: u32, reason: String },

    #[error("no readable tables or text found in PDF")]
    NoContent,

    #[error("spreadsheet write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("dataset does not fit in one worksheet: {0}")]
    SheetTooLarge(String),
}
