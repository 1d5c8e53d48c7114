/// A single extracted value. `None` marks a null cell (padding, or a grid slot no
/// detected cell covers).
pub type Cell = Option<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

/// A grid of cells recovered from one page by either extraction path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub page: u32,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(page: u32, rows: Vec<Vec<Cell>>) -> Self {
        Self { page, rows }
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    Digital,
    Ocr,
}

impl ExtractionSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Digital => "digital",
            Self::Ocr => "ocr",
        }
    }
}

/// One output row: the source page followed by positional cell values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedRow {
    pub page: u32,
    pub cells: Vec<Cell>,
}

/// First-row label of an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLabel {
    /// The `Page` column.
    Page,
    /// Zero-based content column, written as a number.
    Position(usize),
}

/// Flat, page-ordered rows padded to a declared content width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub width: usize,
    pub rows: Vec<TaggedRow>,
}

impl Dataset {
    /// Page column plus content columns.
    pub fn column_count(&self) -> usize {
        self.width + 1
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn headers(&self) -> Vec<HeaderLabel> {
        let mut headers = Vec::with_capacity(self.column_count());
        headers.push(HeaderLabel::Page);
        headers.extend((0..self.width).map(HeaderLabel::Position));
        headers
    }
}
