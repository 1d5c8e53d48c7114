use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;

/// How tables are located in a page's text and graphics layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableStrategy {
    /// Cells are bounded by ruling lines and rectangle edges drawn on the page.
    #[default]
    Lines,
    /// Cells are separated by tab or double-space gaps inside reconstructed text lines.
    Text,
}

impl FromStr for TableStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lines" | "lattice" => Ok(Self::Lines),
            "text" | "stream" => Ok(Self::Text),
            other => Err(format!(
                "unknown table strategy '{other}', expected 'lines' or 'text'"
            )),
        }
    }
}

/// What the converter does when the digital extractor returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigitalFailurePolicy {
    /// Treat the error like "no tables found" and continue with OCR.
    #[default]
    FallBackToOcr,
    /// Stop and return the error.
    Abort,
}

/// 1-based pages kept as sorted, non-overlapping inclusive ranges, so a selection
/// like `1-4000000000` costs one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    ranges: Vec<RangeInclusive<u32>>,
}

impl PageSelection {
    fn from_ranges(mut ranges: Vec<RangeInclusive<u32>>) -> Self {
        ranges.sort_by_key(|range| *range.start());
        let mut merged: Vec<RangeInclusive<u32>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if *range.start() <= last.end().saturating_add(1) => {
                    if range.end() > last.end() {
                        *last = *last.start()..=*range.end();
                    }
                }
                _ => merged.push(range),
            }
        }
        Self { ranges: merged }
    }

    #[must_use]
    pub fn contains(&self, page: u32) -> bool {
        let index = self.ranges.partition_point(|range| *range.end() < page);
        self.ranges
            .get(index)
            .is_some_and(|range| range.contains(&page))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl FromStr for PageSelection {
    type Err = String;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut ranges = Vec::new();
        for token in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if let Some((start, end)) = token.split_once('-') {
                let start: u32 = start
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid page range start: '{start}'"))?;
                let end: u32 = end
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid page range end: '{end}'"))?;
                if start == 0 || end == 0 {
                    return Err("pages are 1-based".to_string());
                }
                if end < start {
                    return Err(format!(
                        "invalid range '{token}': end is smaller than start"
                    ));
                }
                ranges.push(start..=end);
            } else {
                let page: u32 = token
                    .parse()
                    .map_err(|_| format!("invalid page number: '{token}'"))?;
                if page == 0 {
                    return Err("pages are 1-based".to_string());
                }
                ranges.push(page..=page);
            }
        }

        if ranges.is_empty() {
            return Err("page selection cannot be empty".to_string());
        }

        Ok(Self::from_ranges(ranges))
    }
}

/// Tolerances for the ruling-line table finder, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableSettings {
    pub snap_tolerance: f64,
    pub join_tolerance: f64,
    pub edge_min_length: f64,
    pub intersection_tolerance: f64,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            snap_tolerance: 3.0,
            join_tolerance: 3.0,
            edge_min_length: 3.0,
            intersection_tolerance: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOptions {
    /// Rasterization resolution handed to the page renderer.
    pub dpi: u32,
    /// Tesseract language code(s), e.g. `eng` or `eng+deu`.
    pub language: String,
    pub pdftoppm: PathBuf,
    pub tesseract: PathBuf,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            dpi: 200,
            language: "eng".to_string(),
            pdftoppm: PathBuf::from("pdftoppm"),
            tesseract: PathBuf::from("tesseract"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    pub pages: Option<PageSelection>,
    pub strategy: TableStrategy,
    /// Minimum cells per row for the text strategy.
    pub min_cols: usize,
    pub table_settings: TableSettings,
    pub on_digital_error: DigitalFailurePolicy,
    pub ocr: OcrOptions,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            pages: None,
            strategy: TableStrategy::default(),
            min_cols: 2,
            table_settings: TableSettings::default(),
            on_digital_error: DigitalFailurePolicy::default(),
            ocr: OcrOptions::default(),
        }
    }
}

impl ExtractOptions {
    pub(crate) fn validate(&self) -> Result<(), crate::ExtractError> {
        if self.min_cols < 2 {
            return Err(crate::ExtractError::InvalidOption(
                "min_cols must be at least 2".to_string(),
            ));
        }
        if self.ocr.dpi == 0 {
            return Err(crate::ExtractError::InvalidOption(
                "dpi must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn includes_page(&self, page: u32) -> bool {
        self.pages
            .as_ref()
            .is_none_or(|selection| selection.contains(page))
    }
}
