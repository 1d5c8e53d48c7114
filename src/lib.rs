mod cmap;
mod digital;
mod error;
mod merge;
mod model;
mod ocr;
mod options;
mod page_layout;
mod pdf_reader;
mod table_detect;
mod table_parse;
mod warning;
mod xlsx_out;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::merge::assemble;
use crate::warning::WarningCode;

pub use digital::extract_digital_tables;
pub use error::ExtractError;
pub use model::{Cell, Dataset, ExtractionSource, HeaderLabel, Table, TaggedRow};
pub use ocr::{
    PageRasterizer, Pdftoppm, Tesseract, TextRecognizer, extract_ocr_tables, ocr_pdf_to_text,
};
pub use options::{
    DigitalFailurePolicy, ExtractOptions, OcrOptions, PageSelection, TableSettings,
    TableStrategy,
};
pub use warning::{ExtractWarning, WarningCode as ExtractWarningCode};
pub use xlsx_out::{write_xlsx, write_xlsx_to_buffer};

/// Outcome of a conversion that wrote a workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    pub output: PathBuf,
    pub source: ExtractionSource,
    pub table_count: usize,
    pub row_count: usize,
    /// Page column included.
    pub column_count: usize,
    pub warnings: Vec<ExtractWarning>,
}

/// The assembled dataset before it is written anywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub dataset: Dataset,
    pub source: ExtractionSource,
    pub table_count: usize,
    pub warnings: Vec<ExtractWarning>,
}

/// Returns `output` when given, otherwise `input` with its extension replaced by
/// `xlsx`.
#[must_use]
pub fn resolve_output_path(input: &Path, output: Option<&Path>) -> PathBuf {
    output.map_or_else(|| input.with_extension("xlsx"), Path::to_path_buf)
}

/// Runs the digital extractor, falls back to OCR when it finds nothing, and writes
/// the assembled rows.
pub struct Converter {
    options: ExtractOptions,
    rasterizer: Box<dyn PageRasterizer>,
    recognizer: Box<dyn TextRecognizer>,
    fallback_notice: Option<Box<dyn Fn()>>,
}

impl Converter {
    /// Uses `pdftoppm` and `tesseract` as configured in `options.ocr`.
    #[must_use]
    pub fn new(options: ExtractOptions) -> Self {
        let rasterizer = Box::new(Pdftoppm::from_options(&options.ocr));
        let recognizer = Box::new(Tesseract::from_options(&options.ocr));
        Self {
            options,
            rasterizer,
            recognizer,
            fallback_notice: None,
        }
    }

    #[must_use]
    pub fn with_ocr_backend(
        mut self,
        rasterizer: impl PageRasterizer + 'static,
        recognizer: impl TextRecognizer + 'static,
    ) -> Self {
        self.rasterizer = Box::new(rasterizer);
        self.recognizer = Box::new(recognizer);
        self
    }

    /// Called once, right before OCR starts.
    #[must_use]
    pub fn with_fallback_notice(mut self, notice: impl Fn() + 'static) -> Self {
        self.fallback_notice = Some(Box::new(notice));
        self
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    fn digital_tables(
        &self,
        input_pdf: &Path,
        warnings: &mut Vec<ExtractWarning>,
    ) -> Result<Vec<Table>, ExtractError> {
        match extract_digital_tables(input_pdf, &self.options, warnings) {
            Ok(tables) => Ok(tables),
            Err(error) => match self.options.on_digital_error {
                DigitalFailurePolicy::Abort => Err(error),
                DigitalFailurePolicy::FallBackToOcr => {
                    warn!(%error, "digital extraction failed");
                    warnings.push(ExtractWarning::new(
                        WarningCode::DigitalExtractionFailed,
                        error.to_string(),
                    ));
                    Ok(Vec::new())
                }
            },
        }
    }

    /// Extracts and assembles the rows of `input_pdf` without writing output.
    pub fn extract_dataset(&self, input_pdf: &Path) -> Result<Extraction, ExtractError> {
        if !input_pdf.exists() {
            return Err(ExtractError::InputNotFound(input_pdf.to_path_buf()));
        }
        self.options.validate()?;

        let mut warnings = Vec::new();
        let digital = self.digital_tables(input_pdf, &mut warnings)?;

        let (tables, source) = if digital.is_empty() {
            info!(input = %input_pdf.display(), "no digital tables detected, falling back to OCR");
            if let Some(notice) = &self.fallback_notice {
                notice();
            }
            let tables = extract_ocr_tables(
                input_pdf,
                self.rasterizer.as_ref(),
                self.recognizer.as_ref(),
                &self.options,
                &mut warnings,
            )?;
            (tables, ExtractionSource::Ocr)
        } else {
            (digital, ExtractionSource::Digital)
        };

        let dataset = assemble(&tables)?;
        info!(
            source = source.as_str(),
            tables = tables.len(),
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            "assembled dataset"
        );

        Ok(Extraction {
            dataset,
            source,
            table_count: tables.len(),
            warnings,
        })
    }

    /// Converts `input_pdf` and writes the workbook to `output`, or next to the input
    /// when `output` is `None`. Nothing is written when extraction fails.
    pub fn convert(
        &self,
        input_pdf: &Path,
        output: Option<&Path>,
    ) -> Result<ExtractionReport, ExtractError> {
        let output = resolve_output_path(input_pdf, output);
        let extraction = self.extract_dataset(input_pdf)?;
        write_xlsx(&output, &extraction.dataset)?;

        Ok(ExtractionReport {
            output,
            source: extraction.source,
            table_count: extraction.table_count,
            row_count: extraction.dataset.row_count(),
            column_count: extraction.dataset.column_count(),
            warnings: extraction.warnings,
        })
    }
}

pub fn convert_pdf_to_xlsx(
    input_pdf: &Path,
    output: Option<&Path>,
    options: &ExtractOptions,
) -> Result<ExtractionReport, ExtractError> {
    Converter::new(options.clone()).convert(input_pdf, output)
}
