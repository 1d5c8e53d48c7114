//! OCR fallback: rasterize every page, recognize its text, and split recognized
//! lines on whitespace into pseudo-columns.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::error::ExtractError;
use crate::model::Table;
use crate::options::{ExtractOptions, OcrOptions};
use crate::table_parse::tokenize_text_block;
use crate::warning::{ExtractWarning, WarningCode};

/// Renders PDF pages to image files.
pub trait PageRasterizer {
    /// Renders every page of `input_pdf` into `out_dir` and returns the image paths in
    /// page order.
    fn rasterize(&self, input_pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, ExtractError>;
}

/// Recognizes the text of one rendered page.
pub trait TextRecognizer {
    fn recognize(&self, image: &Path, page: u32) -> Result<String, ExtractError>;
}

/// Rasterizer backed by poppler's `pdftoppm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdftoppm {
    program: PathBuf,
    dpi: u32,
}

impl Pdftoppm {
    pub fn new(program: impl Into<PathBuf>, dpi: u32) -> Self {
        Self {
            program: program.into(),
            dpi,
        }
    }

    pub fn from_options(options: &OcrOptions) -> Self {
        Self::new(options.pdftoppm.clone(), options.dpi)
    }
}

impl PageRasterizer for Pdftoppm {
    fn rasterize(&self, input_pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        let prefix = out_dir.join("page");
        debug!(
            program = %self.program.display(),
            dpi = self.dpi,
            out_dir = %out_dir.display(),
            "rasterizing pages"
        );

        let output = Command::new(&self.program)
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg(input_pdf)
            .arg(&prefix)
            .output()
            .map_err(|source| ExtractError::ToolUnavailable {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Rasterize(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        collect_page_images(out_dir)
    }
}

/// Recognizer backed by the `tesseract` command-line tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tesseract {
    program: PathBuf,
    language: String,
}

impl Tesseract {
    pub fn new(program: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            language: language.into(),
        }
    }

    pub fn from_options(options: &OcrOptions) -> Self {
        Self::new(options.tesseract.clone(), options.language.clone())
    }
}

impl TextRecognizer for Tesseract {
    fn recognize(&self, image: &Path, page: u32) -> Result<String, ExtractError> {
        debug!(page, image = %image.display(), "running text recognition");

        let output = Command::new(&self.program)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .map_err(|source| ExtractError::ToolUnavailable {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Recognize {
                page,
                reason: format!("exit status {}: {}", output.status, stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// `pdftoppm` names its output `<prefix>-<n>.png`, zero-padding `n` to the width of
/// the page count.
fn page_image_number(path: &Path) -> Option<u32> {
    let stem = path
        .file_name()?
        .to_str()?
        .strip_prefix("page-")?
        .strip_suffix(".png")?;
    stem.parse().ok()
}

fn collect_page_images(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(number) = page_image_number(&path) {
            images.push((number, path));
        }
    }
    images.sort_by_key(|(number, _)| *number);
    Ok(images.into_iter().map(|(_, path)| path).collect())
}

fn scratch_dir() -> Result<tempfile::TempDir, ExtractError> {
    let dir = tempfile::Builder::new().prefix("pdf2xlsx-ocr-").tempdir()?;
    debug!(path = %dir.path().display(), "created OCR scratch directory");
    Ok(dir)
}

fn page_number(index: usize) -> Result<u32, ExtractError> {
    u32::try_from(index + 1)
        .map_err(|_| ExtractError::InvalidOption(format!("page index {index} out of range")))
}

/// Runs OCR over every selected page and returns one table per page that produced
/// at least one non-blank line.
///
/// Rasterization and recognition errors are returned as-is. The scratch directory
/// holding the page images is removed on every return path.
pub fn extract_ocr_tables(
    input_pdf: &Path,
    rasterizer: &dyn PageRasterizer,
    recognizer: &dyn TextRecognizer,
    options: &ExtractOptions,
    warnings: &mut Vec<ExtractWarning>,
) -> Result<Vec<Table>, ExtractError> {
    let scratch = scratch_dir()?;
    let images = rasterizer.rasterize(input_pdf, scratch.path())?;
    info!(pages = images.len(), "running OCR");

    let mut selected = 0_usize;
    let mut tables = Vec::new();
    for (index, image) in images.iter().enumerate() {
        let page = page_number(index)?;
        if !options.includes_page(page) {
            continue;
        }
        selected += 1;

        let text = recognizer.recognize(image, page)?;
        let rows = tokenize_text_block(&text);
        if rows.is_empty() {
            warnings.push(
                ExtractWarning::new(WarningCode::BlankOcrPage, "no text recognized on page")
                    .with_page(page),
            );
            continue;
        }

        debug!(page, lines = rows.len(), "recognized text lines");
        tables.push(Table::new(page, rows));
    }

    if selected == 0 && options.pages.is_some() {
        return Err(ExtractError::NoPagesSelected);
    }

    Ok(tables)
}

/// Raw recognized text of every page, in page order.
pub fn ocr_pdf_to_text(
    input_pdf: &Path,
    rasterizer: &dyn PageRasterizer,
    recognizer: &dyn TextRecognizer,
) -> Result<Vec<String>, ExtractError> {
    let scratch = scratch_dir()?;
    let images = rasterizer.rasterize(input_pdf, scratch.path())?;

    images
        .iter()
        .enumerate()
        .map(|(index, image)| recognizer.recognize(image, page_number(index)?))
        .collect()
}
