use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use pdf2xlsx::{
    Converter, DigitalFailurePolicy, ExtractOptions, ExtractionReport, OcrOptions, PageSelection,
    TableStrategy,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pdf2xlsx",
    version,
    about = "Extract tables from a PDF into an xlsx spreadsheet, using OCR for scanned pages"
)]
struct Cli {
    /// Input PDF path.
    input: PathBuf,

    /// Output xlsx path. Defaults to the input path with an .xlsx extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Page selection like 1-3,5.
    #[arg(long)]
    pages: Option<String>,

    /// Table finder for text PDFs: lines (ruled cells) or text (aligned columns).
    #[arg(long, default_value = "lines")]
    strategy: String,

    /// Minimum cells per row for the text strategy.
    #[arg(long, default_value_t = 2)]
    min_cols: usize,

    /// Fail when the PDF cannot be parsed instead of falling back to OCR.
    #[arg(long)]
    strict: bool,

    /// Rasterization resolution for OCR.
    #[arg(long, default_value_t = 200)]
    dpi: u32,

    /// Tesseract language, e.g. eng or eng+deu.
    #[arg(long, default_value = "eng")]
    lang: String,

    /// pdftoppm executable.
    #[arg(long, default_value = "pdftoppm")]
    pdftoppm: PathBuf,

    /// tesseract executable.
    #[arg(long, default_value = "tesseract")]
    tesseract: PathBuf,

    /// Enable debug logging and warning details.
    #[arg(short, long)]
    verbose: bool,
}

fn parse_options(cli: &Cli) -> Result<ExtractOptions> {
    let pages = cli
        .pages
        .as_deref()
        .map(PageSelection::from_str)
        .transpose()
        .map_err(|error| anyhow!("invalid page selection: {error}"))
        .context("failed to parse --pages")?;

    let strategy = TableStrategy::from_str(&cli.strategy)
        .map_err(|error| anyhow!(error))
        .context("failed to parse --strategy")?;

    let on_digital_error = if cli.strict {
        DigitalFailurePolicy::Abort
    } else {
        DigitalFailurePolicy::FallBackToOcr
    };

    Ok(ExtractOptions {
        pages,
        strategy,
        min_cols: cli.min_cols,
        on_digital_error,
        ocr: OcrOptions {
            dpi: cli.dpi,
            language: cli.lang.clone(),
            pdftoppm: cli.pdftoppm.clone(),
            tesseract: cli.tesseract.clone(),
        },
        ..ExtractOptions::default()
    })
}

fn log_report(report: &ExtractionReport, verbose: bool) {
    if verbose {
        eprintln!(
            "{} row(s) from {} table(s) via {} extraction",
            report.row_count,
            report.table_count,
            report.source.as_str()
        );
    }

    if report.warnings.is_empty() {
        return;
    }

    eprintln!("warning: {} issue(s) detected", report.warnings.len());
    if verbose {
        for warning in &report.warnings {
            eprintln!(
                "  - {:?} page={:?}: {}",
                warning.code, warning.page, warning.message
            );
        }
    }
}

fn run(cli: &Cli) -> Result<ExtractionReport> {
    let options = parse_options(cli)?;
    Converter::new(options)
        .with_fallback_notice(|| println!("No tables detected, performing OCR..."))
        .convert(&cli.input, cli.output.as_deref())
        .with_context(|| format!("failed to convert '{}'", cli.input.display()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "pdf2xlsx=debug"
    } else {
        "pdf2xlsx=warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    match run(&cli) {
        Ok(report) => {
            log_report(&report, cli.verbose);
            println!("Saved to {}", report.output.display());
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
