#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use pdf2xlsx::{ExtractError, PageRasterizer, TextRecognizer};

type FixtureResult = Result<(), Box<dyn std::error::Error>>;

const GRID_LEFT: i64 = 50;
const GRID_TOP: i64 = 760;
const CELL_WIDTH: i64 = 120;
const CELL_HEIGHT: i64 = 24;

fn add_courier(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    })
}

fn save_pages(path: &Path, pages: Vec<Vec<Operation>>) -> FixtureResult {
    save_pages_with(
        path,
        pages,
        |doc| Ok(dictionary! { "Font" => dictionary! { "F1" => add_courier(doc) } }),
    )
}

/// Saves one page per operation list, all sharing the resources `resources` builds.
fn save_pages_with(
    path: &Path,
    pages: Vec<Vec<Operation>>,
    resources: impl FnOnce(&mut Document) -> Result<Dictionary, Box<dyn std::error::Error>>,
) -> FixtureResult {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let resources = resources(&mut doc)?;
    let resources_id = doc.add_object(resources);

    let mut page_ids = Vec::new();
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        page_ids.push(page_id);
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| (*id).into()).collect::<Vec<_>>(),
            "Count" => i64::try_from(page_ids.len())?,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    doc.save(path)?;
    Ok(())
}

/// One text line per entry, written top-down in 12pt Courier without any rulings.
pub fn create_text_pdf(path: &Path, pages: &[Vec<&str>]) -> FixtureResult {
    save_pages(path, text_page_operations(pages))
}

fn text_page_operations(pages: &[Vec<&str>]) -> Vec<Vec<Operation>> {
    pages
        .iter()
        .map(|lines| {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("TL", vec![16.into()]),
                Operation::new("Td", vec![50.into(), 780.into()]),
            ];
            for (index, line) in lines.iter().enumerate() {
                operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
                if index + 1 < lines.len() {
                    operations.push(Operation::new("T*", vec![]));
                }
            }
            operations.push(Operation::new("ET", vec![]));
            operations
        })
        .collect()
}

/// Like `create_text_pdf`, but the font's `/Widths` array stops short of
/// `LastChar`, the way some broken producers write TrueType fonts.
pub fn create_short_widths_text_pdf(path: &Path, pages: &[Vec<&str>]) -> FixtureResult {
    save_pages_with(
        path,
        text_page_operations(pages),
        |doc| {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "TrueType",
                "BaseFont" => "Arial",
                "FirstChar" => 32,
                "LastChar" => 33,
                "Widths" => vec![600.into()],
            });
            Ok(dictionary! { "Font" => dictionary! { "F1" => font_id } })
        },
    )
}

fn grid_operations(rows: &[Vec<&str>]) -> Result<Vec<Operation>, Box<dyn std::error::Error>> {
    grid_operations_with(rows, &|value: &str| Object::string_literal(value))
}

/// A stroked grid with one cell per entry; `encode` turns cell text into the
/// string operand shown with font `F1`.
fn grid_operations_with(
    rows: &[Vec<&str>],
    encode: &dyn Fn(&str) -> Object,
) -> Result<Vec<Operation>, Box<dyn std::error::Error>> {
    let row_count = i64::try_from(rows.len())?;
    let column_count = i64::try_from(rows.iter().map(Vec::len).max().unwrap_or(0))?;
    if row_count == 0 || column_count == 0 {
        return Ok(Vec::new());
    }

    let right = GRID_LEFT + CELL_WIDTH * column_count;
    let bottom = GRID_TOP - CELL_HEIGHT * row_count;

    let mut operations = vec![Operation::new("w", vec![1.into()])];
    for row in 0..=row_count {
        let y = GRID_TOP - CELL_HEIGHT * row;
        operations.push(Operation::new("m", vec![GRID_LEFT.into(), y.into()]));
        operations.push(Operation::new("l", vec![right.into(), y.into()]));
    }
    for column in 0..=column_count {
        let x = GRID_LEFT + CELL_WIDTH * column;
        operations.push(Operation::new("m", vec![x.into(), GRID_TOP.into()]));
        operations.push(Operation::new("l", vec![x.into(), bottom.into()]));
    }
    operations.push(Operation::new("S", vec![]));

    operations.push(Operation::new("BT", vec![]));
    operations.push(Operation::new("Tf", vec!["F1".into(), 10.into()]));
    for (row_index, row) in rows.iter().enumerate() {
        let cell_bottom = GRID_TOP - CELL_HEIGHT * (i64::try_from(row_index)? + 1);
        for (column_index, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let x = GRID_LEFT + CELL_WIDTH * i64::try_from(column_index)? + 4;
            operations.push(Operation::new(
                "Tm",
                vec![
                    1.into(),
                    0.into(),
                    0.into(),
                    1.into(),
                    x.into(),
                    (cell_bottom + 8).into(),
                ],
            ));
            operations.push(Operation::new("Tj", vec![encode(*value)]));
        }
    }
    operations.push(Operation::new("ET", vec![]));

    Ok(operations)
}

/// Each page holds one ruled grid table; an empty page entry produces a page with no
/// content at all.
pub fn create_grid_table_pdf(path: &Path, pages: &[Vec<Vec<&str>>]) -> FixtureResult {
    let pages = pages
        .iter()
        .map(|rows| grid_operations(rows))
        .collect::<Result<Vec<_>, _>>()?;
    save_pages(path, pages)
}

/// One ruled grid drawn through a Type0/Identity-H font: cell strings are two-byte
/// glyph ids, readable only through the font's `/ToUnicode` CMap.
pub fn create_identity_h_grid_pdf(path: &Path, rows: &[Vec<&str>]) -> FixtureResult {
    let mut glyphs = rows
        .iter()
        .flatten()
        .flat_map(|cell| cell.chars())
        .collect::<Vec<_>>();
    glyphs.sort_unstable();
    glyphs.dedup();

    let glyph_id = |ch: char| {
        glyphs
            .iter()
            .position(|glyph| *glyph == ch)
            .and_then(|index| u16::try_from(index + 1).ok())
            .unwrap_or(0)
    };
    let encode = |value: &str| {
        let bytes = value
            .chars()
            .flat_map(|ch| glyph_id(ch).to_be_bytes())
            .collect::<Vec<_>>();
        Object::String(bytes, StringFormat::Hexadecimal)
    };
    let operations = grid_operations_with(rows, &encode)?;

    let mut cmap = format!("begincmap\n{} beginbfchar\n", glyphs.len());
    for ch in &glyphs {
        let mut units = [0_u16; 2];
        let target = ch
            .encode_utf16(&mut units)
            .iter()
            .map(|unit| format!("{unit:04X}"))
            .collect::<String>();
        cmap.push_str(&format!("<{:04X}> <{target}>\n", glyph_id(*ch)));
    }
    cmap.push_str("endbfchar\nendcmap\n");

    save_pages_with(
        path,
        vec![operations],
        move |doc| {
            let cmap_id = doc.add_object(Stream::new(dictionary! {}, cmap.into_bytes()));
            let descendant_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "CIDFontType2",
                "BaseFont" => "AAAAAA+NotoSans",
                "CIDSystemInfo" => dictionary! {
                    "Registry" => Object::string_literal("Adobe"),
                    "Ordering" => Object::string_literal("Identity"),
                    "Supplement" => 0,
                },
                "DW" => 500,
            });
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type0",
                "BaseFont" => "AAAAAA+NotoSans",
                "Encoding" => "Identity-H",
                "DescendantFonts" => vec![descendant_id.into()],
                "ToUnicode" => cmap_id,
            });
            Ok(dictionary! { "Font" => dictionary! { "F1" => font_id } })
        },
    )
}

/// The page content is a single `/Fm0 Do`; the ruled grid and its text live in
/// the form XObject, which inherits the page's fonts.
pub fn create_form_grid_pdf(path: &Path, rows: &[Vec<&str>]) -> FixtureResult {
    let form_content = Content {
        operations: grid_operations(rows)?,
    }
    .encode()?;

    save_pages_with(
        path,
        vec![vec![Operation::new("Do", vec!["Fm0".into()])]],
        move |doc| {
            let form_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                },
                form_content,
            ));
            Ok(dictionary! {
                "Font" => dictionary! { "F1" => add_courier(doc) },
                "XObject" => dictionary! { "Fm0" => form_id },
            })
        },
    )
}

pub fn create_blank_pdf(path: &Path, page_count: usize) -> FixtureResult {
    save_pages(path, (0..page_count).map(|_| Vec::new()).collect())
}

pub fn write_corrupt_pdf(path: &Path) -> std::io::Result<()> {
    fs::write(path, b"%PDF-1.5\nthis is not a real document\n")
}

/// Writes one placeholder image per page and counts invocations.
#[derive(Clone, Default)]
pub struct CountingRasterizer {
    pub pages: usize,
    pub calls: Rc<Cell<usize>>,
    pub scratch_dirs: Rc<RefCell<Vec<PathBuf>>>,
}

impl CountingRasterizer {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }
}

impl PageRasterizer for CountingRasterizer {
    fn rasterize(&self, _input_pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        self.calls.set(self.calls.get() + 1);
        self.scratch_dirs.borrow_mut().push(out_dir.to_path_buf());
        (1..=self.pages)
            .map(|page| {
                let image = out_dir.join(format!("page-{page}.png"));
                fs::write(&image, b"\x89PNG")?;
                Ok(image)
            })
            .collect()
    }
}

/// Returns a fixed text per page, or a recognition error for pages listed in
/// `fail_on`.
#[derive(Clone, Default)]
pub struct ScriptedRecognizer {
    pub texts: Vec<String>,
    pub fail_on: Vec<u32>,
    pub pages_seen: Rc<RefCell<Vec<u32>>>,
}

impl ScriptedRecognizer {
    pub fn new(texts: &[&str]) -> Self {
        Self {
            texts: texts.iter().map(|text| (*text).to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, page: u32) -> Self {
        self.fail_on.push(page);
        self
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&self, _image: &Path, page: u32) -> Result<String, ExtractError> {
        self.pages_seen.borrow_mut().push(page);
        if self.fail_on.contains(&page) {
            return Err(ExtractError::Recognize {
                page,
                reason: "scripted failure".to_string(),
            });
        }
        let index = usize::try_from(page).expect("page fits in usize") - 1;
        Ok(self.texts.get(index).cloned().unwrap_or_default())
    }
}
