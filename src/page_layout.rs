//! Positioned characters and ruling edges recovered from a page content stream.
//!
//! Coordinates use a top-left origin: `top`/`bottom` grow downwards from the top of
//! the page's media box.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::cmap::ToUnicodeMap;
use crate::pdf_reader::decode_pdf_bytes;

const DEFAULT_PAGE_HEIGHT: f64 = 792.0;
const AXIS_EPSILON: f64 = 0.01;
const MAX_FORM_DEPTH: usize = 8;
const MAX_PARENT_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BBox {
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
}

impl BBox {
    pub fn new(x0: f64, top: f64, x1: f64, bottom: f64) -> Self {
        Self {
            x0,
            top,
            x1,
            bottom,
        }
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            top: self.top.min(other.top),
            x1: self.x1.max(other.x1),
            bottom: self.bottom.max(other.bottom),
        }
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.top + self.bottom) / 2.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PageChar {
    pub text: char,
    pub bbox: BBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Orientation {
    Horizontal,
    Vertical,
}

/// An axis-aligned segment. Horizontal edges have `top == bottom`, vertical edges
/// have `x0 == x1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Edge {
    pub orientation: Orientation,
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
}

impl Edge {
    pub fn length(&self) -> f64 {
        match self.orientation {
            Orientation::Horizontal => self.x1 - self.x0,
            Orientation::Vertical => self.bottom - self.top,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PageLayout {
    pub chars: Vec<PageChar>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translation(tx: f64, ty: f64) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other`: apply `self` first, then `other`.
    fn then(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }
}

#[derive(Debug, Clone)]
struct FontMetrics<'a> {
    encoding: Option<&'a str>,
    first_char: i64,
    widths: Vec<f64>,
    /// CID widths from the descendant font's `/W` array.
    cid_widths: HashMap<u32, f64>,
    default_width: f64,
    two_byte: bool,
    to_unicode: Option<ToUnicodeMap>,
}

impl FontMetrics<'_> {
    fn fallback() -> Self {
        Self {
            encoding: None,
            first_char: 0,
            widths: Vec::new(),
            cid_widths: HashMap::new(),
            default_width: 500.0,
            two_byte: false,
            to_unicode: None,
        }
    }

    fn glyph_width(&self, code: u32) -> f64 {
        let width = if self.two_byte {
            self.cid_widths.get(&code).copied()
        } else {
            usize::try_from(i64::from(code) - self.first_char)
                .ok()
                .and_then(|index| self.widths.get(index).copied())
        };
        width.unwrap_or(self.default_width) / 1000.0
    }

    /// Text for one character code when the font has no usable `/ToUnicode` entry.
    fn fallback_text(&self, code: u32) -> String {
        if self.two_byte {
            return char::from_u32(code)
                .filter(|ch| !ch.is_control())
                .unwrap_or(char::REPLACEMENT_CHARACTER)
                .to_string();
        }
        let byte = u8::try_from(code).unwrap_or(b'?');
        decode_pdf_bytes(self.encoding, &[byte])
    }
}

/// Fonts and XObjects visible to one content stream.
#[derive(Default)]
struct Resources<'a> {
    fonts: BTreeMap<Vec<u8>, Rc<FontMetrics<'a>>>,
    xobjects: BTreeMap<Vec<u8>, ObjectId>,
}

impl<'a> Resources<'a> {
    fn load(document: &'a Document, resources: &'a Dictionary) -> Self {
        let fonts = sub_dictionary(document, resources, b"Font")
            .map(|fonts| {
                fonts
                    .iter()
                    .filter_map(|(name, object)| {
                        let font = resolve(document, object)?.as_dict().ok()?;
                        Some((name.clone(), Rc::new(font_metrics(document, font))))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let xobjects = sub_dictionary(document, resources, b"XObject")
            .map(|xobjects| {
                xobjects
                    .iter()
                    .filter_map(|(name, object)| {
                        object.as_reference().ok().map(|id| (name.clone(), id))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self { fonts, xobjects }
    }
}

#[derive(Debug, Clone, Copy)]
struct TextState {
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    leading: f64,
    rise: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GraphicsState {
    ctm: Matrix,
    text: TextState,
}

struct Interpreter<'a> {
    document: &'a Document,
    page_height: f64,
    page_bottom: f64,
    current_font: Option<Rc<FontMetrics<'a>>>,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    subpaths: Vec<Vec<(f64, f64)>>,
    closed: Vec<bool>,
    layout: PageLayout,
}

fn number(object: &Object) -> Option<f64> {
    object.as_float().ok().map(f64::from)
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f64; N]> {
    if operands.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, operand) in out.iter_mut().zip(operands) {
        *slot = number(operand)?;
    }
    Some(out)
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

fn sub_dictionary<'a>(
    document: &'a Document,
    dictionary: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Dictionary> {
    dictionary
        .get(key)
        .ok()
        .and_then(|object| resolve(document, object))
        .and_then(|object| object.as_dict().ok())
}

fn resolved_array<'a>(
    document: &'a Document,
    dictionary: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Vec<Object>> {
    dictionary
        .get(key)
        .ok()
        .and_then(|object| resolve(document, object))
        .and_then(|object| object.as_array().ok())
}

/// Stream bytes with any `/Filter` applied.
fn stream_bytes(stream: &Stream) -> Option<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content().ok()
    } else {
        Some(stream.content.clone())
    }
}

/// Parses a CID font `/W` array: `c [w1 w2 ...]` and `c_first c_last w` entries.
fn parse_cid_widths(document: &Document, items: &[Object]) -> HashMap<u32, f64> {
    let mut widths = HashMap::new();
    let mut index = 0;
    while index < items.len() {
        let Some(first) = resolve(document, &items[index])
            .and_then(|object| object.as_i64().ok())
            .and_then(|value| u32::try_from(value).ok())
        else {
            break;
        };

        match items.get(index + 1).and_then(|item| resolve(document, item)) {
            Some(Object::Array(list)) => {
                for (offset, width) in list.iter().enumerate() {
                    let (Ok(offset), Some(width)) =
                        (u32::try_from(offset), resolve(document, width).and_then(number))
                    else {
                        continue;
                    };
                    widths.insert(first.saturating_add(offset), width);
                }
                index += 2;
            }
            Some(last) => {
                let last = last.as_i64().ok().and_then(|value| u32::try_from(value).ok());
                let width = items
                    .get(index + 2)
                    .and_then(|item| resolve(document, item))
                    .and_then(number);
                let (Some(last), Some(width)) = (last, width) else {
                    break;
                };
                // CIDs are 16-bit; clamp ranges from damaged files.
                for cid in first..=last.min(first.saturating_add(u32::from(u16::MAX))) {
                    widths.insert(cid, width);
                }
                index += 3;
            }
            None => break,
        }
    }
    widths
}

fn font_metrics<'a>(document: &'a Document, font: &'a Dictionary) -> FontMetrics<'a> {
    let subtype = font
        .get(b"Subtype")
        .and_then(Object::as_name_str)
        .unwrap_or_default();
    let base_font = font
        .get(b"BaseFont")
        .and_then(Object::as_name_str)
        .unwrap_or_default();
    let encoding = font.get_font_encoding();
    let two_byte = subtype == "Type0" || encoding.contains("Identity");

    let widths = resolved_array(document, font, b"Widths")
        .map(|items| {
            items
                .iter()
                .map(|item| resolve(document, item).and_then(number).unwrap_or(0.0))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let descendant = resolved_array(document, font, b"DescendantFonts")
        .and_then(|fonts| fonts.first())
        .and_then(|object| resolve(document, object))
        .and_then(|object| object.as_dict().ok());
    let cid_widths = descendant
        .and_then(|descendant| resolved_array(document, descendant, b"W"))
        .map(|items| parse_cid_widths(document, items))
        .unwrap_or_default();

    let default_width = if two_byte {
        descendant
            .and_then(|descendant| descendant.get(b"DW").ok())
            .and_then(|object| resolve(document, object))
            .and_then(number)
            .unwrap_or(1000.0)
    } else if base_font.contains("Courier") {
        600.0
    } else {
        500.0
    };

    let to_unicode = font
        .get(b"ToUnicode")
        .ok()
        .and_then(|object| resolve(document, object))
        .and_then(|object| object.as_stream().ok())
        .and_then(stream_bytes)
        .map(|bytes| ToUnicodeMap::parse(&bytes))
        .filter(|map| !map.is_empty());

    FontMetrics {
        encoding: Some(encoding),
        first_char: font
            .get(b"FirstChar")
            .and_then(Object::as_i64)
            .unwrap_or(0),
        widths,
        cid_widths,
        default_width,
        two_byte,
        to_unicode,
    }
}

/// The page's `/Resources`, inherited from the nearest ancestor that defines it.
fn page_resources(document: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = Some(page_id);
    for _ in 0..MAX_PARENT_DEPTH {
        let dictionary = document.get_dictionary(current?).ok()?;
        if let Some(resources) = sub_dictionary(document, dictionary, b"Resources") {
            return Some(resources);
        }
        current = dictionary
            .get(b"Parent")
            .and_then(Object::as_reference)
            .ok();
    }
    None
}

/// Height and bottom offset of the page's media box, following `Parent` links for
/// inherited values.
fn media_box(document: &Document, page_id: ObjectId) -> (f64, f64) {
    let mut current = Some(page_id);
    let mut depth = 0;
    while let Some(id) = current {
        if depth > MAX_PARENT_DEPTH {
            break;
        }
        depth += 1;

        let Ok(dictionary) = document.get_dictionary(id) else {
            break;
        };
        let rect = dictionary
            .get(b"MediaBox")
            .ok()
            .and_then(|object| resolve(document, object))
            .and_then(|object| object.as_array().ok())
            .and_then(|items| {
                let values = items
                    .iter()
                    .filter_map(|item| resolve(document, item).and_then(number))
                    .collect::<Vec<_>>();
                (values.len() == 4).then(|| (values[1], values[3]))
            });
        if let Some((y1, y2)) = rect {
            return ((y2 - y1).abs(), y1.min(y2));
        }
        current = dictionary
            .get(b"Parent")
            .and_then(Object::as_reference)
            .ok();
    }
    (DEFAULT_PAGE_HEIGHT, 0.0)
}

impl<'a> Interpreter<'a> {
    fn new(document: &'a Document, page_id: ObjectId) -> Self {
        let (page_height, page_bottom) = media_box(document, page_id);

        Self {
            document,
            page_height,
            page_bottom,
            current_font: None,
            state: GraphicsState {
                ctm: Matrix::IDENTITY,
                text: TextState::default(),
            },
            stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            subpaths: Vec::new(),
            closed: Vec::new(),
            layout: PageLayout::default(),
        }
    }

    fn to_top(&self, y: f64) -> f64 {
        self.page_height - (y - self.page_bottom)
    }

    fn run(&mut self, operations: &[Operation], resources: &Resources<'a>, depth: usize) {
        for operation in operations {
            let operands = operation.operands.as_slice();
            match operation.operator.as_str() {
                "q" => self.stack.push(self.state),
                "Q" => {
                    if let Some(state) = self.stack.pop() {
                        self.state = state;
                    }
                }
                "cm" => {
                    if let Some(values) = numbers::<6>(operands) {
                        self.state.ctm = Matrix(values).then(&self.state.ctm);
                    }
                }
                "BT" => {
                    self.text_matrix = Matrix::IDENTITY;
                    self.line_matrix = Matrix::IDENTITY;
                }
                "Tf" => {
                    self.current_font = operands
                        .first()
                        .and_then(|operand| operand.as_name().ok())
                        .and_then(|name| resources.fonts.get(name))
                        .cloned();
                    if let Some(size) = operands.get(1).and_then(number) {
                        self.state.text.font_size = size;
                    }
                }
                "Tc" => {
                    if let Some([value]) = numbers::<1>(operands) {
                        self.state.text.char_spacing = value;
                    }
                }
                "Tw" => {
                    if let Some([value]) = numbers::<1>(operands) {
                        self.state.text.word_spacing = value;
                    }
                }
                "Tz" => {
                    if let Some([value]) = numbers::<1>(operands) {
                        self.state.text.horizontal_scale = value / 100.0;
                    }
                }
                "TL" => {
                    if let Some([value]) = numbers::<1>(operands) {
                        self.state.text.leading = value;
                    }
                }
                "Ts" => {
                    if let Some([value]) = numbers::<1>(operands) {
                        self.state.text.rise = value;
                    }
                }
                "Td" => {
                    if let Some([tx, ty]) = numbers::<2>(operands) {
                        self.move_line(tx, ty);
                    }
                }
                "TD" => {
                    if let Some([tx, ty]) = numbers::<2>(operands) {
                        self.state.text.leading = -ty;
                        self.move_line(tx, ty);
                    }
                }
                "Tm" => {
                    if let Some(values) = numbers::<6>(operands) {
                        self.text_matrix = Matrix(values);
                        self.line_matrix = self.text_matrix;
                    }
                }
                "T*" => self.next_line(),
                "Tj" => self.show_operands(operands),
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        for item in items {
                            match item {
                                Object::String(bytes, _) => self.show_string(bytes),
                                other => {
                                    if let Some(adjust) = number(other) {
                                        self.advance(-adjust / 1000.0 * self.state.text.font_size);
                                    }
                                }
                            }
                        }
                    }
                }
                "'" => {
                    self.next_line();
                    self.show_operands(operands);
                }
                "\"" => {
                    if let Some([word_spacing, char_spacing]) = numbers::<2>(operands) {
                        self.state.text.word_spacing = word_spacing;
                        self.state.text.char_spacing = char_spacing;
                    }
                    self.next_line();
                    self.show_operands(operands.get(2..).unwrap_or_default());
                }
                "m" => {
                    if let Some([x, y]) = numbers::<2>(operands) {
                        let point = self.state.ctm.apply(x, y);
                        self.subpaths.push(vec![point]);
                        self.closed.push(false);
                    }
                }
                "l" => {
                    if let Some([x, y]) = numbers::<2>(operands) {
                        let point = self.state.ctm.apply(x, y);
                        match self.subpaths.last_mut() {
                            Some(path) => path.push(point),
                            None => {
                                self.subpaths.push(vec![point]);
                                self.closed.push(false);
                            }
                        }
                    }
                }
                "c" | "v" | "y" => {
                    // Curves never form table rulings; only the end point matters.
                    let values = operands.iter().filter_map(number).collect::<Vec<_>>();
                    if let [.., x, y] = values.as_slice() {
                        let point = self.state.ctm.apply(*x, *y);
                        self.subpaths.push(vec![point]);
                        self.closed.push(false);
                    }
                }
                "re" => {
                    if let Some([x, y, w, h]) = numbers::<4>(operands) {
                        let ctm = self.state.ctm;
                        self.subpaths.push(vec![
                            ctm.apply(x, y),
                            ctm.apply(x + w, y),
                            ctm.apply(x + w, y + h),
                            ctm.apply(x, y + h),
                        ]);
                        self.closed.push(true);
                    }
                }
                "h" => {
                    if let Some(flag) = self.closed.last_mut() {
                        *flag = true;
                    }
                }
                "S" | "f" | "F" | "f*" | "B" | "B*" => self.paint(false),
                "s" | "b" | "b*" => self.paint(true),
                "n" => {
                    self.subpaths.clear();
                    self.closed.clear();
                }
                "Do" => {
                    if let Some(name) = operands.first().and_then(|operand| operand.as_name().ok())
                    {
                        self.draw_xobject(name, resources, depth);
                    }
                }
                _ => {}
            }
        }
    }

    /// Runs a form XObject's content under its `/Matrix`, restoring the graphics
    /// state afterwards. Image XObjects carry no text or rulings and are skipped.
    fn draw_xobject(&mut self, name: &[u8], resources: &Resources<'a>, depth: usize) {
        let document = self.document;
        let Some(stream) = resources
            .xobjects
            .get(name)
            .and_then(|id| document.get_object(*id).ok())
            .and_then(|object| object.as_stream().ok())
        else {
            return;
        };
        let is_form = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name_str)
            .is_ok_and(|subtype| subtype == "Form");
        if !is_form {
            return;
        }
        if depth >= MAX_FORM_DEPTH {
            debug!(
                xobject = %String::from_utf8_lossy(name),
                depth, "form nesting too deep; skipping"
            );
            return;
        }

        let Some(content) = stream_bytes(stream).and_then(|bytes| Content::decode(&bytes).ok())
        else {
            debug!(xobject = %String::from_utf8_lossy(name), "undecodable form content");
            return;
        };
        let own_resources = sub_dictionary(document, &stream.dict, b"Resources")
            .map(|dictionary| Resources::load(document, dictionary));

        let saved = self.state;
        let saved_font = self.current_font.clone();
        if let Some(values) =
            resolved_array(document, &stream.dict, b"Matrix").and_then(|items| numbers::<6>(items))
        {
            self.state.ctm = Matrix(values).then(&self.state.ctm);
        }
        self.run(
            &content.operations,
            own_resources.as_ref().unwrap_or(resources),
            depth + 1,
        );
        self.state = saved;
        self.current_font = saved_font;
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = Matrix::translation(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.state.text.leading;
        self.move_line(0.0, -leading);
    }

    fn advance(&mut self, tx: f64) {
        let scaled = tx * self.state.text.horizontal_scale;
        self.text_matrix = Matrix::translation(scaled, 0.0).then(&self.text_matrix);
    }

    fn show_operands(&mut self, operands: &[Object]) {
        for operand in operands {
            if let Object::String(bytes, _) = operand {
                self.show_string(bytes);
            }
        }
    }

    fn show_string(&mut self, bytes: &[u8]) {
        let metrics = self
            .current_font
            .clone()
            .unwrap_or_else(|| Rc::new(FontMetrics::fallback()));
        let text_state = self.state.text;

        let codes: Vec<u32> = if metrics.two_byte {
            bytes
                .chunks(2)
                .map(|pair| pair.iter().fold(0_u32, |acc, byte| (acc << 8) | u32::from(*byte)))
                .collect()
        } else {
            bytes.iter().map(|byte| u32::from(*byte)).collect()
        };
        if codes.is_empty() {
            return;
        }

        let mut glyph_boxes = Vec::with_capacity(codes.len());
        for code in &codes {
            let width = metrics.glyph_width(*code) * text_state.font_size;
            glyph_boxes.push(self.glyph_bbox(width));
            let mut tx = width + text_state.char_spacing;
            if !metrics.two_byte && *code == 32 {
                tx += text_state.word_spacing;
            }
            self.advance(tx);
        }

        // Per-glyph text: each character of a multi-char mapping shares its glyph's box.
        if metrics.to_unicode.is_some() || metrics.two_byte {
            for (code, bbox) in codes.iter().zip(glyph_boxes) {
                let text = metrics
                    .to_unicode
                    .as_ref()
                    .and_then(|map| map.lookup(*code))
                    .map_or_else(|| metrics.fallback_text(*code), str::to_string);
                for ch in text.chars() {
                    self.layout.chars.push(PageChar { text: ch, bbox });
                }
            }
            return;
        }

        let decoded = decode_pdf_bytes(metrics.encoding, bytes)
            .chars()
            .collect::<Vec<_>>();

        if decoded.len() == glyph_boxes.len() {
            for (text, bbox) in decoded.into_iter().zip(glyph_boxes) {
                self.layout.chars.push(PageChar { text, bbox });
            }
            return;
        }

        // Decoding changed the glyph count; spread the run evenly over the decoded
        // characters instead.
        let Some(run) = glyph_boxes
            .iter()
            .copied()
            .reduce(|acc, bbox| acc.union(&bbox))
        else {
            return;
        };
        let count = decoded.len().max(1) as f64;
        let step = (run.x1 - run.x0) / count;
        for (index, text) in decoded.into_iter().enumerate() {
            let x0 = run.x0 + step * index as f64;
            self.layout.chars.push(PageChar {
                text,
                bbox: BBox::new(x0, run.top, x0 + step, run.bottom),
            });
        }
    }

    fn glyph_bbox(&self, width: f64) -> BBox {
        let text_state = self.state.text;
        let render = Matrix([
            text_state.font_size * text_state.horizontal_scale,
            0.0,
            0.0,
            text_state.font_size,
            0.0,
            text_state.rise,
        ])
        .then(&self.text_matrix)
        .then(&self.state.ctm);
        let glyph_width = if text_state.font_size.abs() > f64::EPSILON {
            width / text_state.font_size
        } else {
            0.0
        };

        let corners = [
            render.apply(0.0, 0.0),
            render.apply(glyph_width, 0.0),
            render.apply(0.0, 1.0),
            render.apply(glyph_width, 1.0),
        ];
        let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        BBox::new(min_x, self.to_top(max_y), max_x, self.to_top(min_y))
    }

    fn paint(&mut self, close_all: bool) {
        let subpaths = std::mem::take(&mut self.subpaths);
        let closed = std::mem::take(&mut self.closed);
        for (points, is_closed) in subpaths.iter().zip(closed) {
            for pair in points.windows(2) {
                self.push_segment(pair[0], pair[1]);
            }
            if (is_closed || close_all) && points.len() > 2 {
                if let (Some(first), Some(last)) = (points.first(), points.last()) {
                    self.push_segment(*last, *first);
                }
            }
        }
    }

    fn push_segment(&mut self, from: (f64, f64), to: (f64, f64)) {
        let (x_a, top_a) = (from.0, self.to_top(from.1));
        let (x_b, top_b) = (to.0, self.to_top(to.1));

        let edge = if (top_a - top_b).abs() < AXIS_EPSILON {
            Edge {
                orientation: Orientation::Horizontal,
                x0: x_a.min(x_b),
                top: top_a,
                x1: x_a.max(x_b),
                bottom: top_a,
            }
        } else if (x_a - x_b).abs() < AXIS_EPSILON {
            Edge {
                orientation: Orientation::Vertical,
                x0: x_a,
                top: top_a.min(top_b),
                x1: x_a,
                bottom: top_a.max(top_b),
            }
        } else {
            return;
        };

        if edge.length() > 0.0 {
            self.layout.edges.push(edge);
        }
    }
}

/// Interprets the page's content stream into characters and axis-aligned edges.
pub(crate) fn read_page_layout(
    document: &Document,
    page_id: ObjectId,
    page_number: u32,
) -> Result<PageLayout, crate::ExtractError> {
    let raw_content =
        document
            .get_page_content(page_id)
            .map_err(|error| crate::ExtractError::PdfContent {
                page: page_number,
                reason: error.to_string(),
            })?;
    let content =
        Content::decode(&raw_content).map_err(|error| crate::ExtractError::PdfContent {
            page: page_number,
            reason: error.to_string(),
        })?;

    let resources = page_resources(document, page_id)
        .map(|dictionary| Resources::load(document, dictionary))
        .unwrap_or_default();
    let mut interpreter = Interpreter::new(document, page_id);
    interpreter.run(&content.operations, &resources, 0);
    Ok(interpreter.layout)
}

#[cfg(test)]
mod tests {
    use super::{Matrix, Orientation, read_page_layout};
    use lopdf::content::{Content, Operation};
    use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};

    fn content_stream(operations: Vec<Operation>) -> Stream {
        let content = Content { operations };
        Stream::new(
            dictionary! {},
            content.encode().expect("content should encode"),
        )
    }

    fn add_page(doc: &mut Document, operations: Vec<Operation>, resources: Dictionary) -> ObjectId {
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(content_stream(operations));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 600.into(), 800.into()],
            }),
        );
        page_id
    }

    fn courier(doc: &mut Document) -> ObjectId {
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        })
    }

    fn single_page(operations: Vec<Operation>) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let font_id = courier(&mut doc);
        let page_id = add_page(
            &mut doc,
            operations,
            dictionary! { "Font" => dictionary! { "F1" => font_id } },
        );
        (doc, page_id)
    }

    fn stroked_box(x: i64, y: i64, width: i64, height: i64) -> Vec<Operation> {
        vec![
            Operation::new(
                "re",
                vec![x.into(), y.into(), width.into(), height.into()],
            ),
            Operation::new("S", vec![]),
        ]
    }

    #[test]
    fn concatenates_matrices_in_pdf_order() {
        let scale = Matrix([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
        let shift = Matrix::translation(10.0, 5.0);
        assert_eq!(scale.then(&shift).apply(1.0, 1.0), (12.0, 7.0));
        assert_eq!(shift.then(&scale).apply(1.0, 1.0), (22.0, 12.0));
    }

    #[test]
    fn places_courier_glyphs_with_top_left_origin() {
        let (doc, page_id) = single_page(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![100.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal("AB")]),
            Operation::new("ET", vec![]),
        ]);

        let layout = read_page_layout(&doc, page_id, 1).expect("layout should be read");
        assert_eq!(layout.chars.len(), 2);
        let first = &layout.chars[0];
        let second = &layout.chars[1];
        assert_eq!(first.text, 'A');
        assert!((first.bbox.x0 - 100.0).abs() < 1e-6);
        assert!((second.bbox.x0 - 106.0).abs() < 1e-6);
        assert!((first.bbox.bottom - 100.0).abs() < 1e-6);
        assert!((first.bbox.top - 90.0).abs() < 1e-6);
    }

    #[test]
    fn maps_identity_h_glyph_ids_through_to_unicode() {
        let mut doc = Document::with_version("1.5");
        let cmap_id = doc.add_object(Stream::new(
            dictionary! {},
            b"begincmap\n2 beginbfchar\n<0003> <0049>\n<0004> <FB01>\nendbfchar\nendcmap".to_vec(),
        ));
        let descendant_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => "Subset+Sans",
            "DW" => 700,
            "W" => Object::Array(vec![
                Object::Integer(3),
                Object::Array(vec![Object::Integer(250)]),
            ]),
        });
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "Subset+Sans",
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![descendant_id.into()],
            "ToUnicode" => cmap_id,
        });
        let page_id = add_page(
            &mut doc,
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F2".into(), 10.into()]),
                Operation::new("Td", vec![100.into(), 700.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        vec![0x00, 0x03, 0x00, 0x04, 0x00, 0x03],
                        StringFormat::Hexadecimal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ],
            dictionary! { "Font" => dictionary! { "F2" => font_id } },
        );

        let layout = read_page_layout(&doc, page_id, 1).expect("layout should be read");
        let text = layout.chars.iter().map(|ch| ch.text).collect::<String>();
        assert_eq!(text, "I\u{FB01}I");

        // Glyph 3 is 250 units wide from /W; glyph 4 falls back to /DW 700.
        let starts = layout.chars.iter().map(|ch| ch.bbox.x0).collect::<Vec<_>>();
        assert!((starts[1] - 102.5).abs() < 1e-6);
        assert!((starts[2] - 109.5).abs() < 1e-6);
    }

    #[test]
    fn reads_cid_width_ranges() {
        let doc = Document::with_version("1.5");
        let items = vec![
            Object::Integer(1),
            Object::Array(vec![Object::Integer(100), Object::Integer(200)]),
            Object::Integer(10),
            Object::Integer(12),
            Object::Integer(300),
        ];
        let widths = super::parse_cid_widths(&doc, &items);
        assert_eq!(widths.get(&1), Some(&100.0));
        assert_eq!(widths.get(&2), Some(&200.0));
        assert_eq!(widths.get(&11), Some(&300.0));
        assert_eq!(widths.get(&13), None);
    }

    #[test]
    fn descends_into_form_xobjects() {
        let mut doc = Document::with_version("1.5");
        let font_id = courier(&mut doc);
        let mut form_operations = stroked_box(0, 0, 100, 50);
        form_operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F9".into(), 10.into()]),
            Operation::new("Td", vec![10.into(), 20.into()]),
            Operation::new("Tj", vec![Object::string_literal("X")]),
            Operation::new("ET", vec![]),
        ]);
        let mut form = content_stream(form_operations);
        form.dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 100.into(), 50.into()],
            "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 200.into(), 300.into()],
            "Resources" => dictionary! { "Font" => dictionary! { "F9" => font_id } },
        };
        let form_id = doc.add_object(form);
        let page_id = add_page(
            &mut doc,
            vec![Operation::new("Do", vec!["Fm0".into()])],
            dictionary! { "XObject" => dictionary! { "Fm0" => form_id } },
        );

        let layout = read_page_layout(&doc, page_id, 1).expect("layout should be read");
        assert_eq!(layout.edges.len(), 4);
        assert!(
            layout
                .edges
                .iter()
                .any(|edge| (edge.x0 - 200.0).abs() < 1e-6 && (edge.x1 - 300.0).abs() < 1e-6)
        );
        assert_eq!(layout.chars.len(), 1);
        assert_eq!(layout.chars[0].text, 'X');
        assert!((layout.chars[0].bbox.x0 - 210.0).abs() < 1e-6);
        assert!((layout.chars[0].bbox.bottom - 480.0).abs() < 1e-6);
    }

    #[test]
    fn restores_state_after_form_and_stops_self_reference() {
        let mut doc = Document::with_version("1.5");
        let form_id = doc.new_object_id();
        let mut form = content_stream(vec![
            Operation::new("cm", vec![1.into(), 0.into(), 0.into(), 1.into(), 5.into(), 0.into()]),
            Operation::new("Do", vec!["Loop".into()]),
        ]);
        form.dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "Resources" => dictionary! { "XObject" => dictionary! { "Loop" => form_id } },
        };
        doc.objects.insert(form_id, Object::Stream(form));

        let mut operations = vec![Operation::new("Do", vec!["Loop".into()])];
        operations.extend(stroked_box(10, 10, 20, 20));
        let page_id = add_page(
            &mut doc,
            operations,
            dictionary! { "XObject" => dictionary! { "Loop" => form_id } },
        );

        let layout = read_page_layout(&doc, page_id, 1).expect("layout should be read");
        assert_eq!(layout.edges.len(), 4);
        assert!(layout.edges.iter().all(|edge| edge.x0 >= 10.0 - 1e-6));
        assert!(layout.edges.iter().any(|edge| (edge.x0 - 10.0).abs() < 1e-6));
    }

    #[test]
    fn turns_stroked_rectangles_into_edges() {
        let mut operations = stroked_box(50, 600, 200, 100);
        operations.extend([
            Operation::new("m", vec![0.into(), 0.into()]),
            Operation::new("l", vec![30.into(), 40.into()]),
            Operation::new("S", vec![]),
        ]);
        let (doc, page_id) = single_page(operations);

        let layout = read_page_layout(&doc, page_id, 1).expect("layout should be read");
        let horizontal = layout
            .edges
            .iter()
            .filter(|edge| edge.orientation == Orientation::Horizontal)
            .count();
        let vertical = layout
            .edges
            .iter()
            .filter(|edge| edge.orientation == Orientation::Vertical)
            .count();
        assert_eq!(horizontal, 2);
        assert_eq!(vertical, 2);
        assert!(
            layout
                .edges
                .iter()
                .any(|edge| (edge.top - 100.0).abs() < 1e-6 && (edge.x1 - 250.0).abs() < 1e-6)
        );
    }

    #[test]
    fn discards_unpainted_paths() {
        let (doc, page_id) = single_page(vec![
            Operation::new("re", vec![0.into(), 0.into(), 10.into(), 10.into()]),
            Operation::new("W", vec![]),
            Operation::new("n", vec![]),
        ]);

        let layout = read_page_layout(&doc, page_id, 1).expect("layout should be read");
        assert!(layout.edges.is_empty());
    }
}
