//! Content stream walker
//!
//! Tracks just enough graphics and text state to place every shown glyph on
//! the page. Each `BT`..`ET` object becomes one block; glyphs whose baseline
//! moves by more than half a glyph height start a new line.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object};
use pii_core::{RawBlock, RawGlyph, RawLine, RawSpan};
use pii_types::Quad;
use std::collections::HashMap;
use tracing::{debug, trace};

use crate::fonts::{DecodedCode, FontInfo};
use crate::objects::number;

/// `[a b c d e f]`, row-vector convention as in the PDF reference
pub type Matrix = [f64; 6];

pub const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `m1 × m2`: apply `m1` first, then `m2`
pub fn multiply(m1: &Matrix, m2: &Matrix) -> Matrix {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

pub fn transform(m: &Matrix, x: f64, y: f64) -> (f64, f64) {
    (x * m[0] + y * m[2] + m[4], x * m[1] + y * m[3] + m[5])
}

fn translate(tx: f64, ty: f64) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

/// Glyph box in unscaled text space: descender to ascender
const DESCENT: f64 = -0.2;
const ASCENT: f64 = 0.8;

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Option<Vec<u8>>,
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    h_scale: f64,
    leading: f64,
    rise: f64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

struct LineState {
    baseline: f64,
    line: RawLine,
}

/// Collects glyphs of the open text object into lines and spans
#[derive(Default)]
struct BlockCollector {
    lines: Vec<RawLine>,
    current: Option<LineState>,
}

impl BlockCollector {
    fn push(&mut self, glyph: RawGlyph, baseline: f64, font_size: f64) {
        let height = glyph.bbox.height();
        let breaks = match &self.current {
            Some(state) => (baseline - state.baseline).abs() > 0.5 * height,
            None => true,
        };
        if breaks {
            self.finish_line();
            self.current = Some(LineState {
                baseline,
                line: RawLine::default(),
            });
        }
        let Some(state) = self.current.as_mut() else {
            return;
        };
        let same_size = state
            .line
            .spans
            .last()
            .is_some_and(|span| (span.font_size - font_size).abs() < 1e-6);
        if !same_size {
            state.line.spans.push(RawSpan {
                font_size,
                glyphs: Vec::new(),
            });
        }
        if let Some(span) = state.line.spans.last_mut() {
            span.glyphs.push(glyph);
        }
    }

    fn finish_line(&mut self) {
        if let Some(state) = self.current.take() {
            if !state.line.spans.is_empty() {
                self.lines.push(state.line);
            }
        }
    }

    fn finish(mut self) -> Option<RawBlock> {
        self.finish_line();
        (!self.lines.is_empty()).then_some(RawBlock { lines: self.lines })
    }
}

/// Walks one page's content stream
pub struct TextWalker<'a> {
    fonts: &'a HashMap<Vec<u8>, FontInfo>,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    tm: Matrix,
    tlm: Matrix,
    block: Option<BlockCollector>,
    blocks: Vec<RawBlock>,
}

impl<'a> TextWalker<'a> {
    pub fn new(fonts: &'a HashMap<Vec<u8>, FontInfo>) -> Self {
        Self {
            fonts,
            state: GraphicsState::default(),
            stack: Vec::new(),
            tm: IDENTITY,
            tlm: IDENTITY,
            block: None,
            blocks: Vec::new(),
        }
    }

    /// Decode and walk a content stream, returning its text blocks
    pub fn walk(mut self, data: &[u8]) -> Result<Vec<RawBlock>, lopdf::Error> {
        let content = Content::decode(data)?;
        for op in &content.operations {
            self.apply(op);
        }
        // Unterminated text object
        self.end_text();
        debug!(blocks = self.blocks.len(), "walked content stream");
        Ok(self.blocks)
    }

    fn apply(&mut self, op: &Operation) {
        let nums: Vec<f64> = op.operands.iter().filter_map(number).collect();
        match op.operator.as_str() {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(state) = self.stack.pop() {
                    self.state = state;
                }
            }
            "cm" if nums.len() == 6 => {
                let m = [nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]];
                self.state.ctm = multiply(&m, &self.state.ctm);
            }
            "BT" => {
                self.end_text();
                self.tm = IDENTITY;
                self.tlm = IDENTITY;
                self.block = Some(BlockCollector::default());
            }
            "ET" => self.end_text(),
            "Tf" => {
                if let Some(Object::Name(font)) = op.operands.first() {
                    self.state.font = Some(font.clone());
                }
                if let Some(size) = op.operands.get(1).and_then(number) {
                    self.state.font_size = size;
                }
            }
            "Tc" if !nums.is_empty() => self.state.char_spacing = nums[0],
            "Tw" if !nums.is_empty() => self.state.word_spacing = nums[0],
            "Tz" if !nums.is_empty() => self.state.h_scale = nums[0] / 100.0,
            "TL" if !nums.is_empty() => self.state.leading = nums[0],
            "Ts" if !nums.is_empty() => self.state.rise = nums[0],
            "Td" if nums.len() == 2 => self.move_line(nums[0], nums[1]),
            "TD" if nums.len() == 2 => {
                self.state.leading = -nums[1];
                self.move_line(nums[0], nums[1]);
            }
            "Tm" if nums.len() == 6 => {
                self.tm = [nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]];
                self.tlm = self.tm;
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    self.show(bytes);
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    self.show(bytes);
                }
            }
            "\"" => {
                if nums.len() >= 2 {
                    self.state.word_spacing = nums[0];
                    self.state.char_spacing = nums[1];
                }
                self.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                    self.show(bytes);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(bytes),
                            other => {
                                if let Some(adjust) = number(other) {
                                    let tx = -adjust / 1000.0
                                        * self.state.font_size
                                        * self.state.h_scale;
                                    self.advance(tx);
                                }
                            }
                        }
                    }
                }
            }
            "Do" => trace!("form XObject skipped"),
            _ => {}
        }
    }

    fn end_text(&mut self) {
        if let Some(block) = self.block.take().and_then(BlockCollector::finish) {
            self.blocks.push(block);
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.tlm = multiply(&translate(tx, ty), &self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.state.leading);
    }

    fn advance(&mut self, tx: f64) {
        self.tm = multiply(&translate(tx, 0.0), &self.tm);
    }

    fn show(&mut self, bytes: &[u8]) {
        let codes = match self.state.font.as_ref().and_then(|f| self.fonts.get(f)) {
            Some(font) => font.decode(bytes),
            None => FontInfo::default().decode(bytes),
        };
        for code in codes {
            self.show_code(&code);
        }
    }

    fn show_code(&mut self, code: &DecodedCode) {
        let size = self.state.font_size;
        let h = self.state.h_scale;
        let trm = multiply(
            &multiply(&[size * h, 0.0, 0.0, size, 0.0, self.state.rise], &self.tm),
            &self.state.ctm,
        );

        let corners = [
            transform(&trm, 0.0, DESCENT),
            transform(&trm, code.width, DESCENT),
            transform(&trm, 0.0, ASCENT),
            transform(&trm, code.width, ASCENT),
        ];
        let xs = corners.iter().map(|c| c.0);
        let ys = corners.iter().map(|c| c.1);
        let bbox = Quad::new(
            xs.clone().fold(f64::INFINITY, f64::min),
            ys.clone().fold(f64::INFINITY, f64::min),
            xs.fold(f64::NEG_INFINITY, f64::max),
            ys.fold(f64::NEG_INFINITY, f64::max),
        );
        let (_, baseline) = transform(&trm, 0.0, 0.0);
        let effective_size = (trm[2] * trm[2] + trm[3] * trm[3]).sqrt();

        if !code.text.is_empty() {
            if let Some(block) = self.block.as_mut() {
                block.push(RawGlyph::new(code.text.clone(), bbox), baseline, effective_size);
            }
        }

        let word = if code.is_space { self.state.word_spacing } else { 0.0 };
        let tx = (code.width * size + self.state.char_spacing + word) * h;
        self.advance(tx);
    }
}

/// Text blocks of one page
pub fn page_blocks(
    doc: &Document,
    page_id: lopdf::ObjectId,
    fonts: &HashMap<Vec<u8>, FontInfo>,
) -> Result<Vec<RawBlock>, lopdf::Error> {
    let data = doc.get_page_content(page_id)?;
    TextWalker::new(fonts).walk(&data)
}
