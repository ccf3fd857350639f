//! Font metrics and code → text decoding
//!
//! Only what glyph boxes need: advance widths and a mapping from character
//! codes to Unicode. Glyph outlines are never read.

use lopdf::{Dictionary, Document, Object};
use std::collections::HashMap;

use crate::objects::{decode_text, dict_get, name, number, resolve, resolve_array, resolve_dict};

/// Advance used when a font carries no width for a code, in text space units
pub const DEFAULT_WIDTH: f64 = 0.5;

/// Parsed `/ToUnicode` CMap
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToUnicode {
    pub code_bytes: usize,
    map: HashMap<u32, String>,
}

#[derive(Debug, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Word(String),
    ArrayStart,
    ArrayEnd,
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'<' => {
                let end = data[i + 1..]
                    .iter()
                    .position(|&b| b == b'>')
                    .map_or(data.len(), |p| i + 1 + p);
                let digits: Vec<u8> = data[i + 1..end]
                    .iter()
                    .copied()
                    .filter(u8::is_ascii_hexdigit)
                    .collect();
                let bytes = digits
                    .chunks(2)
                    .filter_map(|pair| {
                        let s = std::str::from_utf8(pair).ok()?;
                        let padded = if s.len() == 1 { format!("{}0", s) } else { s.to_string() };
                        u8::from_str_radix(&padded, 16).ok()
                    })
                    .collect();
                tokens.push(Token::Hex(bytes));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                i += 1;
            }
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < data.len()
                    && !data[i].is_ascii_whitespace()
                    && !matches!(data[i], b'<' | b'[' | b']' | b'%')
                {
                    i += 1;
                }
                tokens.push(Token::Word(String::from_utf8_lossy(&data[start..i]).into_owned()));
            }
        }
    }
    tokens
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [lo] => *lo as u16,
            _ => 0,
        })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Increment the last UTF-16 unit of a bfrange destination
fn offset_text(base: &[u8], delta: u32) -> String {
    let mut bytes = base.to_vec();
    if bytes.len() >= 2 {
        let n = bytes.len();
        let last = u16::from_be_bytes([bytes[n - 2], bytes[n - 1]]).wrapping_add(delta as u16);
        bytes[n - 2..].copy_from_slice(&last.to_be_bytes());
    } else if let Some(last) = bytes.last_mut() {
        *last = last.wrapping_add(delta as u8);
    }
    utf16_text(&bytes)
}

impl ToUnicode {
    pub fn parse(data: &[u8]) -> Self {
        let tokens = tokenize(data);
        let mut cmap = ToUnicode::default();
        let mut i = 0;

        let hex = |t: Option<&Token>| match t {
            Some(Token::Hex(bytes)) => Some(bytes.clone()),
            _ => None,
        };

        while i < tokens.len() {
            match &tokens[i] {
                Token::Word(w) if w == "begincodespacerange" => {
                    i += 1;
                    while let Some(low) = hex(tokens.get(i)) {
                        if cmap.code_bytes == 0 {
                            cmap.code_bytes = low.len();
                        }
                        i += 2;
                    }
                }
                Token::Word(w) if w == "beginbfchar" => {
                    i += 1;
                    while let (Some(src), Some(dst)) = (hex(tokens.get(i)), hex(tokens.get(i + 1))) {
                        cmap.note_width(src.len());
                        cmap.map.insert(code_of(&src), utf16_text(&dst));
                        i += 2;
                    }
                }
                Token::Word(w) if w == "beginbfrange" => {
                    i += 1;
                    while let (Some(lo), Some(hi)) = (hex(tokens.get(i)), hex(tokens.get(i + 1))) {
                        cmap.note_width(lo.len());
                        let (lo_code, hi_code) = (code_of(&lo), code_of(&hi));
                        match tokens.get(i + 2) {
                            Some(Token::Hex(dst)) => {
                                for code in lo_code..=hi_code.min(lo_code.saturating_add(0xFFFF)) {
                                    cmap.map.insert(code, offset_text(dst, code - lo_code));
                                }
                                i += 3;
                            }
                            Some(Token::ArrayStart) => {
                                i += 3;
                                let mut code = Some(lo_code);
                                while let Some(dst) = hex(tokens.get(i)) {
                                    if let Some(c) = code {
                                        cmap.map.insert(c, utf16_text(&dst));
                                        code = c.checked_add(1);
                                    }
                                    i += 1;
                                }
                                if tokens.get(i) == Some(&Token::ArrayEnd) {
                                    i += 1;
                                }
                            }
                            _ => break,
                        }
                    }
                }
                _ => i += 1,
            }
        }

        if cmap.code_bytes == 0 {
            cmap.code_bytes = 1;
        }
        cmap
    }

    fn note_width(&mut self, len: usize) {
        if self.code_bytes == 0 {
            self.code_bytes = len.max(1);
        }
    }

    pub fn get(&self, code: u32) -> Option<&str> {
        self.map.get(&code).map(String::as_str)
    }
}

/// Metrics and decoding for one font resource
#[derive(Debug, Clone, Default)]
pub struct FontInfo {
    /// Composite (Type0) fonts use two-byte codes
    pub composite: bool,
    widths: HashMap<u32, f64>,
    default_width: Option<f64>,
    pub to_unicode: Option<ToUnicode>,
}

/// One decoded character code
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCode {
    pub code: u32,
    pub text: String,
    /// Advance in text space units (1/1000 of the glyph space)
    pub width: f64,
    /// Single-byte code 32 gets word spacing
    pub is_space: bool,
}

impl FontInfo {
    pub fn load(doc: &Document, dict: &Dictionary) -> Self {
        let composite = dict_get(doc, dict, b"Subtype").and_then(name) == Some(b"Type0".as_slice());
        let mut font = FontInfo {
            composite,
            ..Default::default()
        };

        if composite {
            let descendant = dict_get(doc, dict, b"DescendantFonts")
                .and_then(|obj| resolve_array(doc, obj))
                .and_then(|items| items.first())
                .and_then(|obj| resolve_dict(doc, obj));
            if let Some(cid) = descendant {
                font.default_width = dict_get(doc, cid, b"DW").and_then(number).map(|w| w / 1000.0);
                if let Some(w) = dict_get(doc, cid, b"W").and_then(|obj| resolve_array(doc, obj)) {
                    font.load_cid_widths(doc, w);
                }
            }
            font.default_width.get_or_insert(1.0);
        } else {
            let first = dict_get(doc, dict, b"FirstChar").and_then(number).unwrap_or(0.0) as u32;
            if let Some(widths) = dict_get(doc, dict, b"Widths").and_then(|obj| resolve_array(doc, obj)) {
                for (i, w) in widths.iter().enumerate() {
                    if let Some(w) = resolve(doc, w).and_then(number) {
                        font.widths.insert(first + i as u32, w / 1000.0);
                    }
                }
            }
        }

        if let Some(Object::Stream(stream)) = dict_get(doc, dict, b"ToUnicode") {
            let data = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            font.to_unicode = Some(ToUnicode::parse(&data));
        }
        font
    }

    /// `/W` entries: `c [w1 w2 ...]` or `c_first c_last w`
    fn load_cid_widths(&mut self, doc: &Document, w: &[Object]) {
        let mut i = 0;
        while i < w.len() {
            let Some(start) = resolve(doc, &w[i]).and_then(number) else {
                break;
            };
            match w.get(i + 1).and_then(|obj| resolve(doc, obj)) {
                Some(Object::Array(list)) => {
                    for (k, width) in list.iter().filter_map(number).enumerate() {
                        self.widths.insert(start as u32 + k as u32, width / 1000.0);
                    }
                    i += 2;
                }
                Some(end) => {
                    let (Some(end), Some(width)) = (
                        number(end),
                        w.get(i + 2).and_then(|obj| resolve(doc, obj)).and_then(number),
                    ) else {
                        break;
                    };
                    for code in start as u32..=end as u32 {
                        self.widths.insert(code, width / 1000.0);
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    fn width(&self, code: u32) -> f64 {
        self.widths
            .get(&code)
            .copied()
            .or(self.default_width)
            .unwrap_or(DEFAULT_WIDTH)
    }

    fn code_bytes(&self) -> usize {
        match &self.to_unicode {
            Some(cmap) => cmap.code_bytes,
            None if self.composite => 2,
            None => 1,
        }
    }

    /// Split a shown string into codes with their text and advance
    pub fn decode(&self, bytes: &[u8]) -> Vec<DecodedCode> {
        let unmapped = self.to_unicode.is_none();

        // Without a CMap, simple-font strings go through the text fallback chain
        if unmapped && !self.composite {
            let text = decode_text(bytes);
            let single_byte = text.chars().count() == bytes.len();
            return text
                .chars()
                .zip(0..)
                .map(|(c, i)| {
                    let code = if single_byte { bytes[i] as u32 } else { c as u32 };
                    DecodedCode {
                        code,
                        text: c.to_string(),
                        width: self.width(code),
                        is_space: c == ' ',
                    }
                })
                .collect();
        }

        let n = self.code_bytes();
        bytes
            .chunks(n)
            .map(|chunk| {
                let code = code_of(chunk);
                let text = self
                    .to_unicode
                    .as_ref()
                    .and_then(|cmap| cmap.get(code))
                    .map(str::to_string)
                    .or_else(|| char::from_u32(code).map(|c| c.to_string()))
                    .unwrap_or_default();
                DecodedCode {
                    code,
                    text,
                    width: self.width(code),
                    is_space: n == 1 && code == 32,
                }
            })
            .collect()
    }
}

/// Fonts of a page's resources, by resource name
pub fn page_fonts(doc: &Document, resources: Option<&Dictionary>) -> HashMap<Vec<u8>, FontInfo> {
    let mut fonts = HashMap::new();
    let Some(font_dict) = resources
        .and_then(|res| dict_get(doc, res, b"Font"))
        .and_then(|obj| resolve_dict(doc, obj))
    else {
        return fonts;
    };
    for (key, value) in font_dict.iter() {
        if let Some(dict) = resolve_dict(doc, value) {
            fonts.insert(key.clone(), FontInfo::load(doc, dict));
        }
    }
    fonts
}
