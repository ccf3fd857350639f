//! Seams to the PDF layer
//!
//! The core never parses PDF bytes itself. A [`DocumentAccessProvider`]
//! yields pages → blocks → lines → spans → glyphs with bounding boxes, and an
//! [`AnnotationWriter`] renders the final spans back into a PDF.

use pii_types::{CoordinateMaps, Highlight, Quad};
use serde::{Deserialize, Serialize};

use crate::config::{MaskMethod, MaskOptions};
use crate::error::{DocumentAccessError, PipelineError};

/// One glyph as positioned by the provider
///
/// `text` is usually one character; ligatures and combined glyphs may decode
/// to several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGlyph {
    pub text: String,
    pub bbox: Quad,
}

impl RawGlyph {
    pub fn new(text: impl Into<String>, bbox: Quad) -> Self {
        Self {
            text: text.into(),
            bbox,
        }
    }
}

/// Run of glyphs sharing one font size
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSpan {
    pub font_size: f64,
    pub glyphs: Vec<RawGlyph>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLine {
    pub spans: Vec<RawSpan>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    pub lines: Vec<RawLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    /// 0-based
    pub page_num: u32,
    pub rotation: i32,
    pub media_box: Quad,
    pub blocks: Vec<RawBlock>,
}

/// Source of positioned text and pre-existing annotations
pub trait DocumentAccessProvider {
    fn page_count(&self) -> u32;

    /// Pages in ascending order, blocks and lines in reading order
    fn get_pages(&self) -> Result<Vec<RawPage>, DocumentAccessError>;

    /// Highlight annotations already present in the PDF
    fn get_highlights(&self) -> Result<Vec<Highlight>, DocumentAccessError>;

    /// Coordinate maps embedded by a previous `mask --embed-coordinates`
    fn embedded_coordinate_maps(&self) -> Result<Option<CoordinateMaps>, DocumentAccessError> {
        Ok(None)
    }
}

/// One span to render, already resolved to per-line rectangles
#[derive(Debug, Clone, PartialEq)]
pub struct MaskAnnotation {
    pub span_id: String,
    /// 0-based
    pub page: u32,
    pub rects: Vec<Quad>,
    pub contents: Option<String>,
}

/// Everything an [`AnnotationWriter`] needs for one `mask` call
#[derive(Debug, Clone)]
pub struct MaskRequest<'a> {
    pub annotations: Vec<MaskAnnotation>,
    pub method: MaskMethod,
    pub color: [f64; 3],
    pub opacity: f64,
    pub embed: Option<&'a CoordinateMaps>,
}

impl<'a> MaskRequest<'a> {
    pub fn new(options: &MaskOptions, annotations: Vec<MaskAnnotation>) -> Self {
        Self {
            annotations,
            method: options.method,
            color: options.color,
            opacity: options.opacity,
            embed: None,
        }
    }
}

/// Renders annotations into a copy of the PDF bytes
pub trait AnnotationWriter {
    fn apply(&self, pdf: &[u8], request: &MaskRequest<'_>) -> Result<Vec<u8>, PipelineError>;
}

/// Provider over pages already held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    pub pages: Vec<RawPage>,
    pub highlights: Vec<Highlight>,
    pub embedded: Option<CoordinateMaps>,
}

impl MemoryProvider {
    pub fn new(pages: Vec<RawPage>) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }

    pub fn with_highlights(mut self, highlights: Vec<Highlight>) -> Self {
        self.highlights = highlights;
        self
    }
}

impl DocumentAccessProvider for MemoryProvider {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn get_pages(&self) -> Result<Vec<RawPage>, DocumentAccessError> {
        Ok(self.pages.clone())
    }

    fn get_highlights(&self) -> Result<Vec<Highlight>, DocumentAccessError> {
        Ok(self.highlights.clone())
    }

    fn embedded_coordinate_maps(&self) -> Result<Option<CoordinateMaps>, DocumentAccessError> {
        Ok(self.embedded.clone())
    }
}
