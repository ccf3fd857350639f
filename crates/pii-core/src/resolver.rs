//! Detector-local offsets → canonical positions → per-line rectangles
//!
//! Lines are not part of the public address scheme. Every line transition
//! inside a block is exactly one `'\n'` in its text, so splitting a span's
//! slice of the character index on newline characters recovers its lines.
//! Newline quads themselves never contribute to a rectangle.

use pii_types::{BlockAddress, OffsetCoordinateMap, PositionRef, Quad, ReadDocument, SchemaError, Span};

/// Rectangles covering one span, one per source line, in reading order
pub fn line_rects(text: &str, quads: &[Quad], start: usize, end: usize) -> Vec<Quad> {
    let mut rects = Vec::new();
    let mut current: Option<Quad> = None;

    let chars = text.chars().skip(start).take(end.saturating_sub(start));
    for (c, quad) in chars.zip(quads.iter().skip(start)) {
        if c == '\n' {
            rects.extend(current.take());
            continue;
        }
        current = Some(match current {
            Some(rect) => rect.union(quad),
            None => *quad,
        });
    }
    rects.extend(current);
    rects
}

/// One block's place inside a concatenated detector input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub block: BlockAddress,
    /// Char offset of the block's first character in the concatenation
    pub start: usize,
    /// Length of the block in chars
    pub len: usize,
}

/// Layout of several blocks joined by a separator for one detector call
#[derive(Debug, Clone, Default)]
pub struct BatchLayout {
    pub text: String,
    segments: Vec<Segment>,
}

impl BatchLayout {
    pub fn new<'a, I>(blocks: I, separator: &str) -> Self
    where
        I: IntoIterator<Item = (BlockAddress, &'a str)>,
    {
        let separator_len = separator.chars().count();
        let mut layout = BatchLayout::default();
        let mut cursor = 0usize;
        for (i, (block, text)) in blocks.into_iter().enumerate() {
            if i > 0 {
                layout.text.push_str(separator);
                cursor += separator_len;
            }
            let len = text.chars().count();
            layout.text.push_str(text);
            layout.segments.push(Segment {
                block,
                start: cursor,
                len,
            });
            cursor += len;
        }
        layout
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Map a local `[start, end)` to a block and block-relative offsets
    ///
    /// `None` when the range touches a separator or crosses into another
    /// block.
    pub fn locate(&self, start: usize, end: usize) -> Option<(PositionRef, PositionRef)> {
        let idx = self
            .segments
            .partition_point(|segment| segment.start <= start);
        let segment = self.segments.get(idx.checked_sub(1)?)?;
        if start >= segment.start + segment.len || end > segment.start + segment.len || end <= start
        {
            return None;
        }
        Some((
            segment.block.at(start - segment.start),
            segment.block.at(end - segment.start),
        ))
    }
}

/// Resolves spans of one document to geometry
pub struct SpanResolver<'a> {
    doc: &'a ReadDocument,
    forward: &'a OffsetCoordinateMap,
}

impl<'a> SpanResolver<'a> {
    /// Fails when the document carries no `offset2coordsMap`
    pub fn new(doc: &'a ReadDocument) -> Result<Self, SchemaError> {
        let forward = doc.offset_to_coords.as_ref().ok_or_else(|| {
            SchemaError::new("offset2coordsMap", "required to resolve span geometry")
        })?;
        Ok(Self { doc, forward })
    }

    fn block(&self, block: BlockAddress) -> Result<(&'a str, &'a [Quad]), SchemaError> {
        let text = self
            .doc
            .block_text(block)
            .ok_or_else(|| SchemaError::new("detect", format!("no such block: {}", block)))?;
        let quads = self.forward.get(block).ok_or_else(|| {
            SchemaError::new(
                format!("offset2coordsMap.{}.{}", block.page_num, block.block_num),
                "missing block",
            )
        })?;
        Ok((text, quads))
    }

    /// Character quads covered by the span, newline quads included
    pub fn char_quads(&self, span: &Span) -> Result<&'a [Quad], SchemaError> {
        let (_, quads) = self.block(span.block())?;
        quads.get(span.start.offset..span.end.offset).ok_or_else(|| {
            SchemaError::new(
                "detect",
                format!("span {} lies outside its block's character index", span.id),
            )
        })
    }

    /// One rectangle per line the span crosses
    pub fn rects(&self, span: &Span) -> Result<Vec<Quad>, SchemaError> {
        let (text, quads) = self.block(span.block())?;
        if span.end.offset > quads.len() || span.start.offset > span.end.offset {
            return Err(SchemaError::new(
                "detect",
                format!("span {} lies outside its block's character index", span.id),
            ));
        }
        Ok(line_rects(text, quads, span.start.offset, span.end.offset))
    }
}
