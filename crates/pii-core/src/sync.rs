//! Character-to-geometry synchronization
//!
//! Every block is flattened into one plain-text string plus a parallel
//! character index: entry `i` of the index is the quad of character `i` of
//! the text (counted in Unicode scalar values). Inferred characters (spaces
//! across wide gaps, newlines between lines) get synthetic quads so that the
//! alignment never breaks.

use pii_types::{BlockAddress, Quad};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::cancel::CancelFlag;
use crate::config::SyncConfig;
use crate::error::PipelineError;
use crate::provider::{RawBlock, RawPage};

/// One block's text and its character index
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedBlock {
    pub address: BlockAddress,
    pub text: String,
    pub index: Vec<Quad>,
}

impl SyncedBlock {
    /// Length in characters; always equal to `index.len()`
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncedPage {
    pub page_num: u32,
    pub rotation: i32,
    pub media_box: Quad,
    pub blocks: Vec<SyncedBlock>,
}

/// Builder for plain text with an index-aligned quad list
#[derive(Default)]
struct BlockBuilder {
    text: String,
    index: Vec<Quad>,
}

impl BlockBuilder {
    fn push(&mut self, c: char, quad: Quad) {
        self.text.push(c);
        self.index.push(quad.quantized());
    }

    fn last_char(&self) -> Option<char> {
        self.text.chars().next_back()
    }
}

pub struct PositionSynchronizer {
    config: SyncConfig,
}

impl PositionSynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Synchronize every page; output is page-ascending whatever the
    /// completion order on the pool
    pub fn synchronize(
        &self,
        pages: &[RawPage],
        cancel: &CancelFlag,
    ) -> Result<Vec<SyncedPage>, PipelineError> {
        let completed = AtomicUsize::new(0);

        let mut synced = if self.config.parallel {
            pages
                .par_iter()
                .map(|page| self.synchronize_page(page, cancel, &completed))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            pages
                .iter()
                .map(|page| self.synchronize_page(page, cancel, &completed))
                .collect::<Result<Vec<_>, _>>()?
        };

        synced.sort_by_key(|page| page.page_num);
        debug!(
            pages = synced.len(),
            blocks = completed.load(Ordering::SeqCst),
            "synchronized document"
        );
        Ok(synced)
    }

    fn synchronize_page(
        &self,
        page: &RawPage,
        cancel: &CancelFlag,
        completed: &AtomicUsize,
    ) -> Result<SyncedPage, PipelineError> {
        let mut blocks = Vec::with_capacity(page.blocks.len());
        for (block_num, block) in page.blocks.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled {
                    completed_blocks: completed.load(Ordering::SeqCst),
                });
            }
            let address = BlockAddress::new(page.page_num, block_num as u32);
            blocks.push(self.synchronize_block(address, block));
            completed.fetch_add(1, Ordering::SeqCst);
        }

        Ok(SyncedPage {
            page_num: page.page_num,
            rotation: page.rotation,
            media_box: page.media_box,
            blocks,
        })
    }

    /// Flatten one block's lines → spans → glyphs
    pub fn synchronize_block(&self, address: BlockAddress, block: &RawBlock) -> SyncedBlock {
        let mut out = BlockBuilder::default();

        for line in &block.lines {
            let has_glyphs = line
                .spans
                .iter()
                .any(|span| span.glyphs.iter().any(|g| !g.text.is_empty()));
            if !has_glyphs {
                continue;
            }

            if self.config.infer_line_breaks {
                if let Some(last) = out.index.last().copied() {
                    if out.last_char() != Some('\n') {
                        // Zero-width quad at the end of the previous line
                        out.push('\n', Quad::new(last.x1, last.y0, last.x1, last.y1));
                    }
                }
            }

            // Previous glyph on this line: its quad and whether it ended in whitespace
            let mut prev: Option<(Quad, bool)> = None;

            for span in &line.spans {
                for glyph in &span.glyphs {
                    let chars: Vec<char> = glyph.text.chars().collect();
                    let Some(&first) = chars.first() else {
                        continue;
                    };

                    if self.config.infer_whitespace {
                        if let Some((prev_quad, prev_ws)) = prev {
                            let size = if span.font_size > 0.0 {
                                span.font_size
                            } else {
                                glyph.bbox.height()
                            };
                            let threshold =
                                (self.config.space_gap_ratio * size).max(self.config.min_space_gap);
                            let gap = glyph.bbox.x0 - prev_quad.x1;
                            if gap > threshold && !prev_ws && !first.is_whitespace() {
                                out.push(
                                    ' ',
                                    Quad::new(
                                        prev_quad.x1,
                                        prev_quad.y0.min(glyph.bbox.y0),
                                        glyph.bbox.x0,
                                        prev_quad.y1.max(glyph.bbox.y1),
                                    ),
                                );
                            }
                        }
                    }

                    push_glyph(&mut out, &chars, glyph.bbox);
                    let ends_ws = chars.last().is_some_and(|c| c.is_whitespace());
                    prev = Some((glyph.bbox, ends_ws));
                }
            }
        }

        SyncedBlock {
            address,
            text: out.text,
            index: out.index,
        }
    }
}

/// A glyph that decodes to several characters shares its box equally
fn push_glyph(out: &mut BlockBuilder, chars: &[char], bbox: Quad) {
    if chars.len() == 1 {
        out.push(chars[0], bbox);
        return;
    }
    let step = bbox.width() / chars.len() as f64;
    for (i, &c) in chars.iter().enumerate() {
        let x0 = bbox.x0 + step * i as f64;
        out.push(c, Quad::new(x0, bbox.y0, x0 + step, bbox.y1));
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::provider::{RawGlyph, RawLine, RawSpan};

    /// A line of monospaced glyphs: `width` per character, spaces in `text`
    /// become real gaps of one glyph width instead of glyphs
    pub fn line(text: &str, x: f64, y: f64, width: f64, size: f64) -> RawLine {
        let mut glyphs = Vec::new();
        let mut cursor = x;
        for c in text.chars() {
            if c != ' ' {
                glyphs.push(RawGlyph::new(
                    c.to_string(),
                    Quad::new(cursor, y, cursor + width, y + size),
                ));
            }
            cursor += width;
        }
        RawLine {
            spans: vec![RawSpan {
                font_size: size,
                glyphs,
            }],
        }
    }

    pub fn page(page_num: u32, blocks: Vec<Vec<RawLine>>) -> RawPage {
        RawPage {
            page_num,
            rotation: 0,
            media_box: Quad::new(0.0, 0.0, 612.0, 792.0),
            blocks: blocks
                .into_iter()
                .map(|lines| RawBlock { lines })
                .collect(),
        }
    }
}
