use lopdf::{Dictionary, Document, Object, ObjectId};
use pii_core::{DocumentAccessError, DocumentAccessProvider, RawPage};
use pii_types::{CoordinateMaps, Highlight, Quad};
use tracing::{debug, warn};

use crate::content::page_blocks;
use crate::fonts::page_fonts;
use crate::objects::{
    catalog_id, decode_text, dict_get, inherited, name, number, rect, resolve, resolve_array,
    resolve_dict, text_string,
};

/// Catalog key holding the embedded coordinate maps stream
pub const MAPS_CATALOG_KEY: &[u8] = b"PiiCoordinateMaps";

/// Annotation key listing the span ids a highlight covers
pub const PII_IDS_KEY: &[u8] = b"PiiIds";

/// US Letter, for pages without any `/MediaBox`
const DEFAULT_MEDIA_BOX: Quad = Quad {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

/// [`DocumentAccessProvider`] over a parsed lopdf document
pub struct LopdfProvider {
    doc: Document,
}

impl LopdfProvider {
    pub fn load(bytes: &[u8]) -> Result<Self, DocumentAccessError> {
        let doc = Document::load_mem(bytes).map_err(|e| DocumentAccessError::Parse(e.to_string()))?;
        Ok(Self::from_document(doc))
    }

    pub fn from_document(doc: Document) -> Self {
        Self { doc }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// 0-based page number and object id, in page order
    fn pages(&self) -> Vec<(u32, ObjectId)> {
        self.doc
            .get_pages()
            .into_iter()
            .map(|(num, id)| (num.saturating_sub(1), id))
            .collect()
    }

    fn page_dict(&self, page: u32, id: ObjectId) -> Result<&Dictionary, DocumentAccessError> {
        match self.doc.get_object(id) {
            Ok(Object::Dictionary(dict)) => Ok(dict),
            Ok(_) => Err(DocumentAccessError::Page {
                page,
                message: "page object is not a dictionary".into(),
            }),
            Err(e) => Err(DocumentAccessError::Page {
                page,
                message: e.to_string(),
            }),
        }
    }

    fn read_page(&self, page: u32, id: ObjectId) -> Result<RawPage, DocumentAccessError> {
        let doc = &self.doc;
        let rotation = inherited(doc, id, b"Rotate").and_then(number).unwrap_or(0.0) as i32;
        let media_box = inherited(doc, id, b"MediaBox")
            .and_then(|obj| rect(doc, obj))
            .unwrap_or(DEFAULT_MEDIA_BOX);

        let resources = inherited(doc, id, b"Resources").and_then(|obj| resolve_dict(doc, obj));
        let fonts = page_fonts(doc, resources);

        // A page without content has no text
        let has_content = self.page_dict(page, id)?.has(b"Contents");
        let blocks = if has_content {
            page_blocks(doc, id, &fonts).map_err(|e| DocumentAccessError::Page {
                page,
                message: e.to_string(),
            })?
        } else {
            Vec::new()
        };
        debug!(page, blocks = blocks.len(), fonts = fonts.len(), "read page");

        Ok(RawPage {
            page_num: page,
            rotation: rotation.rem_euclid(360),
            media_box,
            blocks,
        })
    }

    fn read_highlight(&self, page: u32, index: usize, annot: &Dictionary) -> Option<Highlight> {
        let doc = &self.doc;
        if dict_get(doc, annot, b"Subtype").and_then(name) != Some(b"Highlight".as_slice()) {
            return None;
        }

        let mut quads = dict_get(doc, annot, b"QuadPoints")
            .and_then(|obj| resolve_array(doc, obj))
            .map(|points| quad_points(points.as_slice()))
            .unwrap_or_default();
        if quads.is_empty() {
            quads.extend(dict_get(doc, annot, b"Rect").and_then(|obj| rect(doc, obj)));
        }
        if quads.is_empty() {
            warn!(page, index, "highlight without geometry skipped");
            return None;
        }

        let id = text_string(doc, annot, b"NM").unwrap_or_else(|| format!("{}-{}", page, index));
        let pii = dict_get(doc, annot, PII_IDS_KEY)
            .and_then(|obj| resolve_array(doc, obj))
            .map(|ids| {
                ids.iter()
                    .filter_map(|obj| match resolve(doc, obj) {
                        Some(Object::String(bytes, _)) => Some(decode_text(bytes)),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Highlight {
            id,
            page,
            quads,
            comment: text_string(doc, annot, b"Contents").filter(|c| !c.is_empty()),
            pii,
        })
    }
}

/// `/QuadPoints` groups of eight numbers, each reduced to its bounding box
fn quad_points(points: &[Object]) -> Vec<Quad> {
    let values: Vec<f64> = points.iter().filter_map(number).collect();
    values
        .chunks_exact(8)
        .map(|q| {
            let xs = [q[0], q[2], q[4], q[6]];
            let ys = [q[1], q[3], q[5], q[7]];
            Quad::new(
                xs.iter().copied().fold(f64::INFINITY, f64::min),
                ys.iter().copied().fold(f64::INFINITY, f64::min),
                xs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                ys.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            )
        })
        .collect()
}

impl DocumentAccessProvider for LopdfProvider {
    fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    fn get_pages(&self) -> Result<Vec<RawPage>, DocumentAccessError> {
        self.pages()
            .into_iter()
            .map(|(page, id)| self.read_page(page, id))
            .collect()
    }

    fn get_highlights(&self) -> Result<Vec<Highlight>, DocumentAccessError> {
        let doc = &self.doc;
        let mut highlights = Vec::new();
        for (page, id) in self.pages() {
            let dict = self.page_dict(page, id)?;
            let annots = dict_get(doc, dict, b"Annots").and_then(|obj| resolve_array(doc, obj));
            let Some(annots) = annots else {
                continue;
            };
            for (index, annot) in annots.iter().enumerate() {
                if let Some(annot) = resolve_dict(doc, annot) {
                    highlights.extend(self.read_highlight(page, index, annot));
                }
            }
        }
        debug!(count = highlights.len(), "read highlights");
        Ok(highlights)
    }

    fn embedded_coordinate_maps(&self) -> Result<Option<CoordinateMaps>, DocumentAccessError> {
        let doc = &self.doc;
        let catalog = catalog_id(doc)
            .and_then(|id| match doc.get_object(id) {
                Ok(Object::Dictionary(dict)) => Ok(dict),
                _ => Err("Catalog not found".to_string()),
            })
            .map_err(DocumentAccessError::Parse)?;
        let Some(Object::Stream(stream)) = dict_get(doc, catalog, MAPS_CATALOG_KEY) else {
            return Ok(None);
        };
        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        match serde_json::from_slice::<CoordinateMaps>(&data) {
            Ok(maps) => Ok(Some(maps)),
            Err(e) => {
                warn!(error = %e, "embedded coordinate maps are malformed, ignoring");
                Ok(None)
            }
        }
    }
}
