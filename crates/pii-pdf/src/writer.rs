//! Rendering spans as PDF annotations

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use pii_core::{AnnotationWriter, DocumentAccessError, MaskAnnotation, MaskRequest, PipelineError};
use pii_types::{CoordinateMaps, Quad};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::objects::{catalog_id, pdf_string};
use crate::provider::{MAPS_CATALOG_KEY, PII_IDS_KEY};

/// Annotation flag: print
const FLAG_PRINT: i64 = 4;

/// [`AnnotationWriter`] backed by lopdf
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfAnnotationWriter;

impl LopdfAnnotationWriter {
    pub fn new() -> Self {
        Self
    }
}

fn real_array(values: &[f64]) -> Object {
    Object::Array(values.iter().map(|v| Object::Real(*v as f32)).collect())
}

fn rect_object(rect: &Quad) -> Object {
    real_array(&[rect.x0, rect.y0, rect.x1, rect.y1])
}

/// Fields shared by every annotation written for a span
fn base_annotation(subtype: &str, request: &MaskRequest<'_>, annotation: &MaskAnnotation) -> Dictionary {
    let mut annot = Dictionary::new();
    annot.set("Type", Object::Name(b"Annot".to_vec()));
    annot.set("Subtype", Object::Name(subtype.as_bytes().to_vec()));
    annot.set("NM", pdf_string(&annotation.span_id));
    annot.set(
        PII_IDS_KEY.to_vec(),
        Object::Array(vec![pdf_string(&annotation.span_id)]),
    );
    annot.set("F", Object::Integer(FLAG_PRINT));
    annot.set("C", real_array(&request.color));
    annot.set("CA", Object::Real(request.opacity as f32));
    if let Some(contents) = &annotation.contents {
        annot.set("Contents", pdf_string(contents));
    }
    annot
}

/// One highlight covering every line rectangle of the span
fn highlight_annotation(
    request: &MaskRequest<'_>,
    annotation: &MaskAnnotation,
) -> Option<Dictionary> {
    let bounds = Quad::union_all(&annotation.rects)?;
    let mut annot = base_annotation("Highlight", request, annotation);
    annot.set("Rect", rect_object(&bounds));

    // QuadPoints order: upper-left, upper-right, lower-left, lower-right
    let points: Vec<f64> = annotation
        .rects
        .iter()
        .flat_map(|r| [r.x0, r.y1, r.x1, r.y1, r.x0, r.y0, r.x1, r.y0])
        .collect();
    annot.set("QuadPoints", real_array(&points));
    Some(annot)
}

/// One square per line rectangle
fn square_annotations(request: &MaskRequest<'_>, annotation: &MaskAnnotation) -> Vec<Dictionary> {
    annotation
        .rects
        .iter()
        .map(|rect| {
            let mut annot = base_annotation("Square", request, annotation);
            annot.set("Rect", rect_object(rect));
            let mut bs = Dictionary::new();
            bs.set("W", Object::Integer(1));
            annot.set("BS", Object::Dictionary(bs));
            annot
        })
        .collect()
}

fn add_annotation_to_page(
    doc: &mut Document,
    page_id: ObjectId,
    annot_id: ObjectId,
) -> Result<(), PipelineError> {
    let page = doc
        .get_object_mut(page_id)
        .map_err(|e| PipelineError::Writer(e.to_string()))?;

    if let Object::Dictionary(ref mut page_dict) = page {
        if let Ok(Object::Array(ref mut arr)) = page_dict.get_mut(b"Annots") {
            arr.push(Object::Reference(annot_id));
        } else {
            page_dict.set("Annots", Object::Array(vec![Object::Reference(annot_id)]));
        }
    }
    Ok(())
}

/// Store both maps as a JSON stream referenced from the catalog
fn embed_maps(doc: &mut Document, maps: &CoordinateMaps) -> Result<(), PipelineError> {
    let json = serde_json::to_vec(maps)?;
    let stream_id = doc.add_object(Stream::new(Dictionary::new(), json));

    let root = catalog_id(doc).map_err(PipelineError::Writer)?;
    match doc.get_object_mut(root) {
        Ok(Object::Dictionary(catalog)) => {
            catalog.set(MAPS_CATALOG_KEY.to_vec(), Object::Reference(stream_id));
            Ok(())
        }
        _ => Err(PipelineError::Writer("Catalog not found".into())),
    }
}

impl AnnotationWriter for LopdfAnnotationWriter {
    fn apply(&self, pdf: &[u8], request: &MaskRequest<'_>) -> Result<Vec<u8>, PipelineError> {
        let mut doc = Document::load_mem(pdf)
            .map_err(|e| DocumentAccessError::Parse(e.to_string()))?;

        // 0-based page number → page object
        let pages: BTreeMap<u32, ObjectId> = doc
            .get_pages()
            .into_iter()
            .map(|(num, id)| (num.saturating_sub(1), id))
            .collect();

        let mut written = 0usize;
        for annotation in &request.annotations {
            let page_id = *pages.get(&annotation.page).ok_or_else(|| {
                PipelineError::Writer(format!(
                    "span {} targets page {} of a {}-page PDF",
                    annotation.span_id,
                    annotation.page,
                    pages.len()
                ))
            })?;

            let mut dicts = Vec::new();
            if request.method.writes_highlight() {
                dicts.extend(highlight_annotation(request, annotation));
            }
            if request.method.writes_annotation() {
                dicts.extend(square_annotations(request, annotation));
            }
            for dict in dicts {
                let annot_id = doc.add_object(Object::Dictionary(dict));
                add_annotation_to_page(&mut doc, page_id, annot_id)?;
                written += 1;
            }
        }
        debug!(written, "added annotations");

        if let Some(maps) = request.embed {
            embed_maps(&mut doc, maps)?;
            info!(blocks = maps.offset_to_coords.block_count(), "embedded coordinate maps");
        }

        let mut output = Vec::new();
        doc.save_to(&mut output)
            .map_err(|e| PipelineError::Writer(e.to_string()))?;
        Ok(output)
    }
}
