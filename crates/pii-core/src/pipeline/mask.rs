use pii_types::{check_span, CoordinateMaps, DetectDocument};
use tracing::{debug, info};

use crate::coords::CoordinateMapBuilder;
use crate::config::MaskOptions;
use crate::error::PipelineError;
use crate::integrity::verify_pdf;
use crate::provider::{AnnotationWriter, MaskAnnotation, MaskRequest};
use crate::resolver::SpanResolver;

/// Render the document's spans into a copy of `pdf`
///
/// The PDF hash is checked before anything else; nothing is written when it
/// does not match (unless `force`).
pub fn mask(
    pdf: &[u8],
    doc: &DetectDocument,
    options: &MaskOptions,
    writer: &dyn AnnotationWriter,
) -> Result<Vec<u8>, PipelineError> {
    options.validate()?;
    verify_pdf(pdf, doc.read.pdf_sha256(), options.force)?;

    let resolver = SpanResolver::new(&doc.read)?;
    let mut annotations = Vec::with_capacity(doc.detect.len());
    for (i, span) in doc.detect.iter().enumerate() {
        check_span(&doc.read, span, &format!("detect[{}]", i))?;
        let rects = resolver.rects(span)?;
        if rects.is_empty() {
            debug!(span = %span.id, "span covers no visible characters");
            continue;
        }
        annotations.push(MaskAnnotation {
            span_id: span.id.clone(),
            page: span.start.page_num,
            rects,
            contents: options.display.render(&span.entity, &span.word),
        });
    }

    let embedded: Option<CoordinateMaps> = if options.embed_coordinates {
        doc.read.coordinate_maps().or_else(|| {
            doc.read.offset_to_coords.as_ref().map(|forward| CoordinateMaps {
                offset_to_coords: forward.clone(),
                coords_to_offset: CoordinateMapBuilder::reverse(forward),
            })
        })
    } else {
        None
    };

    let mut request = MaskRequest::new(options, annotations);
    request.embed = embedded.as_ref();

    let count = request.annotations.len();
    let out = writer.apply(pdf, &request)?;
    info!(
        annotations = count,
        method = ?options.method,
        embedded = request.embed.is_some(),
        "mask complete"
    );
    Ok(out)
}
