//! Document builders shared by unit tests

use pii_types::{
    BlockAddress, BlockContent, DocumentContent, OffsetCoordinateMap, PageContent, PdfSource,
    Quad, ReadDocument, SourceDocument,
};

use crate::coords::CoordinateMapBuilder;

/// `n` adjacent 10×12 quads starting at x = 0 on baseline `y`
pub fn row(n: usize, y: f64) -> Vec<Quad> {
    (0..n)
        .map(|i| Quad::new(i as f64 * 10.0, y, i as f64 * 10.0 + 10.0, y + 12.0))
        .collect()
}

pub fn source(sha256: &str) -> SourceDocument {
    SourceDocument {
        pdf: PdfSource {
            filename: "sample.pdf".into(),
            path: "/tmp/sample.pdf".into(),
            size: 1024,
            page_count: 1,
            sha256: sha256.into(),
            created_at: None,
            modified_at: None,
        },
    }
}

/// One-page document with the given blocks, maps emitted on request
pub fn read_document(blocks: &[(&str, Vec<Quad>)], with_map: bool) -> ReadDocument {
    let page = PageContent {
        page_num: 0,
        rotation: 0,
        media_box: Quad::new(0.0, 0.0, 612.0, 792.0),
        blocks: blocks
            .iter()
            .enumerate()
            .map(|(n, (text, _))| BlockContent {
                block_num: n as u32,
                text: text.to_string(),
            })
            .collect(),
    };
    let mut doc = ReadDocument::new(
        source(&"0".repeat(64)),
        DocumentContent { pages: vec![page] },
    );
    if with_map {
        let mut forward = OffsetCoordinateMap::new();
        for (n, (_, quads)) in blocks.iter().enumerate() {
            forward.insert(BlockAddress::new(0, n as u32), quads.clone());
        }
        let reverse = CoordinateMapBuilder::reverse(&forward);
        doc.offset_to_coords = Some(forward);
        doc.coords_to_offset = Some(reverse);
    }
    doc
}
