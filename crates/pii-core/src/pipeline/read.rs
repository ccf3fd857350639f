use pii_types::{
    check_read_invariants, BlockContent, CoordinateMaps, DocumentContent, PageContent,
    ReadDocument, SourceDocument,
};
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::config::SyncConfig;
use crate::coords::CoordinateMapBuilder;
use crate::error::PipelineError;
use crate::provider::DocumentAccessProvider;
use crate::sync::{PositionSynchronizer, SyncedPage};

/// Options for the `read` stage
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOptions {
    pub with_highlights: bool,
    pub with_map: bool,
    pub sync: SyncConfig,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            with_highlights: true,
            with_map: true,
            sync: SyncConfig::default(),
        }
    }
}

fn content(pages: &[SyncedPage]) -> DocumentContent {
    DocumentContent {
        pages: pages
            .iter()
            .map(|page| PageContent {
                page_num: page.page_num,
                rotation: page.rotation,
                media_box: page.media_box,
                blocks: page
                    .blocks
                    .iter()
                    .map(|block| BlockContent {
                        block_num: block.address.block_num,
                        text: block.text.clone(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn compare_embedded(embedded: &CoordinateMaps, rebuilt: &CoordinateMaps) {
    if embedded == rebuilt {
        debug!("embedded coordinate maps agree with page geometry");
        return;
    }
    let differing = rebuilt
        .offset_to_coords
        .iter()
        .filter(|(block, quads)| embedded.offset_to_coords.get(*block) != Some(*quads))
        .count();
    warn!(
        differing_blocks = differing,
        embedded_blocks = embedded.offset_to_coords.block_count(),
        rebuilt_blocks = rebuilt.offset_to_coords.block_count(),
        "embedded coordinate maps diverge from page geometry, using rebuilt maps"
    );
}

/// Build a read document from a provider
///
/// Maps are always rebuilt from geometry; disabled features are omitted
/// from the document.
pub fn read(
    provider: &dyn DocumentAccessProvider,
    source: SourceDocument,
    options: &ReadOptions,
    cancel: &CancelFlag,
) -> Result<ReadDocument, PipelineError> {
    info!(file = %source.pdf.filename, pages = provider.page_count(), "reading document");

    let raw_pages = provider.get_pages()?;
    let synced = PositionSynchronizer::new(options.sync.clone()).synchronize(&raw_pages, cancel)?;

    let mut doc = ReadDocument::new(source, content(&synced));
    let maps = CoordinateMapBuilder::build(&synced);

    if let Some(embedded) = provider.embedded_coordinate_maps()? {
        compare_embedded(&embedded, &maps);
    }
    if options.with_highlights {
        let highlights = provider.get_highlights()?;
        debug!(count = highlights.len(), "collected highlights");
        doc.highlights = Some(highlights);
    }
    if options.with_map {
        doc.set_coordinate_maps(maps);
    }

    check_read_invariants(&doc)?;
    info!(
        blocks = doc.blocks().count(),
        with_map = options.with_map,
        with_highlights = options.with_highlights,
        "read complete"
    );
    Ok(doc)
}
