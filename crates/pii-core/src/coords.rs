//! Forward and reverse coordinate maps, and click lookup over them

use pii_types::{
    CoordKey, CoordinateMaps, OffsetCoordinateMap, PositionRef, Quad, ReverseCoordinateMap,
};
use std::collections::BTreeMap;
use tracing::debug;

use crate::sync::SyncedPage;

/// Builds `offset2coordsMap` and `coords2offsetMap` from synchronized pages
pub struct CoordinateMapBuilder;

impl CoordinateMapBuilder {
    /// The forward map is each block's character index verbatim. The reverse
    /// map is filled in scan order (page, block, offset ascending), so when
    /// two characters share a quad the later one wins.
    pub fn build(pages: &[SyncedPage]) -> CoordinateMaps {
        let mut forward = OffsetCoordinateMap::new();
        for page in pages {
            for block in &page.blocks {
                forward.insert(block.address, block.index.clone());
            }
        }
        let reverse = Self::reverse(&forward);
        CoordinateMaps {
            offset_to_coords: forward,
            coords_to_offset: reverse,
        }
    }

    /// Derive the reverse map from a forward map
    pub fn reverse(forward: &OffsetCoordinateMap) -> ReverseCoordinateMap {
        let mut reverse = ReverseCoordinateMap::new();
        let mut shadowed = 0usize;
        for (block, quads) in forward.iter() {
            for (offset, quad) in quads.iter().enumerate() {
                if reverse.insert(quad.key(), block.at(offset)).is_some() {
                    shadowed += 1;
                }
            }
        }
        if shadowed > 0 {
            debug!(shadowed, "duplicate quads resolved to the last character");
        }
        reverse
    }
}

/// Point lookup over one document's character quads
pub struct CoordinateIndex {
    pages: BTreeMap<u32, Vec<(PositionRef, Quad)>>,
    reverse: ReverseCoordinateMap,
}

impl CoordinateIndex {
    pub fn new(maps: &CoordinateMaps) -> Self {
        let mut pages: BTreeMap<u32, Vec<(PositionRef, Quad)>> = BTreeMap::new();
        for (block, quads) in maps.offset_to_coords.iter() {
            let entries = pages.entry(block.page_num).or_default();
            entries.extend(
                quads
                    .iter()
                    .enumerate()
                    .map(|(offset, quad)| (block.at(offset), *quad)),
            );
        }
        Self {
            pages,
            reverse: maps.coords_to_offset.clone(),
        }
    }

    /// Exact lookup by quad, as the reverse map records it
    pub fn position_of(&self, quad: &Quad) -> Option<PositionRef> {
        self.reverse.get(&CoordKey::from(*quad)).copied()
    }

    /// Character under a click at `(x, y)` on `page`
    ///
    /// A quad containing the point wins, the smallest one when several do
    /// (ties go to scan order). Otherwise the nearest quad is returned.
    /// Zero-area quads only take part when the page has nothing else.
    pub fn lookup(&self, page: u32, x: f64, y: f64) -> Option<PositionRef> {
        let entries = self.pages.get(&page)?;
        let solid: Vec<&(PositionRef, Quad)> = entries
            .iter()
            .filter(|(_, quad)| !quad.is_degenerate())
            .collect();
        let candidates: Vec<&(PositionRef, Quad)> = if solid.is_empty() {
            entries.iter().collect()
        } else {
            solid
        };

        let containing = candidates
            .iter()
            .filter(|(_, quad)| quad.contains_point(x, y))
            .min_by(|(pa, qa), (pb, qb)| {
                qa.area()
                    .total_cmp(&qb.area())
                    .then_with(|| pa.cmp(pb))
            });
        if let Some((position, _)) = containing {
            return Some(*position);
        }

        candidates
            .iter()
            .min_by(|(pa, qa), (pb, qb)| {
                qa.distance_to_point(x, y)
                    .total_cmp(&qb.distance_to_point(x, y))
                    .then_with(|| pa.cmp(pb))
            })
            .map(|(position, _)| *position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncedBlock;
    use pii_types::BlockAddress;
    use pretty_assertions::assert_eq;

    fn page(page_num: u32, blocks: Vec<(&str, Vec<Quad>)>) -> SyncedPage {
        SyncedPage {
            page_num,
            rotation: 0,
            media_box: Quad::new(0.0, 0.0, 612.0, 792.0),
            blocks: blocks
                .into_iter()
                .enumerate()
                .map(|(n, (text, index))| SyncedBlock {
                    address: BlockAddress::new(page_num, n as u32),
                    text: text.to_string(),
                    index,
                })
                .collect(),
        }
    }

    fn row(n: usize, y: f64) -> Vec<Quad> {
        (0..n)
            .map(|i| Quad::new(i as f64 * 10.0, y, i as f64 * 10.0 + 10.0, y + 10.0))
            .collect()
    }

    #[test]
    fn test_every_character_round_trips() {
        let pages = vec![
            page(0, vec![("abc", row(3, 0.0)), ("de", row(2, 20.0))]),
            page(1, vec![("f", row(1, 40.0))]),
        ];
        let maps = CoordinateMapBuilder::build(&pages);
        assert_eq!(maps.offset_to_coords.block_count(), 3);
        assert_eq!(maps.coords_to_offset.len(), 6);
        for (block, quads) in maps.offset_to_coords.iter() {
            for (offset, quad) in quads.iter().enumerate() {
                assert_eq!(
                    maps.coords_to_offset.get(&quad.key()),
                    Some(&block.at(offset))
                );
            }
        }
    }

    #[test]
    fn test_duplicate_quad_last_writer_wins() {
        let shared = Quad::new(0.0, 0.0, 5.0, 5.0);
        let pages = vec![page(0, vec![("ab", vec![shared, shared])])];
        let maps = CoordinateMapBuilder::build(&pages);
        assert_eq!(
            maps.coords_to_offset.get(&shared.key()),
            Some(&PositionRef::new(0, 0, 1))
        );
    }

    #[test]
    fn test_lookup_prefers_containing_quad() {
        let pages = vec![page(0, vec![("abc", row(3, 0.0))])];
        let index = CoordinateIndex::new(&CoordinateMapBuilder::build(&pages));
        assert_eq!(index.lookup(0, 15.0, 5.0), Some(PositionRef::new(0, 0, 1)));
    }

    #[test]
    fn test_lookup_picks_smallest_of_overlapping() {
        let big = Quad::new(0.0, 0.0, 100.0, 100.0);
        let small = Quad::new(40.0, 40.0, 60.0, 60.0);
        let pages = vec![page(0, vec![("ab", vec![big, small])])];
        let index = CoordinateIndex::new(&CoordinateMapBuilder::build(&pages));
        assert_eq!(index.lookup(0, 50.0, 50.0), Some(PositionRef::new(0, 0, 1)));
        assert_eq!(index.lookup(0, 10.0, 10.0), Some(PositionRef::new(0, 0, 0)));
    }

    #[test]
    fn test_lookup_falls_back_to_nearest() {
        let pages = vec![page(0, vec![("abc", row(3, 0.0))])];
        let index = CoordinateIndex::new(&CoordinateMapBuilder::build(&pages));
        assert_eq!(index.lookup(0, 45.0, 5.0), Some(PositionRef::new(0, 0, 2)));
        assert_eq!(index.lookup(7, 45.0, 5.0), None);
    }

    #[test]
    fn test_lookup_skips_line_break_quads() {
        let mut quads = row(2, 0.0);
        quads.push(Quad::new(20.0, 0.0, 20.0, 10.0));
        quads.extend(row(1, 20.0));
        let pages = vec![page(0, vec![("ab\nc", quads)])];
        let index = CoordinateIndex::new(&CoordinateMapBuilder::build(&pages));
        assert_eq!(index.lookup(0, 20.0, 5.0), Some(PositionRef::new(0, 0, 1)));
    }

    #[test]
    fn test_position_of_uses_reverse_map() {
        let pages = vec![page(0, vec![("ab", row(2, 0.0))])];
        let index = CoordinateIndex::new(&CoordinateMapBuilder::build(&pages));
        assert_eq!(
            index.position_of(&Quad::new(10.0, 0.0, 20.0, 10.0)),
            Some(PositionRef::new(0, 0, 1))
        );
    }
}
