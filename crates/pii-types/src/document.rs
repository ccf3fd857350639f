//! JSON documents exchanged between pipeline stages
//!
//! `read` emits a [`ReadDocument`]; `detect` and `duplicate-process` emit a
//! [`DetectDocument`], which flattens the read document and adds spans.
//! Optional features (highlights, coordinate maps) are omitted from the
//! output when disabled, never emitted empty.

use chrono::Utc;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::geometry::{CoordKey, Quad};
use crate::position::{BlockAddress, PositionRef};
use crate::span::Span;

/// Version written into every document header
pub const SCHEMA_VERSION: &str = "1.0";

/// RFC 3339 timestamp for `generated_at`
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// The PDF a document was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfSource {
    pub filename: String,
    pub path: String,
    pub size: u64,
    pub page_count: u32,
    /// Hex SHA-256 of the PDF bytes at `read` time
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub pdf: PdfSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockContent {
    pub block_num: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub page_num: u32,
    #[serde(default)]
    pub rotation: i32,
    pub media_box: Quad,
    pub blocks: Vec<BlockContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentContent {
    pub pages: Vec<PageContent>,
}

/// A highlight annotation found in the source PDF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: String,
    pub page: u32,
    pub quads: Vec<Quad>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Ids of the detections this highlight covers
    #[serde(default)]
    pub pii: Vec<String>,
}

/// `offset2coordsMap[page][block]` is the block's character index
///
/// JSON object keys are the decimal page and block numbers. Keys are parsed
/// from strings explicitly so the map also deserializes inside the
/// flattened [`DetectDocument`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OffsetCoordinateMap(pub BTreeMap<u32, BTreeMap<u32, Vec<Quad>>>);

impl OffsetCoordinateMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, block: BlockAddress, quads: Vec<Quad>) {
        self.0
            .entry(block.page_num)
            .or_default()
            .insert(block.block_num, quads);
    }

    pub fn get(&self, block: BlockAddress) -> Option<&[Quad]> {
        self.0
            .get(&block.page_num)?
            .get(&block.block_num)
            .map(|quads| quads.as_slice())
    }

    /// Blocks in page-ascending, block-ascending order
    pub fn iter(&self) -> impl Iterator<Item = (BlockAddress, &[Quad])> {
        self.0.iter().flat_map(|(page, blocks)| {
            blocks
                .iter()
                .map(move |(block, quads)| (BlockAddress::new(*page, *block), quads.as_slice()))
        })
    }

    /// Number of blocks carried
    pub fn block_count(&self) -> usize {
        self.0.values().map(|blocks| blocks.len()).sum()
    }
}

impl Serialize for OffsetCoordinateMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Entries are written in numeric order, not string order
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (page, blocks) in &self.0 {
            map.serialize_entry(&page.to_string(), &BlockQuads(blocks))?;
        }
        map.end()
    }
}

struct BlockQuads<'a>(&'a BTreeMap<u32, Vec<Quad>>);

impl Serialize for BlockQuads<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (block, quads) in self.0 {
            map.serialize_entry(&block.to_string(), quads)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OffsetCoordinateMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, BTreeMap<String, Vec<Quad>>>::deserialize(deserializer)?;
        let mut map = BTreeMap::new();
        for (page, blocks) in raw {
            let page: u32 = page
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("invalid page key {:?}", page)))?;
            let mut parsed = BTreeMap::new();
            for (block, quads) in blocks {
                let block: u32 = block.parse().map_err(|_| {
                    serde::de::Error::custom(format!("invalid block key {:?}", block))
                })?;
                parsed.insert(block, quads);
            }
            map.insert(page, parsed);
        }
        Ok(Self(map))
    }
}

/// `coords2offsetMap`: quantized quad key to the position that owns it
///
/// Serialized as a string-to-string JSON object; parsed into typed keys
/// and positions at the boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReverseCoordinateMap(pub BTreeMap<CoordKey, PositionRef>);

impl ReverseCoordinateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replacing any earlier owner of the same key
    pub fn insert(&mut self, key: CoordKey, position: PositionRef) -> Option<PositionRef> {
        self.0.insert(key, position)
    }

    pub fn get(&self, key: &CoordKey) -> Option<&PositionRef> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CoordKey, &PositionRef)> {
        self.0.iter()
    }
}

impl Serialize for ReverseCoordinateMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, position) in &self.0 {
            map.serialize_entry(&key.to_string(), &position.to_string())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ReverseCoordinateMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        let mut map = BTreeMap::new();
        for (key, position) in raw {
            let key: CoordKey = key.parse().map_err(serde::de::Error::custom)?;
            let position: PositionRef = position.parse().map_err(serde::de::Error::custom)?;
            map.insert(key, position);
        }
        Ok(Self(map))
    }
}

/// Both coordinate maps, as embedded into a masked PDF
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinateMaps {
    #[serde(rename = "offset2coordsMap")]
    pub offset_to_coords: OffsetCoordinateMap,
    #[serde(rename = "coords2offsetMap")]
    pub coords_to_offset: ReverseCoordinateMap,
}

/// Output of the `read` stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadDocument {
    pub schema_version: String,
    pub generated_at: String,
    pub source: SourceDocument,
    pub content: DocumentContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlights: Option<Vec<Highlight>>,
    #[serde(
        rename = "offset2coordsMap",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub offset_to_coords: Option<OffsetCoordinateMap>,
    #[serde(
        rename = "coords2offsetMap",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub coords_to_offset: Option<ReverseCoordinateMap>,
}

impl ReadDocument {
    pub fn new(source: SourceDocument, content: DocumentContent) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: now_rfc3339(),
            source,
            content,
            highlights: None,
            offset_to_coords: None,
            coords_to_offset: None,
        }
    }

    pub fn pdf_sha256(&self) -> &str {
        &self.source.pdf.sha256
    }

    pub fn block_text(&self, block: BlockAddress) -> Option<&str> {
        self.content
            .pages
            .iter()
            .find(|p| p.page_num == block.page_num)?
            .blocks
            .iter()
            .find(|b| b.block_num == block.block_num)
            .map(|b| b.text.as_str())
    }

    /// Character index of a block, when maps were emitted
    pub fn block_quads(&self, block: BlockAddress) -> Option<&[Quad]> {
        self.offset_to_coords.as_ref()?.get(block)
    }

    /// Every block in page-ascending, block-ascending order
    pub fn blocks(&self) -> impl Iterator<Item = (BlockAddress, &str)> {
        self.content.pages.iter().flat_map(|page| {
            page.blocks.iter().map(move |block| {
                (
                    BlockAddress::new(page.page_num, block.block_num),
                    block.text.as_str(),
                )
            })
        })
    }

    pub fn set_coordinate_maps(&mut self, maps: CoordinateMaps) {
        self.offset_to_coords = Some(maps.offset_to_coords);
        self.coords_to_offset = Some(maps.coords_to_offset);
    }

    /// Both maps, when both are present
    pub fn coordinate_maps(&self) -> Option<CoordinateMaps> {
        match (&self.offset_to_coords, &self.coords_to_offset) {
            (Some(forward), Some(reverse)) => Some(CoordinateMaps {
                offset_to_coords: forward.clone(),
                coords_to_offset: reverse.clone(),
            }),
            _ => None,
        }
    }
}

/// A per-block failure recorded alongside partial results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockError {
    pub page_num: u32,
    pub block_num: u32,
    pub kind: String,
    pub message: String,
}

/// Output of `detect` and `duplicate-process`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectDocument {
    #[serde(flatten)]
    pub read: ReadDocument,
    /// SHA-256 of the canonical read document this was derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_json_sha256: Option<String>,
    #[serde(default)]
    pub detect: Vec<Span>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BlockError>,
}

impl DetectDocument {
    pub fn from_read(read: ReadDocument) -> Self {
        Self {
            read,
            read_json_sha256: None,
            detect: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Refresh `generated_at` for a newly emitted document
    pub fn touch(&mut self) {
        self.read.generated_at = now_rfc3339();
    }
}
