//! Shared data model for the PII position-synchronization pipeline
//!
//! Addresses, geometry, spans and the JSON documents that independently
//! invoked stages (`read`, `detect`, `duplicate-process`, `mask`) exchange.

pub mod document;
pub mod geometry;
pub mod position;
pub mod schema;
pub mod span;

pub use document::{
    now_rfc3339, BlockContent, BlockError, CoordinateMaps, DetectDocument, DocumentContent,
    Highlight, OffsetCoordinateMap, PageContent, PdfSource, ReadDocument, ReverseCoordinateMap,
    SourceDocument, SCHEMA_VERSION,
};
pub use geometry::{CoordKey, Quad, COORD_DECIMALS};
pub use position::{AddressParseError, BlockAddress, PositionRef};
pub use schema::{
    check_read_invariants, check_span, detect_document_from_value, parse_detect_document,
    parse_document_value, parse_read_document, read_document_from_value, SchemaError,
};
pub use span::{Origin, Span};
