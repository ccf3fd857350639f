//! Position synchronization and PII span pipeline
//!
//! Text extracted from a PDF is kept index-aligned with the quads of its
//! characters, so detection runs on plain text while every result stays
//! resolvable to page geometry without searching the text again.
//!
//! ```text
//! provider → PositionSynchronizer → CoordinateMapBuilder → read document
//! read → detectors → SpanResolver → detect document
//! detect → DeduplicationEngine → detect document
//! detect + PDF → integrity check → AnnotationWriter → masked PDF
//! ```

pub mod cancel;
pub mod config;
pub mod coords;
pub mod dedup;
pub mod detector;
pub mod error;
pub mod highlights;
pub mod integrity;
pub mod pipeline;
pub mod provider;
pub mod resolver;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::CancelFlag;
pub use config::{
    AddedEntity, DetectorConfig, DisplayText, MaskMethod, MaskOptions, PipelineConfig, SyncConfig,
};
pub use coords::{CoordinateIndex, CoordinateMapBuilder};
pub use dedup::{
    DedupPolicy, DeduplicationEngine, EntityScope, LengthPreference, OverlapMode,
    PositionPreference,
};
pub use detector::{
    BatchOutcome, BatchRunner, Detector, ExcludeFilter, LocalSpan, PatternDetector,
    RegexDetector,
};
pub use error::{ConfigError, DetectorError, DocumentAccessError, IntegrityMismatch, PipelineError};
pub use integrity::{canonical_json_sha256, describe_source, read_json_sha256, sha256_hex, verify_pdf};
pub use pipeline::{configured_detectors, detect, duplicate_process, mask, read, ReadOptions};
pub use provider::{
    AnnotationWriter, DocumentAccessProvider, MaskAnnotation, MaskRequest, MemoryProvider,
    RawBlock, RawGlyph, RawLine, RawPage, RawSpan,
};
pub use resolver::{line_rects, BatchLayout, SpanResolver};
pub use sync::{PositionSynchronizer, SyncedBlock, SyncedPage};
