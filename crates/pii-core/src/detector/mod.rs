//! Detectors turn plain text into local spans
//!
//! A detector sees one string (a block, or several blocks joined by the
//! batch separator) and reports char offsets local to that string. The
//! batch runner maps them back to canonical positions.

mod added;
mod batch;
mod patterns;

pub use added::{ExcludeFilter, RegexDetector};
pub use batch::{BatchOutcome, BatchRunner};
pub use patterns::{luhn_valid, PatternDetector, BUILTIN_MODEL_ID};

use pii_types::Origin;
use serde::{Deserialize, Serialize};

use crate::error::DetectorError;

/// A detection local to the detector's input text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSpan {
    /// Char offset, inclusive
    pub start_offset: usize,
    /// Char offset, exclusive
    pub end_offset: usize,
    pub entity_type: String,
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    /// Provenance stamped on every span this detector yields
    fn origin(&self) -> Origin;

    fn model_id(&self) -> Option<&str> {
        None
    }

    fn detect(&self, text: &str) -> Result<Vec<LocalSpan>, DetectorError>;
}

/// Byte → char offset conversion for regex matches
pub(crate) struct CharOffsets {
    boundaries: Vec<usize>,
}

impl CharOffsets {
    pub(crate) fn new(text: &str) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        boundaries.push(text.len());
        Self { boundaries }
    }

    /// Char offset of a byte offset that lies on a char boundary
    pub(crate) fn char_at(&self, byte: usize) -> usize {
        self.boundaries.partition_point(|&b| b < byte)
    }
}
