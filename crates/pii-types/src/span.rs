//! Detected PII spans

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::position::{BlockAddress, PositionRef};

/// Provenance of a span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Produced by a detection model
    Model,
    /// Produced by a user-supplied `entity:regex` rule
    Added,
    /// Marked by a person
    Manual,
}

impl Origin {
    pub const ALL: [Origin; 3] = [Origin::Manual, Origin::Added, Origin::Model];

    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Model => "model",
            Origin::Added => "added",
            Origin::Manual => "manual",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(Origin::Model),
            "added" => Ok(Origin::Added),
            "manual" => Ok(Origin::Manual),
            other => Err(format!("unknown origin '{}'", other)),
        }
    }
}

fn new_span_id() -> String {
    Uuid::new_v4().to_string()
}

/// A PII region `[start, end)` inside one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    #[serde(default = "new_span_id")]
    pub id: String,
    pub start: PositionRef,
    /// Exclusive; always in the same block as `start`
    pub end: PositionRef,
    pub entity: String,
    pub word: String,
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Span {
    /// Build a span with a fresh id
    pub fn new(
        block: BlockAddress,
        start: usize,
        end: usize,
        entity: &str,
        word: &str,
        origin: Origin,
    ) -> Self {
        Self {
            id: new_span_id(),
            start: block.at(start),
            end: block.at(end),
            entity: entity.to_string(),
            word: word.to_string(),
            origin,
            model_id: None,
            confidence: None,
        }
    }

    pub fn with_model(mut self, model_id: Option<String>, confidence: Option<f64>) -> Self {
        self.model_id = model_id;
        self.confidence = confidence;
        self
    }

    pub fn block(&self) -> BlockAddress {
        self.start.block()
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.end.offset.saturating_sub(self.start.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
