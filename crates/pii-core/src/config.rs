//! Caller-owned configuration for every stage
//!
//! Nothing here is global: each pipeline invocation builds (or loads) its
//! own values and passes them down.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::dedup::DedupPolicy;
use crate::error::ConfigError;

/// Thresholds for whitespace and line-break inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// A horizontal gap wider than `space_gap_ratio * font_size` becomes a space
    pub space_gap_ratio: f64,
    /// Lower bound for the gap threshold in points, for tiny or missing font sizes
    pub min_space_gap: f64,
    pub infer_whitespace: bool,
    pub infer_line_breaks: bool,
    /// Synchronize pages on the rayon pool
    pub parallel: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            space_gap_ratio: 0.25,
            min_space_gap: 0.5,
            infer_whitespace: true,
            infer_line_breaks: true,
            parallel: true,
        }
    }
}

/// `entity:regex` rule supplied with `--add`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddedEntity {
    pub entity: String,
    pub pattern: String,
}

impl FromStr for AddedEntity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (entity, pattern) = s.split_once(':').ok_or_else(|| {
            ConfigError::Invalid(format!("--add expects entity:regex, got '{}'", s))
        })?;
        if entity.trim().is_empty() || pattern.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "--add expects a non-empty entity and regex, got '{}'",
                s
            )));
        }
        Ok(Self {
            entity: entity.trim().to_string(),
            pattern: pattern.to_string(),
        })
    }
}

/// Options for the `detect` stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    /// Keep spans already present in the input document
    pub with_predetect: bool,
    /// Blocks concatenated into one detector call
    pub batch_size: usize,
    pub batch_separator: String,
    /// Abort the document on the first detector failure
    pub fail_fast: bool,
    pub added: Vec<AddedEntity>,
    /// Detections whose word matches any of these are dropped
    pub exclude: Vec<String>,
    /// Run the built-in pattern detector
    pub builtin_patterns: bool,
    /// Turn unlinked highlights into manual spans
    pub manual_from_highlights: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            with_predetect: true,
            batch_size: 8,
            batch_separator: "\n\n".to_string(),
            fail_fast: false,
            added: Vec::new(),
            exclude: Vec::new(),
            builtin_patterns: true,
            manual_from_highlights: true,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.batch_separator.is_empty() {
            return Err(ConfigError::Invalid(
                "batch_separator must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// How spans are rendered into the PDF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskMethod {
    #[default]
    Highlight,
    Annotation,
    Both,
}

impl MaskMethod {
    pub fn writes_highlight(&self) -> bool {
        matches!(self, MaskMethod::Highlight | MaskMethod::Both)
    }

    pub fn writes_annotation(&self) -> bool {
        matches!(self, MaskMethod::Annotation | MaskMethod::Both)
    }
}

impl FromStr for MaskMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "highlight" => Ok(MaskMethod::Highlight),
            "annotation" => Ok(MaskMethod::Annotation),
            "both" => Ok(MaskMethod::Both),
            other => Err(ConfigError::UnknownToken {
                option: "mask method",
                token: other.to_string(),
            }),
        }
    }
}

/// What an annotation's `/Contents` shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayText {
    #[default]
    Entity,
    Word,
    EntityAndWord,
    None,
}

impl DisplayText {
    pub fn render(&self, entity: &str, word: &str) -> Option<String> {
        match self {
            DisplayText::Entity => Some(entity.to_string()),
            DisplayText::Word => Some(word.to_string()),
            DisplayText::EntityAndWord => Some(format!("{}: {}", entity, word)),
            DisplayText::None => None,
        }
    }
}

impl FromStr for DisplayText {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entity" => Ok(DisplayText::Entity),
            "word" => Ok(DisplayText::Word),
            "entity_and_word" => Ok(DisplayText::EntityAndWord),
            "none" => Ok(DisplayText::None),
            other => Err(ConfigError::UnknownToken {
                option: "display text",
                token: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for DisplayText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisplayText::Entity => "entity",
            DisplayText::Word => "word",
            DisplayText::EntityAndWord => "entity_and_word",
            DisplayText::None => "none",
        };
        f.write_str(s)
    }
}

/// Options for the `mask` stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaskOptions {
    /// Proceed (with a warning) when the PDF hash does not match
    pub force: bool,
    /// Store the coordinate maps inside the output PDF
    pub embed_coordinates: bool,
    pub method: MaskMethod,
    pub display: DisplayText,
    /// RGB, 0-1
    pub color: [f64; 3],
    pub opacity: f64,
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self {
            force: false,
            embed_coordinates: false,
            method: MaskMethod::default(),
            display: DisplayText::default(),
            color: [1.0, 1.0, 0.0],
            opacity: 0.5,
        }
    }
}

impl MaskOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(ConfigError::Invalid(format!(
                "opacity must be within 0..=1, got {}",
                self.opacity
            )));
        }
        if self.color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(ConfigError::Invalid(
                "color components must be within 0..=1".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for a whole pipeline run, as loaded from a config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub sync: SyncConfig,
    pub detect: DetectorConfig,
    pub dedup: DedupPolicy,
    pub mask: MaskOptions,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detect.validate()?;
        self.dedup.validate()?;
        self.mask.validate()
    }
}
