use pii_types::{BlockAddress, SchemaError};
use thiserror::Error;

/// The PDF could not be read or walked
#[derive(Error, Debug)]
pub enum DocumentAccessError {
    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("Page {page}: {message}")]
    Page { page: u32, message: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The PDF presented to `mask` is not the one `read` hashed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("PDF hash mismatch: document was read from {expected}, file is {actual}")]
pub struct IntegrityMismatch {
    pub expected: String,
    pub actual: String,
}

/// Invalid policy, option or flag combination
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown {option} token '{token}'")]
    UnknownToken { option: &'static str, token: String },

    #[error("Invalid regex for {context}: {message}")]
    InvalidRegex { context: String, message: String },

    #[error("{0}")]
    Invalid(String),
}

/// A detector failed on a block (or batch of blocks)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectorError {
    #[error("Detector '{detector}' failed: {message}")]
    Failed { detector: String, message: String },

    #[error("Detector '{detector}' failed on {block}: {message}")]
    Block {
        detector: String,
        block: BlockAddress,
        message: String,
    },

    #[error("Detector '{detector}' returned an invalid span: {message}")]
    InvalidSpan { detector: String, message: String },
}

/// Any failure of a pipeline stage
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    DocumentAccess(#[from] DocumentAccessError),

    #[error(transparent)]
    Integrity(#[from] IntegrityMismatch),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error("Annotation writer failed: {0}")]
    Writer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cancelled after {completed_blocks} blocks")]
    Cancelled { completed_blocks: usize },
}

impl PipelineError {
    /// Short name of the error kind, as shown to users
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Schema(_) => "SchemaError",
            PipelineError::DocumentAccess(_) => "DocumentAccessError",
            PipelineError::Integrity(_) => "IntegrityMismatch",
            PipelineError::Config(_) => "ConfigError",
            PipelineError::Detector(_) => "DetectorError",
            PipelineError::Writer(_) => "WriterError",
            PipelineError::Io(_) => "IoError",
            PipelineError::Serialization(_) => "SerializationError",
            PipelineError::Cancelled { .. } => "Cancelled",
        }
    }

    /// Process exit code: 1 integrity, 2 invalid input, 10+ internal
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Integrity(_) => 1,
            PipelineError::Schema(_)
            | PipelineError::Config(_)
            | PipelineError::DocumentAccess(_) => 2,
            PipelineError::Io(_) => 10,
            PipelineError::Detector(_) => 11,
            PipelineError::Cancelled { .. } => 12,
            PipelineError::Writer(_) => 13,
            PipelineError::Serialization(_) => 14,
        }
    }

    /// Only an integrity mismatch can be overridden (with `--force`)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::Integrity(_))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_taxonomy() {
        let integrity = PipelineError::from(IntegrityMismatch {
            expected: "a".into(),
            actual: "b".into(),
        });
        assert_eq!(integrity.exit_code(), 1);
        assert!(integrity.is_recoverable());

        let schema = PipelineError::from(SchemaError::new("detect[0].word", "mismatch"));
        assert_eq!(schema.exit_code(), 2);
        assert!(!schema.is_recoverable());

        let config = PipelineError::from(ConfigError::Invalid("bad".into()));
        assert_eq!(config.exit_code(), 2);

        let cancelled = PipelineError::Cancelled {
            completed_blocks: 3,
        };
        assert!(cancelled.exit_code() >= 10);
    }

    #[test]
    fn test_schema_error_message_names_field() {
        let err = PipelineError::from(SchemaError::new("source.pdf.sha256", "missing"));
        assert!(err.to_string().contains("source.pdf.sha256"));
        assert_eq!(err.kind(), "SchemaError");
    }
}
