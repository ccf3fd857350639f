//! Hashes that tie every derived document to the exact PDF bytes it came from

use chrono::{DateTime, Utc};
use pii_types::{PdfSource, SourceDocument};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::SystemTime;
use tracing::warn;

use crate::error::IntegrityMismatch;

/// Hex SHA-256 of raw bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 of a JSON value in canonical form (object keys sorted,
/// no insignificant whitespace)
pub fn canonical_json_sha256(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    sha256_hex(canonical.as_bytes())
}

/// Serialize with object keys sorted regardless of the map's own order
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Keys that change between stages without changing what was read
const VOLATILE_KEYS: [&str; 5] = [
    "generated_at",
    "highlights",
    "detect",
    "errors",
    "read_json_sha256",
];

/// `read_json_sha256` of a read or detect document
///
/// Covers the header version, source, content and coordinate maps, so every
/// document derived from the same `read` output carries the same value.
pub fn read_json_sha256(document: &Value) -> String {
    match document {
        Value::Object(map) => {
            let mut stable = map.clone();
            for key in VOLATILE_KEYS {
                stable.remove(key);
            }
            canonical_json_sha256(&Value::Object(stable))
        }
        other => canonical_json_sha256(other),
    }
}

/// Compare the PDF bytes against the hash recorded at read time
///
/// With `force` a mismatch is logged and accepted.
pub fn verify_pdf(bytes: &[u8], expected: &str, force: bool) -> Result<(), IntegrityMismatch> {
    let actual = sha256_hex(bytes);
    if actual.eq_ignore_ascii_case(expected) {
        return Ok(());
    }
    let mismatch = IntegrityMismatch {
        expected: expected.to_string(),
        actual,
    };
    if force {
        warn!(
            expected = %mismatch.expected,
            actual = %mismatch.actual,
            "PDF hash mismatch, proceeding because of --force"
        );
        return Ok(());
    }
    Err(mismatch)
}

fn rfc3339(time: std::io::Result<SystemTime>) -> Option<String> {
    time.ok().map(|t| DateTime::<Utc>::from(t).to_rfc3339())
}

/// Source record for a PDF about to be read
pub fn describe_source(path: &Path, bytes: &[u8], page_count: u32) -> SourceDocument {
    let metadata = std::fs::metadata(path).ok();
    let (created_at, modified_at) = match &metadata {
        Some(meta) => (rfc3339(meta.created()), rfc3339(meta.modified())),
        None => (None, None),
    };
    SourceDocument {
        pdf: PdfSource {
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_string_lossy().into_owned(),
            size: bytes.len() as u64,
            page_count,
            sha256: sha256_hex(bytes),
            created_at,
            modified_at,
        },
    }
}
