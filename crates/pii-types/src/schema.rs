//! Stage-entry validation
//!
//! Documents are checked on the raw JSON value first, so the first invalid
//! or missing field is reported with its path, then deserialized and checked
//! against the cross-field invariants (text/map length equality, span words).

use serde_json::Value;
use thiserror::Error;

use crate::document::{DetectDocument, ReadDocument};
use crate::geometry::CoordKey;
use crate::position::PositionRef;
use crate::span::{Origin, Span};

/// A document is malformed or missing a field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema error at `{field}`: {reason}")]
pub struct SchemaError {
    pub field: String,
    pub reason: String,
}

impl SchemaError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    fn missing(field: &str) -> Self {
        Self::new(field, "missing required field")
    }
}

type SchemaResult<T> = Result<T, SchemaError>;

fn field<'a>(obj: &'a Value, path: &str, key: &str) -> SchemaResult<&'a Value> {
    let full = join(path, key);
    match obj.get(key) {
        Some(Value::Null) | None => Err(SchemaError::missing(&full)),
        Some(v) => Ok(v),
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn as_object<'a>(v: &'a Value, path: &str) -> SchemaResult<&'a serde_json::Map<String, Value>> {
    v.as_object()
        .ok_or_else(|| SchemaError::new(path, "expected an object"))
}

fn as_array<'a>(v: &'a Value, path: &str) -> SchemaResult<&'a Vec<Value>> {
    v.as_array()
        .ok_or_else(|| SchemaError::new(path, "expected an array"))
}

fn as_str<'a>(v: &'a Value, path: &str) -> SchemaResult<&'a str> {
    v.as_str()
        .ok_or_else(|| SchemaError::new(path, "expected a string"))
}

fn as_uint(v: &Value, path: &str) -> SchemaResult<u64> {
    v.as_u64()
        .ok_or_else(|| SchemaError::new(path, "expected a non-negative integer"))
}

fn check_header(root: &Value) -> SchemaResult<()> {
    let version = as_str(field(root, "", "schema_version")?, "schema_version")?;
    let major = version.split('.').next().unwrap_or_default();
    let expected = crate::document::SCHEMA_VERSION
        .split('.')
        .next()
        .unwrap_or_default();
    if major != expected {
        return Err(SchemaError::new(
            "schema_version",
            format!(
                "unsupported version {:?} (expected {}.x)",
                version, expected
            ),
        ));
    }

    let generated_at = as_str(field(root, "", "generated_at")?, "generated_at")?;
    chrono::DateTime::parse_from_rfc3339(generated_at)
        .map_err(|e| SchemaError::new("generated_at", format!("not RFC 3339: {}", e)))?;
    Ok(())
}

fn check_source(root: &Value) -> SchemaResult<()> {
    let source = field(root, "", "source")?;
    as_object(source, "source")?;
    let pdf = field(source, "source", "pdf")?;
    as_object(pdf, "source.pdf")?;

    as_str(field(pdf, "source.pdf", "filename")?, "source.pdf.filename")?;
    as_str(field(pdf, "source.pdf", "path")?, "source.pdf.path")?;
    as_uint(field(pdf, "source.pdf", "size")?, "source.pdf.size")?;
    as_uint(field(pdf, "source.pdf", "page_count")?, "source.pdf.page_count")?;

    let sha = as_str(field(pdf, "source.pdf", "sha256")?, "source.pdf.sha256")?;
    if sha.len() != 64 || !sha.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(SchemaError::new(
            "source.pdf.sha256",
            "expected 64 hexadecimal characters",
        ));
    }
    Ok(())
}

fn check_quad(v: &Value, path: &str) -> SchemaResult<()> {
    let arr = as_array(v, path)?;
    if arr.len() != 4 || !arr.iter().all(|n| n.as_f64().is_some()) {
        return Err(SchemaError::new(path, "expected [x0,y0,x1,y1]"));
    }
    Ok(())
}

fn check_content(root: &Value) -> SchemaResult<()> {
    let content = field(root, "", "content")?;
    as_object(content, "content")?;
    let pages = as_array(field(content, "content", "pages")?, "content.pages")?;

    for (i, page) in pages.iter().enumerate() {
        let path = format!("content.pages[{}]", i);
        as_object(page, &path)?;
        as_uint(field(page, &path, "page_num")?, &join(&path, "page_num"))?;
        check_quad(field(page, &path, "media_box")?, &join(&path, "media_box"))?;

        let blocks_path = join(&path, "blocks");
        let blocks = as_array(field(page, &path, "blocks")?, &blocks_path)?;
        for (j, block) in blocks.iter().enumerate() {
            let bpath = format!("{}[{}]", blocks_path, j);
            as_object(block, &bpath)?;
            as_uint(field(block, &bpath, "block_num")?, &join(&bpath, "block_num"))?;
            as_str(field(block, &bpath, "text")?, &join(&bpath, "text"))?;
        }
    }
    Ok(())
}

fn check_highlights(root: &Value) -> SchemaResult<()> {
    let Some(highlights) = root.get("highlights") else {
        return Ok(());
    };
    let highlights = as_array(highlights, "highlights")?;
    for (i, h) in highlights.iter().enumerate() {
        let path = format!("highlights[{}]", i);
        as_object(h, &path)?;
        as_str(field(h, &path, "id")?, &join(&path, "id"))?;
        as_uint(field(h, &path, "page")?, &join(&path, "page"))?;
        let quads_path = join(&path, "quads");
        for (k, q) in as_array(field(h, &path, "quads")?, &quads_path)?
            .iter()
            .enumerate()
        {
            check_quad(q, &format!("{}[{}]", quads_path, k))?;
        }
    }
    Ok(())
}

fn check_maps(root: &Value) -> SchemaResult<()> {
    if let Some(forward) = root.get("offset2coordsMap") {
        for (page, blocks) in as_object(forward, "offset2coordsMap")? {
            let ppath = format!("offset2coordsMap.{}", page);
            page.parse::<u32>()
                .map_err(|_| SchemaError::new(&ppath, "page key is not an integer"))?;
            for (block, quads) in as_object(blocks, &ppath)? {
                let bpath = format!("{}.{}", ppath, block);
                block
                    .parse::<u32>()
                    .map_err(|_| SchemaError::new(&bpath, "block key is not an integer"))?;
                for (k, q) in as_array(quads, &bpath)?.iter().enumerate() {
                    check_quad(q, &format!("{}[{}]", bpath, k))?;
                }
            }
        }
    }

    if let Some(reverse) = root.get("coords2offsetMap") {
        for (key, position) in as_object(reverse, "coords2offsetMap")? {
            let path = format!("coords2offsetMap.{}", key);
            key.parse::<CoordKey>()
                .map_err(|e| SchemaError::new(&path, e.to_string()))?;
            as_str(position, &path)?
                .parse::<PositionRef>()
                .map_err(|e| SchemaError::new(&path, e.to_string()))?;
        }
    }
    Ok(())
}

fn check_position(v: &Value, path: &str) -> SchemaResult<()> {
    as_object(v, path)?;
    let page = v.get("page_num").or_else(|| v.get("page"));
    let block = v.get("block_num").or_else(|| v.get("block"));
    as_uint(
        page.ok_or_else(|| SchemaError::missing(&join(path, "page_num")))?,
        &join(path, "page_num"),
    )?;
    as_uint(
        block.ok_or_else(|| SchemaError::missing(&join(path, "block_num")))?,
        &join(path, "block_num"),
    )?;
    as_uint(field(v, path, "offset")?, &join(path, "offset"))?;
    Ok(())
}

fn check_spans(root: &Value) -> SchemaResult<()> {
    let Some(spans) = root.get("detect") else {
        return Ok(());
    };
    for (i, span) in as_array(spans, "detect")?.iter().enumerate() {
        let path = format!("detect[{}]", i);
        as_object(span, &path)?;
        check_position(field(span, &path, "start")?, &join(&path, "start"))?;
        check_position(field(span, &path, "end")?, &join(&path, "end"))?;
        as_str(field(span, &path, "entity")?, &join(&path, "entity"))?;
        as_str(field(span, &path, "word")?, &join(&path, "word"))?;
        let origin_path = join(&path, "origin");
        as_str(field(span, &path, "origin")?, &origin_path)?
            .parse::<Origin>()
            .map_err(|e| SchemaError::new(&origin_path, e))?;
    }
    Ok(())
}

/// Check the cross-field invariants of a typed read document
pub fn check_read_invariants(doc: &ReadDocument) -> SchemaResult<()> {
    let mut last_page: Option<u32> = None;
    for (i, page) in doc.content.pages.iter().enumerate() {
        if last_page.is_some_and(|p| p >= page.page_num) {
            return Err(SchemaError::new(
                format!("content.pages[{}].page_num", i),
                "pages must be in strictly ascending order",
            ));
        }
        last_page = Some(page.page_num);

        let mut last_block: Option<u32> = None;
        for (j, block) in page.blocks.iter().enumerate() {
            if last_block.is_some_and(|b| b >= block.block_num) {
                return Err(SchemaError::new(
                    format!("content.pages[{}].blocks[{}].block_num", i, j),
                    "blocks must be in strictly ascending order",
                ));
            }
            last_block = Some(block.block_num);
        }
    }

    if let Some(forward) = &doc.offset_to_coords {
        for (address, text) in doc.blocks() {
            let path = format!(
                "offset2coordsMap.{}.{}",
                address.page_num, address.block_num
            );
            let quads = forward
                .get(address)
                .ok_or_else(|| SchemaError::missing(&path))?;
            let len = text.chars().count();
            if quads.len() != len {
                return Err(SchemaError::new(
                    path,
                    format!(
                        "{} quads for a block of {} characters",
                        quads.len(),
                        len
                    ),
                ));
            }
        }
        if forward.block_count() != doc.blocks().count() {
            return Err(SchemaError::new(
                "offset2coordsMap",
                "map carries blocks that are not in content",
            ));
        }
    }

    if let Some(reverse) = &doc.coords_to_offset {
        for (key, position) in reverse.iter() {
            let path = format!("coords2offsetMap.{}", key);
            let quad = doc
                .block_quads(position.block())
                .and_then(|quads| quads.get(position.offset));
            match (&doc.offset_to_coords, quad) {
                (None, _) => {}
                (Some(_), Some(q)) if q.key() == *key => {}
                (Some(_), _) => {
                    return Err(SchemaError::new(
                        path,
                        format!("{} does not address this quad", position),
                    ))
                }
            }
        }
    }

    Ok(())
}

/// Check one span against the text it addresses
pub fn check_span(doc: &ReadDocument, span: &Span, path: &str) -> SchemaResult<()> {
    if span.start.block() != span.end.block() {
        return Err(SchemaError::new(
            join(path, "end"),
            "start and end must be in the same block",
        ));
    }
    if span.start.offset >= span.end.offset {
        return Err(SchemaError::new(
            join(path, "end"),
            "end offset must be greater than start offset",
        ));
    }
    let text = doc.block_text(span.block()).ok_or_else(|| {
        SchemaError::new(
            join(path, "start"),
            format!("{} does not exist", span.block()),
        )
    })?;
    let addressed: String = text
        .chars()
        .skip(span.start.offset)
        .take(span.len())
        .collect();
    if addressed.chars().count() != span.len() {
        return Err(SchemaError::new(
            join(path, "end"),
            "offset beyond the end of the block",
        ));
    }
    if addressed != span.word {
        return Err(SchemaError::new(
            join(path, "word"),
            format!("word {:?} does not match text {:?}", span.word, addressed),
        ));
    }
    Ok(())
}

/// Parse JSON text that must hold a document object
pub fn parse_document_value(json: &str) -> SchemaResult<Value> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| SchemaError::new("<document>", format!("invalid JSON: {}", e)))?;
    as_object(&value, "<document>")?;
    Ok(value)
}

/// Validate and deserialize a `read` (or later-stage) document
pub fn read_document_from_value(value: Value) -> SchemaResult<ReadDocument> {
    check_header(&value)?;
    check_source(&value)?;
    check_content(&value)?;
    check_highlights(&value)?;
    check_maps(&value)?;

    let doc: ReadDocument = serde_json::from_value(value)
        .map_err(|e| SchemaError::new("<document>", e.to_string()))?;
    check_read_invariants(&doc)?;
    Ok(doc)
}

/// Validate and deserialize a document that may carry `detect` spans
///
/// A plain read document is accepted and yields an empty `detect` list.
pub fn detect_document_from_value(value: Value) -> SchemaResult<DetectDocument> {
    check_header(&value)?;
    check_source(&value)?;
    check_content(&value)?;
    check_highlights(&value)?;
    check_maps(&value)?;
    check_spans(&value)?;

    let doc: DetectDocument = serde_json::from_value(value)
        .map_err(|e| SchemaError::new("<document>", e.to_string()))?;
    check_read_invariants(&doc.read)?;
    for (i, span) in doc.detect.iter().enumerate() {
        check_span(&doc.read, span, &format!("detect[{}]", i))?;
    }
    Ok(doc)
}

pub fn parse_read_document(json: &str) -> SchemaResult<ReadDocument> {
    read_document_from_value(parse_document_value(json)?)
}

pub fn parse_detect_document(json: &str) -> SchemaResult<DetectDocument> {
    detect_document_from_value(parse_document_value(json)?)
}
