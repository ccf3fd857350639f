//! Small helpers for reading lopdf objects

use lopdf::{Dictionary, Document, Object, ObjectId};
use pii_types::Quad;

/// Follow a reference one level; direct objects are returned as is
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub(crate) fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

pub(crate) fn resolve_array<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Vec<Object>> {
    match resolve(doc, obj)? {
        Object::Array(items) => Some(items),
        _ => None,
    }
}

pub(crate) fn dict_get<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    resolve(doc, dict.get(key).ok()?)
}

pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(*f as f64),
        _ => None,
    }
}

pub(crate) fn name(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::Name(n) => Some(n.as_slice()),
        _ => None,
    }
}

/// Look up a page attribute, walking `/Parent` for inherited ones
pub(crate) fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = page_id;
    // Page trees are shallow; the bound only guards against /Parent cycles
    for _ in 0..64 {
        let dict = match doc.get_object(current).ok()? {
            Object::Dictionary(dict) => dict,
            _ => return None,
        };
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value);
        }
        current = match dict.get(b"Parent").ok()? {
            Object::Reference(id) => *id,
            _ => return None,
        };
    }
    None
}

/// Object id of the document catalog
pub(crate) fn catalog_id(doc: &Document) -> Result<ObjectId, String> {
    doc.trailer
        .get(b"Root")
        .map_err(|_| "No Root in trailer".to_string())?
        .as_reference()
        .map_err(|_| "Root is not a reference".to_string())
}

/// `[x0 y0 x1 y1]` → normalized quad
pub(crate) fn rect(doc: &Document, obj: &Object) -> Option<Quad> {
    let items = resolve_array(doc, obj)?;
    if items.len() != 4 {
        return None;
    }
    let v: Vec<f64> = items.iter().filter_map(number).collect();
    if v.len() != 4 {
        return None;
    }
    Some(Quad::new(
        v[0].min(v[2]),
        v[1].min(v[3]),
        v[0].max(v[2]),
        v[1].max(v[3]),
    ))
}

/// PDF text string: UTF-16BE with BOM, then UTF-8, then Latin-1
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    bytes.iter().map(|&b| b as char).collect()
}

pub(crate) fn text_string(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict_get(doc, dict, key)? {
        Object::String(bytes, _) => Some(decode_text(bytes)),
        _ => None,
    }
}

pub(crate) fn pdf_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::String(s.as_bytes().to_vec(), lopdf::StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, lopdf::StringFormat::Hexadecimal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_fallbacks() {
        assert_eq!(decode_text(b"plain"), "plain");
        assert_eq!(decode_text(&[0xFE, 0xFF, 0x75, 0x30, 0x4E, 0x2D]), "田中");
        assert_eq!(decode_text("café".as_bytes()), "café");
        assert_eq!(decode_text(&[0x63, 0x61, 0x66, 0xE9]), "café");
    }

    #[test]
    fn test_pdf_string_round_trip() {
        for s in ["ascii", "田中太郎"] {
            match pdf_string(s) {
                Object::String(bytes, _) => assert_eq!(decode_text(&bytes), s),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_rect_normalizes() {
        let doc = Document::with_version("1.7");
        let obj = Object::Array(vec![100.into(), 50.into(), 10.into(), Object::Real(5.5)]);
        assert_eq!(rect(&doc, &obj), Some(Quad::new(10.0, 5.5, 100.0, 50.0)));
    }
}
