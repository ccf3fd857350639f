//! End-to-end properties over JSON round trips between stages

use pii_core::{
    configured_detectors, detect, duplicate_process, read, read_json_sha256, sha256_hex,
    CancelFlag, DedupPolicy, DetectorConfig, MemoryProvider, RawBlock, RawGlyph, RawLine, RawPage,
    RawSpan, ReadOptions, SpanResolver,
};
use pii_types::{
    parse_detect_document, parse_read_document, BlockAddress, DetectDocument, Origin, PdfSource,
    PositionRef, Quad, SourceDocument, Span,
};
use pretty_assertions::assert_eq;
use serde_json::Value;

fn glyph_line(text: &str, x: f64, y: f64, advance: f64) -> RawLine {
    let glyphs = text
        .chars()
        .enumerate()
        .filter(|(_, c)| *c != ' ')
        .map(|(i, c)| {
            let x0 = x + advance * i as f64;
            RawGlyph::new(c.to_string(), Quad::new(x0, y, x0 + advance, y + advance))
        })
        .collect();
    RawLine {
        spans: vec![RawSpan {
            font_size: advance,
            glyphs,
        }],
    }
}

fn provider() -> MemoryProvider {
    MemoryProvider::new(vec![
        RawPage {
            page_num: 0,
            rotation: 0,
            media_box: Quad::new(0.0, 0.0, 595.0, 842.0),
            blocks: vec![
                RawBlock {
                    lines: vec![glyph_line("田中太郎は東京都渋谷区に住む", 72.0, 760.0, 10.5)],
                },
                RawBlock {
                    lines: vec![
                        glyph_line("Contact: hanako@example.jp", 72.0, 700.0, 7.0),
                        glyph_line("Card 4111 1111 1111 1111", 72.0, 686.0, 7.0),
                    ],
                },
                RawBlock::default(),
            ],
        },
        RawPage {
            page_num: 1,
            rotation: 90,
            media_box: Quad::new(0.0, 0.0, 595.0, 842.0),
            blocks: vec![RawBlock {
                lines: vec![glyph_line("Server 10.0.0.12", 72.0, 760.0, 7.0)],
            }],
        },
    ])
}

fn source() -> SourceDocument {
    SourceDocument {
        pdf: PdfSource {
            filename: "fixture.pdf".into(),
            path: "fixture.pdf".into(),
            size: 11,
            page_count: 2,
            sha256: sha256_hex(b"fixture pdf"),
            created_at: None,
            modified_at: None,
        },
    }
}

fn read_json(options: &ReadOptions) -> String {
    let doc = read(&provider(), source(), options, &CancelFlag::new()).unwrap();
    serde_json::to_string(&doc).unwrap()
}

#[test]
fn test_block_text_length_equals_map_length() {
    let doc = parse_read_document(&read_json(&ReadOptions::default())).unwrap();
    let forward = doc.offset_to_coords.as_ref().unwrap();
    let mut blocks = 0;
    for (block, text) in doc.blocks() {
        assert_eq!(text.chars().count(), forward.get(block).unwrap().len());
        blocks += 1;
    }
    assert_eq!(blocks, 4);
    assert_eq!(doc.block_text(BlockAddress::new(0, 2)), Some(""));
}

#[test]
fn test_reverse_map_closure() {
    let doc = parse_read_document(&read_json(&ReadOptions::default())).unwrap();
    let forward = doc.offset_to_coords.as_ref().unwrap();
    let reverse = doc.coords_to_offset.as_ref().unwrap();
    assert!(!reverse.is_empty());
    for (key, position) in reverse.iter() {
        let quad = forward.get(position.block()).unwrap()[position.offset];
        assert_eq!(quad.key(), *key);
    }
}

#[test]
fn test_no_map_omits_both_maps() {
    let json = read_json(&ReadOptions {
        with_map: false,
        ..Default::default()
    });
    let value: Value = serde_json::from_str(&json).unwrap();
    assert!(value.get("offset2coordsMap").is_none());
    assert!(value.get("coords2offsetMap").is_none());
    assert!(value.get("content").is_some());
    assert!(parse_read_document(&json).is_ok());
}

#[test]
fn test_person_span_resolves_to_one_rect() {
    let doc = parse_read_document(&read_json(&ReadOptions::default())).unwrap();
    let span: Span = serde_json::from_value(serde_json::json!({
        "start": {"page": 0, "block": 0, "offset": 0},
        "end": {"page": 0, "block": 0, "offset": 4},
        "entity": "PERSON",
        "word": "田中太郎",
        "origin": "model"
    }))
    .unwrap();
    assert_eq!(span.start, PositionRef::new(0, 0, 0));

    let resolver = SpanResolver::new(&doc).unwrap();
    let rects = resolver.rects(&span).unwrap();
    let quads = doc.block_quads(span.block()).unwrap();
    assert_eq!(rects, vec![Quad::union_all(&quads[0..4]).unwrap()]);
    assert_eq!(rects[0], Quad::new(72.0, 760.0, 114.0, 770.5));
}

#[test]
fn test_stages_chain_through_json() {
    let read_text = read_json(&ReadOptions::default());
    let read_value: Value = serde_json::from_str(&read_text).unwrap();
    let hash = read_json_sha256(&read_value);

    let input = parse_detect_document(&read_text).unwrap();
    let config = DetectorConfig::default();
    let detected = detect(
        input,
        hash.clone(),
        &config,
        configured_detectors(&config).unwrap(),
        &CancelFlag::new(),
    )
    .unwrap();
    let detect_text = serde_json::to_string(&detected).unwrap();

    let reparsed = parse_detect_document(&detect_text).unwrap();
    let entities: Vec<&str> = reparsed.detect.iter().map(|s| s.entity.as_str()).collect();
    assert_eq!(entities, vec!["EMAIL", "CREDIT_CARD", "IP_ADDRESS"]);
    assert_eq!(reparsed.read_json_sha256.as_deref(), Some(hash.as_str()));

    // The read portion hash survives the detect stage
    let detect_value: Value = serde_json::from_str(&detect_text).unwrap();
    assert_eq!(read_json_sha256(&detect_value), hash);

    for span in &reparsed.detect {
        let text = reparsed.read.block_text(span.block()).unwrap();
        let slice: String = text
            .chars()
            .skip(span.start.offset)
            .take(span.len())
            .collect();
        assert_eq!(slice, span.word);
    }
}

#[test]
fn test_duplicate_process_twice_removes_nothing_more() {
    let mut doc = DetectDocument::from_read(parse_read_document(&read_json(&ReadOptions::default())).unwrap());
    let block = BlockAddress::new(0, 0);
    doc.detect = vec![
        Span::new(block, 0, 4, "PERSON", "田中太郎", Origin::Model),
        Span::new(block, 0, 4, "PERSON", "田中太郎", Origin::Manual),
        Span::new(block, 2, 4, "PERSON", "太郎", Origin::Added),
        Span::new(block, 5, 11, "LOCATION", "東京都渋谷区", Origin::Model),
    ];
    let once = duplicate_process(doc, &DedupPolicy::default()).unwrap();
    assert_eq!(once.detect.len(), 2);
    assert_eq!(once.detect[0].origin, Origin::Manual);

    let json = serde_json::to_string(&once).unwrap();
    let twice = duplicate_process(parse_detect_document(&json).unwrap(), &DedupPolicy::default()).unwrap();
    assert_eq!(once.detect, twice.detect);
}
