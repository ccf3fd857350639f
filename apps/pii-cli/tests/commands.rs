//! Commands run end to end against files in a temp directory

use clap::Parser;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use pii_cli::cli::Cli;
use pii_cli::{run, CliError};
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_test_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id: ObjectId = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let content = b"BT /F1 10 Tf 72 700 Td (Mail hanako@example.jp) Tj ET \
BT /F1 10 Tf 72 650 Td (Call 090-1234-5678 today) Tj ET";
    let content_id = doc.add_object(Stream::new(lopdf::Dictionary::new(), content.to_vec()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => content_id,
        "Resources" => Object::Dictionary(dictionary! {
            "Font" => Object::Dictionary(dictionary! {
                "F1" => font_id,
            }),
        }),
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::from(page_id)],
            "Count" => 1i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        fs::write(ws.path("doc.pdf"), create_test_pdf()).unwrap();
        ws
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run(&self, args: &[&str]) -> Result<(), CliError> {
        let mut argv = vec!["pii-sync".to_string()];
        for arg in args {
            // Bare file names live in the workspace
            if arg.contains('.') && !arg.starts_with('-') && !arg.contains(':') {
                argv.push(self.path(arg).display().to_string());
            } else {
                argv.push(arg.to_string());
            }
        }
        run(Cli::parse_from(argv))
    }

    fn json(&self, name: &str) -> Value {
        serde_json::from_str(&fs::read_to_string(self.path(name)).unwrap()).unwrap()
    }
}

fn words(doc: &Value) -> Vec<(String, String)> {
    doc["detect"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| {
            (
                s["entity"].as_str().unwrap().to_string(),
                s["word"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

#[test]
fn test_read_writes_document() {
    let ws = Workspace::new();
    ws.run(&["read", "doc.pdf", "--out", "read.json"]).unwrap();

    let doc = ws.json("read.json");
    assert_eq!(doc["schema_version"], "1.0");
    assert_eq!(doc["source"]["pdf"]["filename"], "doc.pdf");
    assert_eq!(doc["content"]["pages"][0]["blocks"][0]["text"], "Mail hanako@example.jp");
    assert!(doc.get("offset2coordsMap").is_some());
    assert!(doc.get("highlights").is_some());
}

#[test]
fn test_read_no_map_omits_maps() {
    let ws = Workspace::new();
    ws.run(&["read", "doc.pdf", "--no-map", "--no-highlights", "--out", "read.json"])
        .unwrap();

    let doc = ws.json("read.json");
    assert!(doc.get("offset2coordsMap").is_none());
    assert!(doc.get("coords2offsetMap").is_none());
    assert!(doc.get("highlights").is_none());
}

#[test]
fn test_full_chain_masks_pdf() {
    let ws = Workspace::new();
    ws.run(&["read", "doc.pdf", "--out", "read.json"]).unwrap();
    ws.run(&[
        "detect",
        "--from",
        "read.json",
        "--add",
        "GREETING:Call",
        "--out",
        "detect.json",
        "--pretty",
    ])
    .unwrap();

    let detected = ws.json("detect.json");
    assert_eq!(
        words(&detected),
        vec![
            ("EMAIL".to_string(), "hanako@example.jp".to_string()),
            ("GREETING".to_string(), "Call".to_string()),
            ("PHONE_NUMBER".to_string(), "090-1234-5678".to_string()),
        ]
    );
    assert!(detected["read_json_sha256"].is_string());

    ws.run(&[
        "duplicate-process",
        "--from",
        "detect.json",
        "--entity-overlap-mode",
        "any",
        "--out",
        "dedup.json",
    ])
    .unwrap();
    assert_eq!(words(&ws.json("dedup.json")).len(), 3);

    ws.run(&[
        "mask",
        "doc.pdf",
        "--json",
        "dedup.json",
        "--out",
        "masked.pdf",
        "--embed-coordinates",
    ])
    .unwrap();
    let masked = fs::read(ws.path("masked.pdf")).unwrap();
    let doc = Document::load_mem(&masked).unwrap();
    assert_eq!(doc.get_pages().len(), 1);

    // The masked PDF reads back with the same text
    ws.run(&["read", "masked.pdf", "--out", "reread.json"]).unwrap();
    assert_eq!(
        ws.json("reread.json")["content"],
        ws.json("read.json")["content"]
    );
}

#[test]
fn test_mask_hash_mismatch_writes_nothing() {
    let ws = Workspace::new();
    ws.run(&["read", "doc.pdf", "--out", "read.json"]).unwrap();
    ws.run(&["detect", "--from", "read.json", "--out", "detect.json"])
        .unwrap();

    let mut doc = ws.json("detect.json");
    doc["source"]["pdf"]["sha256"] = Value::String("0".repeat(64));
    fs::write(ws.path("stale.json"), doc.to_string()).unwrap();

    let err = ws
        .run(&["mask", "doc.pdf", "--json", "stale.json", "--out", "masked.pdf"])
        .unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert_eq!(err.kind(), "IntegrityMismatch");
    assert!(!Path::new(&ws.path("masked.pdf")).exists());

    ws.run(&[
        "mask",
        "doc.pdf",
        "--json",
        "stale.json",
        "--out",
        "masked.pdf",
        "--force",
    ])
    .unwrap();
    assert!(ws.path("masked.pdf").exists());
}

#[test]
fn test_mask_refuses_to_overwrite_source() {
    let ws = Workspace::new();
    ws.run(&["read", "doc.pdf", "--out", "read.json"]).unwrap();
    ws.run(&["detect", "--from", "read.json", "--out", "detect.json"])
        .unwrap();

    let before = fs::read(ws.path("doc.pdf")).unwrap();
    let err = ws
        .run(&["mask", "doc.pdf", "--json", "detect.json", "--out", "doc.pdf"])
        .unwrap_err();
    assert_eq!(err.kind(), "ConfigError");
    assert_eq!(err.exit_code(), 2);
    assert_eq!(fs::read(ws.path("doc.pdf")).unwrap(), before);
}

#[test]
fn test_invalid_input_exit_codes() {
    let ws = Workspace::new();
    ws.run(&["read", "doc.pdf", "--out", "read.json"]).unwrap();

    let err = ws
        .run(&["duplicate-process", "--from", "read.json", "--keep", "manual,newest"])
        .unwrap_err();
    assert_eq!(err.exit_code(), 2);

    fs::write(ws.path("broken.json"), r#"{"schema_version": "1.0"}"#).unwrap();
    let err = ws
        .run(&["detect", "--from", "broken.json", "--out", "detect.json"])
        .unwrap_err();
    assert_eq!(err.kind(), "SchemaError");
    assert_eq!(err.exit_code(), 2);
    assert!(!ws.path("detect.json").exists());

    fs::write(ws.path("garbage.json"), "{not json").unwrap();
    for args in [
        &["detect", "--from", "garbage.json"][..],
        &["duplicate-process", "--from", "garbage.json"][..],
        &["mask", "doc.pdf", "--json", "garbage.json", "--out", "masked.pdf"][..],
        &["detect", "--from", "absent.json"][..],
    ] {
        let err = ws.run(args).unwrap_err();
        assert_eq!(err.kind(), "SchemaError", "{:?}", args);
        assert_eq!(err.exit_code(), 2, "{:?}", args);
    }
    assert!(!ws.path("masked.pdf").exists());

    fs::write(ws.path("notes.pdf"), b"plain text").unwrap();
    let err = ws.run(&["read", "notes.pdf"]).unwrap_err();
    assert_eq!(err.kind(), "DocumentAccessError");
}

#[test]
fn test_config_file_sets_defaults() {
    let ws = Workspace::new();
    fs::write(
        ws.path("pii.toml"),
        "[detect]\nbuiltin_patterns = false\nadded = [{ entity = \"MAIL_WORD\", pattern = \"Mail\" }]\n",
    )
    .unwrap();
    ws.run(&["read", "doc.pdf", "--out", "read.json"]).unwrap();
    ws.run(&[
        "--config",
        "pii.toml",
        "detect",
        "--from",
        "read.json",
        "--out",
        "detect.json",
    ])
    .unwrap();
    assert_eq!(
        words(&ws.json("detect.json")),
        vec![("MAIL_WORD".to_string(), "Mail".to_string())]
    );

    let err = ws
        .run(&["--config", "missing.toml", "read", "doc.pdf"])
        .unwrap_err();
    assert_eq!(err.exit_code(), 2);
}
