use pii_types::{BlockAddress, DetectDocument, Span};
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::config::DetectorConfig;
use crate::detector::{BatchRunner, Detector, PatternDetector, RegexDetector};
use crate::error::{ConfigError, PipelineError};
use crate::highlights::{link_highlights, manual_spans};
use crate::resolver::SpanResolver;

/// Detectors implied by the configuration: built-in patterns and one
/// regex detector per added entity
pub fn configured_detectors(config: &DetectorConfig) -> Result<Vec<Box<dyn Detector>>, ConfigError> {
    let mut detectors: Vec<Box<dyn Detector>> = Vec::new();
    if config.builtin_patterns {
        detectors.push(Box::new(PatternDetector::new()));
    }
    for added in &config.added {
        detectors.push(Box::new(RegexDetector::new(added)?));
    }
    Ok(detectors)
}

/// Run detectors over a read (or earlier detect) document
///
/// `read_json_sha256` is the hash of the input's read portion; when the
/// input already carries a different one it is reported, not enforced.
pub fn detect(
    input: DetectDocument,
    read_json_sha256: String,
    config: &DetectorConfig,
    detectors: Vec<Box<dyn Detector>>,
    cancel: &CancelFlag,
) -> Result<DetectDocument, PipelineError> {
    let runner = BatchRunner::new(detectors, config)?;

    if let Some(carried) = &input.read_json_sha256 {
        if *carried != read_json_sha256 {
            warn!(
                carried = %carried,
                computed = %read_json_sha256,
                "read_json_sha256 does not match the document content"
            );
        }
    }

    let DetectDocument {
        mut read, detect: predetected, ..
    } = input;

    let mut spans: Vec<Span> = if config.with_predetect {
        predetected
    } else {
        debug!(discarded = predetected.len(), "discarding pre-existing spans");
        Vec::new()
    };

    let outcome = {
        let blocks: Vec<(BlockAddress, &str)> = read.blocks().collect();
        info!(blocks = blocks.len(), "running detectors");
        runner.run(&blocks, cancel)?
    };
    let detected = outcome.spans.len();
    spans.extend(outcome.spans);

    if let Some(mut highlights) = read.highlights.take() {
        match SpanResolver::new(&read) {
            Ok(resolver) => {
                let linked = link_highlights(&mut highlights, &spans, &resolver)?;
                debug!(linked, "linked highlights to spans");
                if config.manual_from_highlights {
                    for highlight in highlights.iter_mut().filter(|h| h.pii.is_empty()) {
                        let manual = manual_spans(highlight, &read);
                        highlight.pii.extend(manual.iter().map(|s| s.id.clone()));
                        spans.extend(manual);
                    }
                }
            }
            Err(_) => debug!("no coordinate maps, highlights left unlinked"),
        }
        read.highlights = Some(highlights);
    }

    let mut out = DetectDocument::from_read(read);
    out.read_json_sha256 = Some(read_json_sha256);
    out.detect = spans;
    out.errors = outcome.errors;
    out.touch();

    info!(
        detected,
        total = out.detect.len(),
        failed_blocks = out.errors.len(),
        "detect complete"
    );
    Ok(out)
}
