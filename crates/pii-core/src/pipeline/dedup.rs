use pii_types::{check_span, DetectDocument};
use tracing::info;

use crate::dedup::{DedupPolicy, DeduplicationEngine};
use crate::error::PipelineError;

/// Reduce the `detect` array to one span per conflict cluster
pub fn duplicate_process(
    mut input: DetectDocument,
    policy: &DedupPolicy,
) -> Result<DetectDocument, PipelineError> {
    let engine = DeduplicationEngine::new(policy.clone())?;
    for (i, span) in input.detect.iter().enumerate() {
        check_span(&input.read, span, &format!("detect[{}]", i))?;
    }

    let before = input.detect.len();
    input.detect = engine.run(std::mem::take(&mut input.detect));
    input.touch();

    info!(
        input = before,
        kept = input.detect.len(),
        "duplicate-process complete"
    );
    Ok(input)
}
