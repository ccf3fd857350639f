//! Batched detector invocation with per-block failure isolation

use pii_types::{BlockAddress, BlockError, Span};
use tracing::{debug, warn};

use super::{Detector, ExcludeFilter, LocalSpan};
use crate::cancel::CancelFlag;
use crate::config::DetectorConfig;
use crate::error::{ConfigError, DetectorError, PipelineError};
use crate::resolver::BatchLayout;

/// Spans found plus the blocks that could not be processed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub spans: Vec<Span>,
    pub errors: Vec<BlockError>,
}

pub struct BatchRunner {
    detectors: Vec<Box<dyn Detector>>,
    exclude: ExcludeFilter,
    batch_size: usize,
    separator: String,
    fail_fast: bool,
}

impl BatchRunner {
    pub fn new(
        detectors: Vec<Box<dyn Detector>>,
        config: &DetectorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            detectors,
            exclude: ExcludeFilter::new(&config.exclude)?,
            batch_size: config.batch_size,
            separator: config.batch_separator.clone(),
            fail_fast: config.fail_fast,
        })
    }

    pub fn exclude(&self) -> &ExcludeFilter {
        &self.exclude
    }

    /// Run every detector over `blocks`, `batch_size` blocks per call
    ///
    /// Spans come back sorted by position; ties keep detector order.
    pub fn run(
        &self,
        blocks: &[(BlockAddress, &str)],
        cancel: &CancelFlag,
    ) -> Result<BatchOutcome, PipelineError> {
        let blocks: Vec<(BlockAddress, &str)> = blocks
            .iter()
            .filter(|(_, text)| !text.is_empty())
            .copied()
            .collect();
        let mut outcome = BatchOutcome::default();
        let mut completed = 0usize;

        for detector in &self.detectors {
            for chunk in blocks.chunks(self.batch_size) {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled {
                        completed_blocks: completed,
                    });
                }
                match self.detect_chunk(detector.as_ref(), chunk) {
                    Ok(spans) => outcome.spans.extend(spans),
                    Err(e) if chunk.len() > 1 => {
                        debug!(
                            detector = detector.name(),
                            blocks = chunk.len(),
                            error = %e,
                            "batch failed, retrying block by block"
                        );
                        for block in chunk {
                            match self.detect_chunk(detector.as_ref(), std::slice::from_ref(block)) {
                                Ok(spans) => outcome.spans.extend(spans),
                                Err(e) => self.record_failure(detector.as_ref(), block.0, e, &mut outcome)?,
                            }
                        }
                    }
                    Err(e) => self.record_failure(detector.as_ref(), chunk[0].0, e, &mut outcome)?,
                }
                completed += chunk.len();
            }
        }

        let before = outcome.spans.len();
        outcome
            .spans
            .retain(|span| !self.exclude.is_excluded(&span.word));
        if outcome.spans.len() < before {
            debug!(dropped = before - outcome.spans.len(), "excluded detections");
        }
        outcome
            .spans
            .sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)));
        Ok(outcome)
    }

    fn record_failure(
        &self,
        detector: &dyn Detector,
        block: BlockAddress,
        error: DetectorError,
        outcome: &mut BatchOutcome,
    ) -> Result<(), PipelineError> {
        let message = error.to_string();
        if self.fail_fast {
            return Err(DetectorError::Block {
                detector: detector.name().to_string(),
                block,
                message,
            }
            .into());
        }
        warn!(detector = detector.name(), %block, %message, "detector failed on block");
        outcome.errors.push(BlockError {
            page_num: block.page_num,
            block_num: block.block_num,
            kind: "DetectorError".to_string(),
            message,
        });
        Ok(())
    }

    fn detect_chunk(
        &self,
        detector: &dyn Detector,
        chunk: &[(BlockAddress, &str)],
    ) -> Result<Vec<Span>, DetectorError> {
        let layout = BatchLayout::new(chunk.iter().copied(), &self.separator);
        let locals = detector.detect(&layout.text)?;
        let chars: Vec<char> = layout.text.chars().collect();

        let mut spans = Vec::with_capacity(locals.len());
        for local in locals {
            check_local(detector, &local, &chars)?;
            let Some((start, end)) = layout.locate(local.start_offset, local.end_offset) else {
                warn!(
                    detector = detector.name(),
                    entity = %local.entity_type,
                    word = %local.word,
                    "dropping detection that crosses a block boundary"
                );
                continue;
            };
            let mut span = Span::new(
                start.block(),
                start.offset,
                end.offset,
                &local.entity_type,
                &local.word,
                detector.origin(),
            );
            span = span.with_model(detector.model_id().map(str::to_string), local.confidence);
            spans.push(span);
        }
        Ok(spans)
    }
}

/// Offsets must be in range and agree with the reported word
fn check_local(detector: &dyn Detector, local: &LocalSpan, chars: &[char]) -> Result<(), DetectorError> {
    let invalid = |message: String| DetectorError::InvalidSpan {
        detector: detector.name().to_string(),
        message,
    };
    if local.start_offset >= local.end_offset || local.end_offset > chars.len() {
        return Err(invalid(format!(
            "offsets [{}, {}) outside text of length {}",
            local.start_offset,
            local.end_offset,
            chars.len()
        )));
    }
    let slice: String = chars[local.start_offset..local.end_offset].iter().collect();
    if slice != local.word {
        return Err(invalid(format!(
            "word '{}' does not match text '{}' at [{}, {})",
            local.word, slice, local.start_offset, local.end_offset
        )));
    }
    Ok(())
}
