//! Config file loading and command-line overrides

use anyhow::Context;
use pii_core::{
    AddedEntity, ConfigError, DedupPolicy, DetectorConfig, MaskOptions, PipelineConfig,
};
use std::fs;
use std::path::Path;

use crate::cli::{toggle, DedupArgs, DetectArgs, MaskArgs};

/// Load a pipeline configuration from a TOML file
pub fn from_file(path: &Path) -> anyhow::Result<PipelineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    from_str(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

pub fn from_str(s: &str) -> anyhow::Result<PipelineConfig> {
    let config: PipelineConfig = toml::from_str(s).context("Failed to parse TOML configuration")?;
    config.validate()?;
    Ok(config)
}

pub fn detector_config(base: &DetectorConfig, args: &DetectArgs) -> Result<DetectorConfig, ConfigError> {
    let mut config = base.clone();
    if let Some(keep) = toggle(args.with_predetect, args.no_predetect) {
        config.with_predetect = keep;
    }
    for rule in &args.add {
        config.added.push(rule.parse::<AddedEntity>()?);
    }
    config.exclude.extend(args.exclude.iter().cloned());
    config.fail_fast |= args.fail_fast;
    if let Some(size) = args.batch_size {
        config.batch_size = size;
    }
    config.validate()?;
    Ok(config)
}

pub fn dedup_policy(base: &DedupPolicy, args: &DedupArgs) -> Result<DedupPolicy, ConfigError> {
    let mut policy = base.clone();
    if let Some(mode) = &args.entity_overlap_mode {
        policy.entity_scope = mode.parse()?;
    }
    if let Some(mode) = &args.overlap {
        policy.overlap = mode.parse()?;
    }
    if let Some(keep) = &args.keep {
        policy.apply_keep(keep)?;
    }
    if let Some(entities) = &args.entity_priority {
        policy.apply_entity_priority(entities)?;
    }
    policy.validate()?;
    Ok(policy)
}

pub fn mask_options(base: &MaskOptions, args: &MaskArgs) -> Result<MaskOptions, ConfigError> {
    let mut options = base.clone();
    options.force |= args.force;
    options.embed_coordinates |= args.embed_coordinates;
    if let Some(method) = &args.method {
        options.method = method.parse()?;
    }
    if let Some(display) = &args.display {
        options.display = display.parse()?;
    }
    options.validate()?;
    Ok(options)
}
