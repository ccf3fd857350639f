//! `pii-sync` command implementations
//!
//! Every command reads its whole input, validates it and only then writes
//! output, so a failing run never leaves a partial document or PDF behind.

pub mod cli;
pub mod config;

use pii_core::{
    configured_detectors, describe_source, detect, duplicate_process, mask, read,
    read_json_sha256, CancelFlag, ConfigError, DocumentAccessError, DocumentAccessProvider,
    PipelineConfig, PipelineError, ReadOptions,
};
use pii_pdf::{LopdfAnnotationWriter, LopdfProvider};
use pii_types::{detect_document_from_value, parse_document_value, SchemaError};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::cli::{toggle, Cli, Command, DedupArgs, DetectArgs, MaskArgs, OutputArgs, ReadArgs};

/// Failure of a whole command
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("{0:#}")]
    ConfigFile(anyhow::Error),
}

impl CliError {
    pub fn kind(&self) -> &'static str {
        match self {
            CliError::Pipeline(e) => e.kind(),
            CliError::ConfigFile(_) => "ConfigError",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Pipeline(e) => e.exit_code(),
            CliError::ConfigFile(_) => 2,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Pipeline(e.into())
    }
}

pub fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => config::from_file(path).map_err(CliError::ConfigFile)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::Read(args) => run_read(&config, args),
        Command::Detect(args) => run_detect(&config, args),
        Command::DuplicateProcess(args) => run_dedup(&config, args),
        Command::Mask(args) => run_mask(&config, args),
    }
}

fn read_pdf(path: &Path) -> Result<Vec<u8>, DocumentAccessError> {
    fs::read(path).map_err(|source| DocumentAccessError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// JSON input from `--from FILE` or stdin
///
/// A missing, unreadable or non-JSON input is invalid input, not an
/// internal failure.
fn read_input(from: Option<&Path>) -> Result<Value, PipelineError> {
    let text = match from {
        Some(path) => fs::read_to_string(path).map_err(|e| {
            SchemaError::new("<document>", format!("cannot read {}: {}", path.display(), e))
        })?,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| SchemaError::new("<document>", format!("cannot read stdin: {}", e)))?;
            text
        }
    };
    Ok(parse_document_value(&text)?)
}

fn write_output<T: Serialize>(doc: &T, output: &OutputArgs) -> Result<(), PipelineError> {
    let mut json = if output.pretty {
        serde_json::to_string_pretty(doc)?
    } else {
        serde_json::to_string(doc)?
    };
    json.push('\n');
    match &output.out {
        Some(path) => fs::write(path, json)?,
        None => io::stdout().lock().write_all(json.as_bytes())?,
    }
    Ok(())
}

fn run_read(config: &PipelineConfig, args: ReadArgs) -> Result<(), CliError> {
    let options = ReadOptions {
        with_highlights: toggle(args.with_highlights, args.no_highlights).unwrap_or(true),
        with_map: toggle(args.with_map, args.no_map).unwrap_or(true),
        sync: config.sync.clone(),
    };

    let bytes = read_pdf(&args.pdf).map_err(PipelineError::from)?;
    let provider = LopdfProvider::load(&bytes).map_err(PipelineError::from)?;
    let source = describe_source(&args.pdf, &bytes, provider.page_count());

    let doc = read(&provider, source, &options, &CancelFlag::new())?;
    write_output(&doc, &args.output)?;
    Ok(())
}

fn run_detect(config: &PipelineConfig, args: DetectArgs) -> Result<(), CliError> {
    let detector_config = config::detector_config(&config.detect, &args)?;
    let detectors = configured_detectors(&detector_config)?;

    let value = read_input(args.from.as_deref())?;
    let hash = read_json_sha256(&value);
    let input = detect_document_from_value(value).map_err(PipelineError::from)?;

    let doc = detect(input, hash, &detector_config, detectors, &CancelFlag::new())?;
    write_output(&doc, &args.output)?;
    Ok(())
}

fn run_dedup(config: &PipelineConfig, args: DedupArgs) -> Result<(), CliError> {
    let policy = config::dedup_policy(&config.dedup, &args)?;

    let value = read_input(args.from.as_deref())?;
    let input = detect_document_from_value(value).map_err(PipelineError::from)?;

    let doc = duplicate_process(input, &policy)?;
    write_output(&doc, &args.output)?;
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn run_mask(config: &PipelineConfig, args: MaskArgs) -> Result<(), CliError> {
    let options = config::mask_options(&config.mask, &args)?;
    if same_file(&args.pdf, &args.out) {
        return Err(ConfigError::Invalid(format!(
            "--out {} would overwrite the source PDF",
            args.out.display()
        ))
        .into());
    }

    let pdf = read_pdf(&args.pdf).map_err(PipelineError::from)?;
    let value = read_input(Some(&args.json))?;
    let doc = detect_document_from_value(value).map_err(PipelineError::from)?;

    let masked = mask(&pdf, &doc, &options, &LopdfAnnotationWriter::new())?;
    fs::write(&args.out, masked).map_err(PipelineError::from)?;
    info!(out = %args.out.display(), "wrote masked PDF");
    Ok(())
}
