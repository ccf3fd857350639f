//! Command-line surface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pii-sync")]
#[command(
    version,
    about = "Extract position-synchronized text from PDFs, detect and mask PII"
)]
pub struct Cli {
    /// TOML file with [sync], [detect], [dedup] and [mask] sections
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract text and character geometry from a PDF
    Read(ReadArgs),
    /// Run detectors over a read document
    Detect(DetectArgs),
    /// Remove conflicting detections
    DuplicateProcess(DedupArgs),
    /// Write detections into a copy of the PDF as annotations
    Mask(MaskArgs),
}

/// Where a JSON document goes and how it is formatted
#[derive(Args, Debug, Default)]
pub struct OutputArgs {
    /// Write to FILE instead of stdout
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Indent the JSON output
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    pub pdf: PathBuf,

    #[arg(long, overrides_with = "no_highlights")]
    pub with_highlights: bool,
    /// Omit `highlights` from the output
    #[arg(long, overrides_with = "with_highlights")]
    pub no_highlights: bool,

    #[arg(long, overrides_with = "no_map")]
    pub with_map: bool,
    /// Omit both coordinate maps from the output
    #[arg(long, overrides_with = "with_map")]
    pub no_map: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Read document to process (stdin when absent)
    #[arg(long, value_name = "FILE")]
    pub from: Option<PathBuf>,

    /// Keep spans already present in the input
    #[arg(long, overrides_with = "no_predetect")]
    pub with_predetect: bool,
    #[arg(long, overrides_with = "with_predetect")]
    pub no_predetect: bool,

    /// Extra entity rule, `ENTITY:regex` (repeatable)
    #[arg(long, value_name = "ENTITY:REGEX")]
    pub add: Vec<String>,

    /// Drop detections whose word matches this regex (repeatable)
    #[arg(long, value_name = "REGEX")]
    pub exclude: Vec<String>,

    /// Abort on the first detector failure instead of recording it
    #[arg(long)]
    pub fail_fast: bool,

    /// Blocks per detector call
    #[arg(long)]
    pub batch_size: Option<usize>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug)]
pub struct DedupArgs {
    /// Detect document to process (stdin when absent)
    #[arg(long, value_name = "FILE")]
    pub from: Option<PathBuf>,

    /// Whether only spans of the same entity conflict: same | any
    #[arg(long, value_name = "MODE")]
    pub entity_overlap_mode: Option<String>,

    /// Which ranges conflict: exact | contain | any_overlap
    #[arg(long, value_name = "MODE")]
    pub overlap: Option<String>,

    /// Tie-break order, e.g. `manual,added,model,long,first`
    #[arg(long, value_name = "LIST")]
    pub keep: Option<String>,

    /// Entity ranking, highest first, e.g. `PERSON,EMAIL`
    #[arg(long, value_name = "LIST")]
    pub entity_priority: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug)]
pub struct MaskArgs {
    /// The PDF the document was read from
    pub pdf: PathBuf,

    /// Detect document whose spans are masked
    #[arg(long, value_name = "FILE")]
    pub json: PathBuf,

    /// Output PDF; must differ from the source
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,

    /// Proceed even when the PDF hash does not match the document
    #[arg(long)]
    pub force: bool,

    /// Store the coordinate maps inside the output PDF
    #[arg(long)]
    pub embed_coordinates: bool,

    /// highlight | annotation | both
    #[arg(long)]
    pub method: Option<String>,

    /// Annotation text: entity | word | entity_and_word | none
    #[arg(long)]
    pub display: Option<String>,
}

/// Resolve a `--x` / `--no-x` pair; `None` when neither was given
pub fn toggle(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (_, true) => Some(false),
        (true, false) => Some(true),
        (false, false) => None,
    }
}
