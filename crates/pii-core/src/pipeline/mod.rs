//! The four stages: `read`, `detect`, `duplicate-process`, `mask`
//!
//! Each stage is a transform from one validated document to the next. JSON
//! parsing and schema validation happen at the entry points in
//! [`pii_types::schema`]; the functions here take typed documents.

mod dedup;
mod detect;
mod mask;
mod read;

pub use dedup::duplicate_process;
pub use detect::{configured_detectors, detect};
pub use mask::mask;
pub use read::{read, ReadOptions};
