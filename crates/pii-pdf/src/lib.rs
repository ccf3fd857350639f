//! lopdf-backed PDF access for the PII pipeline
//!
//! [`LopdfProvider`] walks page content streams into positioned glyphs and
//! reads existing highlight annotations; [`LopdfAnnotationWriter`] renders
//! masked spans back as highlight or square annotations and can embed the
//! coordinate maps into the output.
//!
//! Text inside form XObjects is not extracted.

pub mod content;
pub mod fonts;
mod objects;
pub mod provider;
pub mod writer;

pub use content::{page_blocks, TextWalker};
pub use fonts::{FontInfo, ToUnicode};
pub use provider::{LopdfProvider, MAPS_CATALOG_KEY, PII_IDS_KEY};
pub use writer::LopdfAnnotationWriter;
