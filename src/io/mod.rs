//! Pipeline inputs and outputs.
//!
//! - [`PostSource`]: raw records coming in from the scraper
//! - [`SignalExporter`]: feature matrices going out to models and plots

pub mod export;
mod source;

pub use export::{ExportMetadata, ExportedSignals, SignalExporter, SignalManifest, SignalRow};
pub use source::{JsonPostSource, PostSource, VecPostSource};
