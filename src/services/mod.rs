//! Business logic services.
//!
//! Services sit between post sources and the corpus store.

pub mod deduplication;
mod ingest;

pub use deduplication::{BatchSummary, DeduplicationService, SubmitOutcome};
pub use ingest::{IngestReport, IngestService, SessionFailure, SessionReport};
