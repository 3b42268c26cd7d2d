//! # Tagsignal
//!
//! Hashtag post ingestion and text-to-signal conversion.
//!
//! Tagsignal takes raw posts collected for a fixed set of market hashtags,
//! collapses exact and near-duplicate posts, keeps the surviving set in a
//! versioned Parquet corpus and turns post text into sparse TF-IDF feature
//! vectors for downstream models and plots.
//!
//! ## Pipeline
//!
//! ```text
//! scraper output ─► PostSource ─► DeduplicationService ─► CorpusStore
//!                                                            │
//!                      SignalExporter ◄─ FeatureExtractor ◄──┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use tagsignal::{CorpusStore, DeduplicationService, FeatureConfig, FeatureExtractor};
//!
//! let mut corpus = CorpusStore::new();
//! let mut dedup = DeduplicationService::default();
//! let summary = dedup.submit_batch(records, &mut corpus)?;
//!
//! let (vocabulary, matrix) = FeatureExtractor::new(FeatureConfig::default()).extract(&corpus)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Patterns passed here are literals, so compilation cannot fail.
macro_rules! lazy_regex {
    ($pattern:expr) => {
        std::sync::LazyLock::new(|| regex::Regex::new($pattern).unwrap_or_else(|_| unreachable!()))
    };
}

pub mod config;
pub mod features;
pub mod io;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::TagsignalConfig;
pub use features::{FeatureConfig, FeatureExtractor, FeatureMatrix, FeatureVocabulary};
pub use io::{ExportMetadata, ExportedSignals, PostSource, SignalExporter};
pub use models::{CanonicalPost, DedupKey, Fingerprint, RawPostRecord};
pub use services::{BatchSummary, DeduplicationService, IngestService, SubmitOutcome};
pub use storage::{CorpusStore, SharedCorpus};

/// Error type for tagsignal operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `MalformedRecord` | A raw post lacks text or author; recovered per record |
/// | `DuplicateKey` | A post is appended to a corpus that already holds its key |
/// | `SchemaMismatch` | A persisted corpus does not match a known schema version |
/// | `InvalidInput` | Bad configuration or command-line values |
/// | `OperationFailed` | I/O, Parquet, JSON or CSV failures |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A raw post record is missing a required field.
    ///
    /// Batch ingestion counts and logs these, then moves on to the next record.
    #[error("malformed record: {field} {reason}")]
    MalformedRecord {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A corpus append found the dedup key already present.
    ///
    /// The deduplicator filters duplicates before they reach the store, so
    /// this signals a broken invariant and is always surfaced.
    #[error("duplicate dedup key in corpus: {key}")]
    DuplicateKey {
        /// The dedup key that collided.
        key: String,
    },

    /// Persisted data does not conform to a supported schema version.
    #[error("schema mismatch in {path}: {reason}")]
    SchemaMismatch {
        /// Path of the file being loaded.
        path: String,
        /// Which check failed.
        reason: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds an [`Error::OperationFailed`] from any displayable cause.
    pub(crate) fn op(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for tagsignal operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
#[must_use]
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
