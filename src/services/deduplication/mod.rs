//! Deduplication of raw post records.
//!
//! Two posts are duplicates when their normalized text and normalized author
//! hash to the same dedup key. Normalization collapses case, links, emoji and
//! a trailing run of hashtags or mentions, so a repost whose tag list was
//! truncated still matches the original.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  DeduplicationService                    │
//! │  ┌───────────────┐   ┌──────────────────────────────┐    │
//! │  │ ContentHasher │   │ Seen sets                    │    │
//! │  │               │   │                              │    │
//! │  │ normalize     │──►│ corpus keys  (InCorpus)      │    │
//! │  │ fingerprint   │   │ batch keys   (InBatch)       │    │
//! │  │ dedup_key     │   │ post ids     (SeenPostId)    │    │
//! │  └───────────────┘   └──────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The checks short-circuit on the first match.

mod config;
mod hasher;
mod service;
mod types;

pub use config::{DeduplicationConfig, NormalizationConfig};
pub use hasher::ContentHasher;
pub use service::DeduplicationService;
pub use types::{BatchSummary, DuplicateReason, SubmitOutcome};
