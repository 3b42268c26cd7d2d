//! Deduplication result types.

use crate::models::DedupKey;
use serde::{Deserialize, Serialize};

/// Outcome of submitting one raw record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The record became a canonical post in the corpus.
    Accepted {
        /// Key of the new post.
        dedup_key: DedupKey,
    },
    /// The record duplicates something already seen; nothing was stored.
    RejectedDuplicate {
        /// Key computed for the record.
        dedup_key: DedupKey,
        /// Why it counts as a duplicate.
        reason: DuplicateReason,
    },
}

impl SubmitOutcome {
    /// Returns true if the record was accepted.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Returns the dedup key computed for the record.
    #[must_use]
    pub const fn dedup_key(&self) -> &DedupKey {
        match self {
            Self::Accepted { dedup_key } | Self::RejectedDuplicate { dedup_key, .. } => dedup_key,
        }
    }
}

/// The reason a record was rejected as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateReason {
    /// The dedup key is already in the corpus.
    InCorpus,
    /// The dedup key was accepted earlier in this batch.
    InBatch,
    /// The platform post id was already seen.
    SeenPostId,
}

impl DuplicateReason {
    /// Returns the reason as a metrics/log label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InCorpus => "in_corpus",
            Self::InBatch => "in_batch",
            Self::SeenPostId => "seen_post_id",
        }
    }
}

impl std::fmt::Display for DuplicateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated result of a batch submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Records seen.
    pub submitted: usize,
    /// Records stored as canonical posts.
    pub accepted: usize,
    /// Records rejected as duplicates.
    pub rejected_duplicates: usize,
    /// Records skipped as malformed.
    pub malformed: usize,
    /// One line per malformed record, in submission order.
    pub issues: Vec<String>,
}

impl BatchSummary {
    /// Creates an empty summary.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            submitted: 0,
            accepted: 0,
            rejected_duplicates: 0,
            malformed: 0,
            issues: Vec::new(),
        }
    }

    /// Adds another summary's counts to this one.
    pub fn absorb(&mut self, other: Self) {
        self.submitted += other.submitted;
        self.accepted += other.accepted;
        self.rejected_duplicates += other.rejected_duplicates;
        self.malformed += other.malformed;
        self.issues.extend(other.issues);
    }

    /// Returns whether any records were skipped as malformed.
    #[must_use]
    pub const fn has_issues(&self) -> bool {
        self.malformed > 0
    }
}
