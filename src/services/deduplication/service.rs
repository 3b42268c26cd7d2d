//! Deduplication service.
//!
//! Turns raw records into canonical posts and decides which of them enter
//! the corpus. Checks run in order: corpus key → batch key → post id.

use crate::models::{CanonicalPost, DedupKey, RawPostRecord};
use crate::storage::CorpusStore;
use crate::{Error, Result, current_timestamp};
use chrono::SubsecRound;
use std::collections::HashSet;
use tracing::instrument;

use super::config::DeduplicationConfig;
use super::hasher::ContentHasher;
use super::types::{BatchSummary, DuplicateReason, SubmitOutcome};

/// Service for deduplicating raw post records.
///
/// Holds the keys accepted during the current batch, plus keys of a shared
/// corpus it was seeded with, so that a session writing into its own
/// session corpus still rejects posts the shared corpus already has.
///
/// # Example
///
/// ```rust
/// use tagsignal::{CorpusStore, DeduplicationService, RawPostRecord};
///
/// let mut corpus = CorpusStore::new();
/// let mut dedup = DeduplicationService::default();
///
/// let first = dedup.submit(RawPostRecord::new("desk", "Sensex up 1% #sensex"), &mut corpus)?;
/// let second = dedup.submit(RawPostRecord::new("desk", "Sensex up 1%"), &mut corpus)?;
///
/// assert!(first.is_accepted());
/// assert!(!second.is_accepted());
/// assert_eq!(corpus.len(), 1);
/// # Ok::<(), tagsignal::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct DeduplicationService {
    config: DeduplicationConfig,
    hasher: ContentHasher,
    /// Keys of a corpus this batch will later be merged into.
    known_keys: HashSet<DedupKey>,
    /// Post ids of that corpus.
    known_post_ids: HashSet<String>,
    /// Keys accepted in the current batch.
    batch_keys: HashSet<DedupKey>,
    /// Post ids accepted in the current batch.
    batch_post_ids: HashSet<String>,
}

impl DeduplicationService {
    /// Creates a new deduplication service.
    #[must_use]
    pub fn new(config: DeduplicationConfig) -> Self {
        Self {
            config,
            hasher: ContentHasher::new(config.normalization),
            ..Self::default()
        }
    }

    /// Seeds the service with the keys and post ids of another corpus.
    ///
    /// Records matching them are rejected as [`DuplicateReason::InCorpus`].
    #[must_use]
    pub fn seeded_from(mut self, corpus: &CorpusStore) -> Self {
        self.known_keys.extend(corpus.keys().cloned());
        self.known_post_ids
            .extend(corpus.iter().filter_map(|p| p.post_id.clone()));
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &DeduplicationConfig {
        &self.config
    }

    /// Returns the content hasher.
    #[must_use]
    pub const fn hasher(&self) -> &ContentHasher {
        &self.hasher
    }

    /// Forgets the keys accepted in the current batch.
    pub fn reset_batch(&mut self) {
        self.batch_keys.clear();
        self.batch_post_ids.clear();
    }

    /// Validates a raw record and derives its canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRecord`] if text or author is missing or blank.
    pub fn canonicalize(&self, record: RawPostRecord) -> Result<CanonicalPost> {
        let text = required(record.text, "text")?;
        let author_handle = required(record.author_handle, "author_handle")?;

        let content_fingerprint = self.hasher.fingerprint(&text);
        let dedup_key = ContentHasher::dedup_key(&content_fingerprint, &author_handle);

        Ok(CanonicalPost {
            dedup_key,
            content_fingerprint,
            post_id: record.post_id,
            author_handle,
            // Corpus files keep microsecond precision.
            timestamp: record.timestamp.map(|t| t.trunc_subsecs(6)),
            text,
            hashtags: record.hashtags,
            mentions: record.mentions,
            like_count: record.like_count,
            repost_count: record.repost_count,
            reply_count: record.reply_count,
            source_hashtag_query: record.source_hashtag_query,
            ingested_at: current_timestamp(),
        })
    }

    /// Submits one record.
    ///
    /// Accepted records are appended to `corpus`; duplicates leave it
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRecord`] for incomplete records and
    /// [`Error::DuplicateKey`] if the corpus append fails its own key check.
    #[instrument(skip_all, fields(operation = "dedup_submit"))]
    pub fn submit(
        &mut self,
        record: RawPostRecord,
        corpus: &mut CorpusStore,
    ) -> Result<SubmitOutcome> {
        let post = self.canonicalize(record)?;

        if let Some(reason) = self.duplicate_reason(&post, corpus) {
            tracing::debug!(dedup_key = %post.dedup_key, reason = %reason, "Duplicate rejected");
            metrics::counter!(
                "tagsignal_posts_total",
                "outcome" => "duplicate",
                "reason" => reason.as_str()
            )
            .increment(1);
            return Ok(SubmitOutcome::RejectedDuplicate {
                dedup_key: post.dedup_key,
                reason,
            });
        }

        let dedup_key = post.dedup_key.clone();
        let post_id = post.post_id.clone();
        corpus.append(post)?;

        self.batch_keys.insert(dedup_key.clone());
        if let Some(id) = post_id {
            self.batch_post_ids.insert(id);
        }
        metrics::counter!("tagsignal_posts_total", "outcome" => "accepted").increment(1);

        Ok(SubmitOutcome::Accepted { dedup_key })
    }

    /// Submits a batch of records.
    ///
    /// Malformed records are counted, logged and skipped; the rest of the
    /// batch continues.
    ///
    /// # Errors
    ///
    /// Returns the first store-level error, which aborts the batch.
    pub fn submit_batch<I>(&mut self, records: I, corpus: &mut CorpusStore) -> Result<BatchSummary>
    where
        I: IntoIterator<Item = RawPostRecord>,
    {
        let mut summary = BatchSummary::new();
        for record in records {
            let result = self.submit(record, corpus);
            Self::tally(&mut summary, result)?;
        }

        tracing::info!(
            submitted = summary.submitted,
            accepted = summary.accepted,
            rejected_duplicates = summary.rejected_duplicates,
            malformed = summary.malformed,
            "Batch deduplicated"
        );
        Ok(summary)
    }

    /// Folds one submission result into `summary`.
    ///
    /// # Errors
    ///
    /// Passes through every error except [`Error::MalformedRecord`].
    pub fn tally(summary: &mut BatchSummary, result: Result<SubmitOutcome>) -> Result<()> {
        summary.submitted += 1;
        match result {
            Ok(SubmitOutcome::Accepted { .. }) => summary.accepted += 1,
            Ok(SubmitOutcome::RejectedDuplicate { .. }) => summary.rejected_duplicates += 1,
            Err(err @ Error::MalformedRecord { .. }) => {
                tracing::warn!(record = summary.submitted, error = %err, "Skipping malformed record");
                metrics::counter!("tagsignal_posts_total", "outcome" => "malformed").increment(1);
                summary.malformed += 1;
                summary
                    .issues
                    .push(format!("record {}: {err}", summary.submitted));
            },
            Err(err) => return Err(err),
        }
        Ok(())
    }

    fn duplicate_reason(&self, post: &CanonicalPost, corpus: &CorpusStore) -> Option<DuplicateReason> {
        if corpus.contains(&post.dedup_key) || self.known_keys.contains(&post.dedup_key) {
            return Some(DuplicateReason::InCorpus);
        }
        if self.batch_keys.contains(&post.dedup_key) {
            return Some(DuplicateReason::InBatch);
        }
        if !self.config.reject_seen_post_ids {
            return None;
        }
        post.post_id
            .as_deref()
            .filter(|id| {
                corpus.contains_post_id(id)
                    || self.known_post_ids.contains(*id)
                    || self.batch_post_ids.contains(*id)
            })
            .map(|_| DuplicateReason::SeenPostId)
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => Err(Error::MalformedRecord {
            field,
            reason: "is blank".to_string(),
        }),
        None => Err(Error::MalformedRecord {
            field,
            reason: "is missing".to_string(),
        }),
    }
}
