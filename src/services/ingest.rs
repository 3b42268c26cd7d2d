//! Scraping session ingestion.
//!
//! A session reads one [`PostSource`] into its own corpus, deduplicated
//! against the shared corpus as it stood when the session started. The
//! finished session corpus is merged into the [`SharedCorpus`]; that merge
//! drops anything an earlier session already stored. Parallel sessions merge
//! in input order once all of them have been read.

use crate::config::TagsignalConfig;
use crate::io::PostSource;
use crate::storage::{CorpusStore, MergeReport, SharedCorpus};
use crate::{Error, Result};
use serde::Serialize;
use std::time::Instant;
use tracing::instrument;

use super::deduplication::{BatchSummary, DeduplicationConfig, DeduplicationService};

/// Result of one merged session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// Caller-supplied name, usually the input file.
    pub label: String,
    /// Query the session's records were tagged with, if overridden.
    pub query: Option<String>,
    /// Deduplication counts within the session.
    pub summary: BatchSummary,
    /// Outcome of merging the session corpus.
    pub merge: MergeReport,
}

/// A session that ended in an error and was not merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFailure {
    /// Session name.
    pub label: String,
    /// Error message.
    pub error: String,
}

/// Result of a multi-session ingest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Merged sessions, in input order.
    pub sessions: Vec<SessionReport>,
    /// Sessions that failed, in input order.
    pub failures: Vec<SessionFailure>,
    /// Shared corpus size after all merges.
    pub corpus_size: usize,
}

impl IngestReport {
    /// Sum of all session summaries.
    #[must_use]
    pub fn total(&self) -> BatchSummary {
        let mut total = BatchSummary::new();
        for session in &self.sessions {
            total.absorb(session.summary.clone());
        }
        total
    }

    /// Sum of all merge reports.
    #[must_use]
    pub fn merged(&self) -> MergeReport {
        let mut merged = MergeReport::default();
        for session in &self.sessions {
            merged.absorb(session.merge);
        }
        merged
    }
}

/// Runs scraping sessions into a shared corpus.
#[derive(Debug, Clone)]
pub struct IngestService {
    dedup: DeduplicationConfig,
    hashtags: Vec<String>,
    min_posts: usize,
}

impl IngestService {
    /// Creates a service with the given dedup rules and no collection target.
    #[must_use]
    pub const fn new(dedup: DeduplicationConfig) -> Self {
        Self {
            dedup,
            hashtags: Vec::new(),
            min_posts: 0,
        }
    }

    /// Creates a service from the application config.
    #[must_use]
    pub fn from_config(config: &TagsignalConfig) -> Self {
        Self {
            dedup: config.dedup,
            hashtags: config.hashtags.clone(),
            min_posts: config.min_posts,
        }
    }

    /// Reads `source` into a new session corpus.
    ///
    /// Records are deduplicated against `seed` and against each other. With
    /// `query` set every record is tagged with it; otherwise each record keeps
    /// its own query field.
    ///
    /// # Errors
    ///
    /// Returns the first non-recoverable source or store error. Malformed
    /// records are counted in the summary instead.
    pub fn collect_session<S: PostSource>(
        &self,
        source: &mut S,
        query: Option<&str>,
        seed: &CorpusStore,
    ) -> Result<(CorpusStore, BatchSummary)> {
        let dedup = DeduplicationService::new(self.dedup).seeded_from(seed);
        Self::drain(dedup, source, query)
    }

    /// Runs one session and merges it into `shared`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session fails; nothing is merged then.
    pub fn ingest_session<S: PostSource>(
        &self,
        shared: &SharedCorpus,
        label: &str,
        mut source: S,
        query: Option<&str>,
    ) -> Result<SessionReport> {
        let start = Instant::now();
        let (session, summary) = self.read_session(shared, label, &mut source, query)?;
        Self::merge_into(shared, label, query, session, summary, start)
    }

    /// Runs sessions on scoped threads, then merges them in input order.
    ///
    /// Every session is deduplicated against the shared corpus as it was on
    /// entry. Sessions are merged only after all threads finish, so a post
    /// present in several inputs is always kept from the earliest one and
    /// the resulting row order does not depend on scheduling. A failed
    /// session is logged and reported; the others still merge.
    ///
    /// # Errors
    ///
    /// Returns an error only if the shared corpus lock is poisoned.
    pub fn ingest_sessions<S>(
        &self,
        shared: &SharedCorpus,
        sessions: Vec<(String, S)>,
        query: Option<&str>,
    ) -> Result<IngestReport>
    where
        S: PostSource + Send,
    {
        let start = Instant::now();
        let collected: Vec<(String, Result<(CorpusStore, BatchSummary)>)> =
            std::thread::scope(|scope| {
                let handles: Vec<_> = sessions
                    .into_iter()
                    .map(|(label, mut source)| {
                        let handle = scope.spawn({
                            let label = label.clone();
                            move || self.read_session(shared, &label, &mut source, query)
                        });
                        (label, handle)
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|(label, handle)| {
                        let result = handle.join().unwrap_or_else(|_| {
                            Err(Error::OperationFailed {
                                operation: "ingest_session".to_string(),
                                cause: "session thread panicked".to_string(),
                            })
                        });
                        (label, result)
                    })
                    .collect()
            });

        let mut report = IngestReport::default();
        for (label, collected) in collected {
            let outcome = collected.and_then(|(session, summary)| {
                Self::merge_into(shared, &label, query, session, summary, start)
            });
            match outcome {
                Ok(session) => report.sessions.push(session),
                Err(e) => {
                    tracing::error!(label = %label, error = %e, "Session failed, not merged");
                    metrics::counter!("tagsignal_sessions_total", "outcome" => "failed")
                        .increment(1);
                    report.failures.push(SessionFailure {
                        label,
                        error: e.to_string(),
                    });
                },
            }
        }

        report.corpus_size = shared.read(CorpusStore::len)?;
        if report.corpus_size < self.min_posts {
            tracing::warn!(
                corpus_size = report.corpus_size,
                target = self.min_posts,
                "Corpus is below the collection target"
            );
        }

        Ok(report)
    }

    #[instrument(skip_all, fields(operation = "ingest_session", label = %label))]
    fn read_session<S: PostSource>(
        &self,
        shared: &SharedCorpus,
        label: &str,
        source: &mut S,
        query: Option<&str>,
    ) -> Result<(CorpusStore, BatchSummary)> {
        if let Some(query) = query {
            self.check_query(query);
        }

        let dedup = self.dedup;
        let seed = shared.read(|corpus| DeduplicationService::new(dedup).seeded_from(corpus))?;
        Self::drain(seed, source, query)
    }

    fn merge_into(
        shared: &SharedCorpus,
        label: &str,
        query: Option<&str>,
        session: CorpusStore,
        summary: BatchSummary,
        start: Instant,
    ) -> Result<SessionReport> {
        let merge = shared.merge_session(session)?;

        tracing::info!(
            label = %label,
            submitted = summary.submitted,
            accepted = summary.accepted,
            rejected_duplicates = summary.rejected_duplicates,
            malformed = summary.malformed,
            merged = merge.added,
            skipped_at_merge = merge.skipped_duplicates,
            duration_ms = start.elapsed().as_millis(),
            "Session merged"
        );
        metrics::counter!("tagsignal_sessions_total", "outcome" => "merged").increment(1);

        Ok(SessionReport {
            label: label.to_string(),
            query: query.map(ToString::to_string),
            summary,
            merge,
        })
    }

    fn drain<S: PostSource>(
        mut dedup: DeduplicationService,
        source: &mut S,
        query: Option<&str>,
    ) -> Result<(CorpusStore, BatchSummary)> {
        let mut session = CorpusStore::new();
        let mut summary = BatchSummary::new();
        loop {
            let result = match source.next() {
                Ok(Some(mut record)) => {
                    if let Some(query) = query {
                        record.source_hashtag_query = query.to_string();
                    }
                    dedup.submit(record, &mut session)
                },
                Ok(None) => break,
                Err(e) => Err(e),
            };
            DeduplicationService::tally(&mut summary, result)?;
        }
        Ok((session, summary))
    }

    fn check_query(&self, query: &str) {
        let tracked = self.hashtags.iter().any(|tag| tag.eq_ignore_ascii_case(query));
        if !self.hashtags.is_empty() && !tracked {
            tracing::warn!(query = %query, tracked = ?self.hashtags, "Query is not a tracked hashtag");
        }
    }
}
