//! Property-based tests for deduplication, merging and extraction.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Normalization is idempotent
//! - Resubmitting a batch adds nothing
//! - Merge size is `|A| + |B| - |A ∩ B|`
//! - Persist/load keeps rows and order
//! - Extraction is deterministic and rows are non-negative

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use std::collections::HashSet;
use tagsignal::services::deduplication::{ContentHasher, NormalizationConfig};
use tagsignal::{CorpusStore, DeduplicationService, FeatureConfig, FeatureExtractor, RawPostRecord};

fn text_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::sample::select(vec![
            "nifty", "Sensex", "rally", "crash", "bank", "#nifty50", "#intraday", "@desk",
            "https://t.co/ab", "today!", "🚀", "the", "breakout",
        ]),
        1..8,
    )
    .prop_map(|words| words.join(" "))
}

fn records_strategy() -> impl Strategy<Value = Vec<RawPostRecord>> {
    prop::collection::vec(
        (prop::sample::select(vec!["desk", "Desk", "@ops", "trader"]), text_strategy()),
        0..20,
    )
    .prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(author, text)| RawPostRecord::new(author, text))
            .collect()
    })
}

fn build(records: Vec<RawPostRecord>) -> CorpusStore {
    let mut corpus = CorpusStore::new();
    DeduplicationService::default()
        .submit_batch(records, &mut corpus)
        .unwrap();
    corpus
}

proptest! {
    /// Property: normalizing twice equals normalizing once.
    #[test]
    fn prop_normalize_idempotent(text in text_strategy()) {
        let hasher = ContentHasher::new(NormalizationConfig::default());
        let once = hasher.normalize(&text);
        prop_assert_eq!(hasher.normalize(&once), once);
    }

    /// Property: a corpus never holds two posts with one dedup key, and
    /// submitting the same records again accepts nothing.
    #[test]
    fn prop_resubmit_accepts_nothing(records in records_strategy()) {
        let mut corpus = build(records.clone());
        let keys: HashSet<_> = corpus.keys().cloned().collect();
        prop_assert_eq!(keys.len(), corpus.len());

        let summary = DeduplicationService::default()
            .seeded_from(&corpus)
            .submit_batch(records.clone(), &mut corpus)
            .unwrap();
        prop_assert_eq!(summary.accepted, 0);
        prop_assert_eq!(summary.rejected_duplicates, records.len());
    }

    /// Property: merge size is `|A| + |B| - |A ∩ B|` and keeps A's order.
    #[test]
    fn prop_merge_size(a in records_strategy(), b in records_strategy()) {
        let a = build(a);
        let b = build(b);
        let a_keys: HashSet<_> = a.keys().cloned().collect();
        let overlap = b.keys().filter(|k| a_keys.contains(*k)).count();
        let expected = a.len() + b.len() - overlap;
        let a_order: Vec<_> = a.keys().cloned().collect();

        let mut merged = a;
        let report = merged.merge(b);
        prop_assert_eq!(merged.len(), expected);
        prop_assert_eq!(report.skipped_duplicates, overlap);
        let prefix: Vec<_> = merged.keys().take(a_order.len()).cloned().collect();
        prop_assert_eq!(prefix, a_order);
    }

    /// Property: extraction is deterministic with non-negative weights.
    #[test]
    fn prop_extraction_deterministic(records in records_strategy(), l2 in any::<bool>()) {
        let corpus = build(records);
        let config = FeatureConfig { l2_normalize: l2, ngram_range: (1, 2), ..FeatureConfig::default() };
        let extractor = FeatureExtractor::new(config);
        let first = extractor.extract(&corpus).unwrap();
        let second = extractor.extract(&corpus).unwrap();

        prop_assert_eq!(first.0.entries(), second.0.entries());
        prop_assert_eq!(&first.1, &second.1);
        prop_assert_eq!(first.1.n_rows(), corpus.len());
        prop_assert!(first.1.weights().rows().all(|row| row.values().iter().all(|v| *v > 0.0)));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: persist then load keeps every row in order.
    #[test]
    fn prop_persist_round_trip(records in records_strategy()) {
        let corpus = build(records);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tweets.parquet");
        corpus.persist(&path).unwrap();
        let loaded = CorpusStore::load(&path).unwrap();
        prop_assert_eq!(loaded.posts(), corpus.posts());
    }
}
