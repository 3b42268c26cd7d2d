//! TF-IDF feature extraction.

use crate::storage::CorpusStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Instant;
use tracing::instrument;

use super::matrix::{FeatureMatrix, RowMeta, SparseMatrix, StructuredFields};
use super::stop_words;
use super::tokenizer::{Tokenizer, extract_hashtags, extract_mentions};
use super::vocabulary::FeatureVocabulary;

/// Options for one extraction run.
///
/// # Example
///
/// ```rust
/// use tagsignal::FeatureConfig;
///
/// let config: FeatureConfig = toml::from_str("min_df = 2\nngram_range = [1, 2]").unwrap();
/// assert_eq!(config.min_df, 2);
/// assert_eq!(config.ngram_range, (1, 2));
/// assert!(config.max_vocab_size.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Minimum number of posts a term must appear in.
    pub min_df: usize,
    /// Keep at most this many terms, highest document frequency first.
    pub max_vocab_size: Option<usize>,
    /// Stop words; `None` selects the built-in English list.
    pub stop_words: Option<Vec<String>>,
    /// Inclusive range of n-gram lengths.
    pub ngram_range: (usize, usize),
    /// Scale each row to unit Euclidean length.
    pub l2_normalize: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            min_df: 1,
            max_vocab_size: None,
            stop_words: None,
            ngram_range: (1, 1),
            l2_normalize: false,
        }
    }
}

impl FeatureConfig {
    /// Checks option ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for `min_df` 0, a `max_vocab_size` of
    /// 0, or an n-gram range that is empty or starts at 0.
    pub fn validate(&self) -> Result<()> {
        if self.min_df == 0 {
            return Err(Error::InvalidInput("min_df must be at least 1".to_string()));
        }
        if self.max_vocab_size == Some(0) {
            return Err(Error::InvalidInput(
                "max_vocab_size must be at least 1".to_string(),
            ));
        }
        let (min_n, max_n) = self.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(Error::InvalidInput(format!(
                "invalid ngram_range ({min_n}, {max_n})"
            )));
        }
        Ok(())
    }

    /// Resolved stop word set.
    #[must_use]
    pub fn stop_word_set(&self) -> BTreeSet<String> {
        self.stop_words.as_ref().map_or_else(stop_words::english, |words| {
            words.iter().map(|w| w.to_lowercase()).collect()
        })
    }
}

/// Builds a vocabulary and TF-IDF matrix from a corpus.
///
/// Weights are `tf * idf` with `tf = count / terms in post` and
/// `idf = ln((1 + N) / (1 + df)) + 1`. Rows follow corpus order.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    /// Creates an extractor.
    #[must_use]
    pub const fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Extracts features from every post in `corpus`.
    ///
    /// An empty corpus yields an empty vocabulary and a matrix with no rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the configuration is invalid.
    #[allow(clippy::cast_precision_loss)]
    #[instrument(skip_all, fields(rows = corpus.len()))]
    pub fn extract(&self, corpus: &CorpusStore) -> Result<(FeatureVocabulary, FeatureMatrix)> {
        self.config.validate()?;
        let start = Instant::now();

        if corpus.is_empty() {
            tracing::info!("Corpus is empty, extracted no features");
            return Ok((FeatureVocabulary::default(), FeatureMatrix::empty(0)));
        }

        let tokenizer = Tokenizer::new(self.config.stop_word_set(), self.config.ngram_range);
        let documents: Vec<Vec<String>> = corpus.iter().map(|p| tokenizer.terms(&p.text)).collect();

        let vocabulary = self.build_vocabulary(&documents);
        let mut weights = SparseMatrix::new(vocabulary.len());
        let mut rows = Vec::with_capacity(documents.len());

        for (post, terms) in corpus.iter().zip(&documents) {
            weights.push_row(self.weigh(terms, &vocabulary))?;
            rows.push(RowMeta {
                dedup_key: post.dedup_key.clone(),
                structured: StructuredFields {
                    hashtags: extract_hashtags(&post.text),
                    mentions: extract_mentions(&post.text),
                    like_count: clamp_count(post.like_count),
                    repost_count: clamp_count(post.repost_count),
                    reply_count: clamp_count(post.reply_count),
                    term_count: terms.len(),
                },
            });
        }
        let matrix = FeatureMatrix::new(weights, rows)?;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        metrics::histogram!("tagsignal_extraction_duration_ms").record(duration_ms as f64);
        tracing::info!(
            vocabulary_size = vocabulary.len(),
            rows = matrix.n_rows(),
            nnz = matrix.weights().nnz(),
            duration_ms,
            "Features extracted"
        );
        Ok((vocabulary, matrix))
    }

    fn build_vocabulary(&self, documents: &[Vec<String>]) -> FeatureVocabulary {
        let mut document_frequency: HashMap<&str, usize> = HashMap::new();
        for terms in documents {
            let unique: HashSet<&str> = terms.iter().map(String::as_str).collect();
            for term in unique {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let mut kept: Vec<(&str, usize)> = document_frequency
            .into_iter()
            .filter(|&(_, df)| df >= self.config.min_df)
            .collect();
        if let Some(limit) = self.config.max_vocab_size {
            kept.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            kept.truncate(limit);
        }

        FeatureVocabulary::from_document_frequencies(
            kept.into_iter().map(|(term, df)| (term.to_string(), df)),
            documents.len(),
        )
    }

    #[allow(clippy::cast_precision_loss)]
    fn weigh(&self, terms: &[String], vocabulary: &FeatureVocabulary) -> Vec<(usize, f64)> {
        if terms.is_empty() {
            return Vec::new();
        }
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for term in terms {
            if let Some(column) = vocabulary.index_of(term) {
                *counts.entry(column).or_insert(0) += 1;
            }
        }

        let total = terms.len() as f64;
        let mut row: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(column, count)| {
                let idf = vocabulary.idf(column).unwrap_or(0.0);
                (column, count as f64 / total * idf)
            })
            .collect();

        if self.config.l2_normalize {
            let norm = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                for (_, w) in &mut row {
                    *w /= norm;
                }
            }
        }
        row
    }
}

fn clamp_count(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}
