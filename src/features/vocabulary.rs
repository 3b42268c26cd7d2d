//! Term vocabulary for one extraction run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Document statistics of one vocabulary term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermStats {
    /// The term (a word or space-joined n-gram).
    pub term: String,
    /// Number of posts containing the term.
    pub document_frequency: usize,
    /// Smoothed inverse document frequency, `ln((1 + N) / (1 + df)) + 1`.
    pub idf: f64,
}

/// Sorted mapping of term to column index.
///
/// Indices follow lexicographic term order and are stable only within the
/// run that built the vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVocabulary {
    index: BTreeMap<String, usize>,
    stats: Vec<TermStats>,
}

impl FeatureVocabulary {
    /// Builds a vocabulary from `(term, df)` pairs over `n_documents` posts.
    ///
    /// Terms are sorted before indices are assigned, so input order does not
    /// matter.
    #[must_use]
    pub fn from_document_frequencies(
        terms: impl IntoIterator<Item = (String, usize)>,
        n_documents: usize,
    ) -> Self {
        let sorted: BTreeMap<String, usize> = terms.into_iter().collect();
        let mut index = BTreeMap::new();
        let mut stats = Vec::with_capacity(sorted.len());
        for (column, (term, df)) in sorted.into_iter().enumerate() {
            index.insert(term.clone(), column);
            stats.push(TermStats {
                idf: smooth_idf(n_documents, df),
                term,
                document_frequency: df,
            });
        }
        Self { index, stats }
    }

    /// Number of terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    /// Whether the vocabulary is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Column index of `term`.
    #[must_use]
    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    /// Term at `column`.
    #[must_use]
    pub fn term(&self, column: usize) -> Option<&str> {
        self.stats.get(column).map(|s| s.term.as_str())
    }

    /// Statistics of the term at `column`.
    #[must_use]
    pub fn stats(&self, column: usize) -> Option<&TermStats> {
        self.stats.get(column)
    }

    /// IDF weight of the term at `column`.
    #[must_use]
    pub fn idf(&self, column: usize) -> Option<f64> {
        self.stats.get(column).map(|s| s.idf)
    }

    /// Terms in column order.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.stats.iter().map(|s| s.term.as_str())
    }

    /// Term statistics in column order.
    #[must_use]
    pub fn entries(&self) -> &[TermStats] {
        &self.stats
    }
}

/// `ln((1 + n) / (1 + df)) + 1`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn smooth_idf(n_documents: usize, document_frequency: usize) -> f64 {
    ((1 + n_documents) as f64 / (1 + document_frequency) as f64).ln() + 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_follow_lexicographic_order() {
        let vocab = FeatureVocabulary::from_document_frequencies(
            vec![
                ("sensex".to_string(), 1),
                ("bank nifty".to_string(), 2),
                ("nifty".to_string(), 3),
            ],
            3,
        );
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.terms().collect::<Vec<_>>(), vec!["bank nifty", "nifty", "sensex"]);
        assert_eq!(vocab.index_of("nifty"), Some(1));
        assert_eq!(vocab.term(2), Some("sensex"));
        assert_eq!(vocab.stats(0).unwrap().document_frequency, 2);
        assert!(vocab.index_of("rally").is_none());
    }

    #[test]
    fn test_smooth_idf_values() {
        assert!((smooth_idf(3, 1) - (2.0_f64.ln() + 1.0)).abs() < 1e-12);
        assert!((smooth_idf(3, 3) - 1.0).abs() < 1e-12);
        assert!(smooth_idf(10, 1) > smooth_idf(10, 10));
    }

    #[test]
    fn test_empty() {
        let vocab = FeatureVocabulary::from_document_frequencies(Vec::new(), 0);
        assert!(vocab.is_empty());
        assert!(vocab.idf(0).is_none());
    }
}
