//! Composite per-term signal across all posts.

use serde::{Deserialize, Serialize};

use super::matrix::FeatureMatrix;

/// z-score of a two-sided 95% interval.
const Z_95: f64 = 1.96;

/// Column-wise mean, population standard deviation and 95% confidence
/// half-width of a feature matrix.
///
/// Implicit zeros count as observations, so the values match a dense
/// computation over the full matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalAggregate {
    /// Number of rows aggregated.
    pub n_rows: usize,
    /// Mean weight per term.
    pub mean: Vec<f64>,
    /// Population standard deviation per term.
    pub std: Vec<f64>,
    /// `1.96 * std / sqrt(n_rows)` per term; zero for an empty matrix.
    pub ci95: Vec<f64>,
}

impl SignalAggregate {
    /// Mean of the per-term standard deviations.
    #[must_use]
    pub fn mean_std(&self) -> f64 {
        average(&self.std)
    }

    /// Mean of the per-term confidence half-widths.
    #[must_use]
    pub fn mean_ci95(&self) -> f64 {
        average(&self.ci95)
    }
}

#[allow(clippy::cast_precision_loss)]
fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl FeatureMatrix {
    /// Aggregates the weights column by column.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn aggregate(&self) -> SignalAggregate {
        let n_cols = self.n_cols();
        let n_rows = self.n_rows();
        let mut sum = vec![0.0; n_cols];
        let mut sum_sq = vec![0.0; n_cols];
        for row in self.weights().rows() {
            for (col, value) in row.iter() {
                sum[col] += value;
                sum_sq[col] += value * value;
            }
        }

        if n_rows == 0 {
            return SignalAggregate {
                n_rows,
                mean: vec![0.0; n_cols],
                std: vec![0.0; n_cols],
                ci95: vec![0.0; n_cols],
            };
        }

        let n = n_rows as f64;
        let mean: Vec<f64> = sum.iter().map(|s| s / n).collect();
        let std: Vec<f64> = sum_sq
            .iter()
            .zip(&mean)
            .map(|(sq, m)| (sq / n - m * m).max(0.0).sqrt())
            .collect();
        let ci95 = std.iter().map(|s| Z_95 * s / n.sqrt()).collect();

        SignalAggregate {
            n_rows,
            mean,
            std,
            ci95,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::matrix::{RowMeta, SparseMatrix, StructuredFields};
    use crate::models::DedupKey;

    fn matrix(rows: &[Vec<(usize, f64)>], n_cols: usize) -> FeatureMatrix {
        let mut weights = SparseMatrix::new(n_cols);
        let mut meta = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            weights.push_row(row.clone()).unwrap();
            meta.push(RowMeta {
                dedup_key: DedupKey::new(i.to_string()),
                structured: StructuredFields::default(),
            });
        }
        FeatureMatrix::new(weights, meta).unwrap()
    }

    #[test]
    fn test_matches_dense_computation() {
        let m = matrix(&[vec![(0, 1.0)], vec![(0, 3.0), (1, 2.0)], vec![], vec![(1, 2.0)]], 2);
        let agg = m.aggregate();

        assert_eq!(agg.n_rows, 4);
        assert!((agg.mean[0] - 1.0).abs() < 1e-12);
        assert!((agg.mean[1] - 1.0).abs() < 1e-12);
        // column 0: [1, 3, 0, 0] has variance 1.5
        assert!((agg.std[0] - 1.5_f64.sqrt()).abs() < 1e-12);
        // column 1: [0, 2, 0, 2] has variance 1
        assert!((agg.std[1] - 1.0).abs() < 1e-12);
        assert!((agg.ci95[1] - 1.96 / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_matrix_is_all_zero() {
        let agg = matrix(&[], 3).aggregate();
        assert_eq!(agg.mean, vec![0.0; 3]);
        assert_eq!(agg.ci95, vec![0.0; 3]);
        assert!(agg.mean_std().abs() < f64::EPSILON);
    }
}
