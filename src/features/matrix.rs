//! Sparse feature matrix.

use crate::models::DedupKey;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Compressed sparse row matrix of `f64` weights.
///
/// Column indices within a row are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseMatrix {
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// Creates a matrix with no rows.
    #[must_use]
    pub fn new(n_cols: usize) -> Self {
        Self {
            n_cols,
            indptr: vec![0],
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Appends a row from `(column, value)` entries.
    ///
    /// Entries are sorted by column; zero values are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if a column is out of range or repeated.
    pub fn push_row(&mut self, mut entries: Vec<(usize, f64)>) -> Result<()> {
        entries.sort_unstable_by_key(|&(col, _)| col);
        if entries.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(Error::InvalidInput("repeated column in sparse row".to_string()));
        }
        if let Some(&(col, _)) = entries.last().filter(|(col, _)| *col >= self.n_cols) {
            return Err(Error::InvalidInput(format!(
                "column {col} out of range for {} columns",
                self.n_cols
            )));
        }
        for (col, value) in entries {
            if value != 0.0 {
                self.indices.push(col);
                self.values.push(value);
            }
        }
        self.indptr.push(self.indices.len());
        Ok(())
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.indptr.len() - 1
    }

    /// Number of columns.
    #[must_use]
    pub const fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Number of stored (non-zero) values.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Row `row`, if it exists.
    #[must_use]
    pub fn row(&self, row: usize) -> Option<SparseRow<'_>> {
        let start = *self.indptr.get(row)?;
        let end = *self.indptr.get(row + 1)?;
        Some(SparseRow {
            indices: &self.indices[start..end],
            values: &self.values[start..end],
        })
    }

    /// Rows in order.
    pub fn rows(&self) -> impl Iterator<Item = SparseRow<'_>> {
        self.indptr.windows(2).map(|w| SparseRow {
            indices: &self.indices[w[0]..w[1]],
            values: &self.values[w[0]..w[1]],
        })
    }

    /// Value at `(row, col)`; zero when not stored.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.row(row).map_or(0.0, |r| r.get(col))
    }
}

/// Borrowed view of one matrix row.
#[derive(Debug, Clone, Copy)]
pub struct SparseRow<'a> {
    indices: &'a [usize],
    values: &'a [f64],
}

impl<'a> SparseRow<'a> {
    /// Stored `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + 'a {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Column indices of stored values.
    #[must_use]
    pub const fn indices(&self) -> &'a [usize] {
        self.indices
    }

    /// Stored values.
    #[must_use]
    pub const fn values(&self) -> &'a [f64] {
        self.values
    }

    /// Value at `col`; zero when not stored.
    #[must_use]
    pub fn get(&self, col: usize) -> f64 {
        self.indices
            .binary_search(&col)
            .map_or(0.0, |pos| self.values[pos])
    }

    /// Number of stored values.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the row stores nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Sum of stored values.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }
}

/// Fields parsed from a post alongside its term weights.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredFields {
    /// Hashtags found in the text, in order, without `#`.
    pub hashtags: Vec<String>,
    /// Mentions found in the text, in order, without `@`.
    pub mentions: Vec<String>,
    /// Likes, clamped to zero.
    pub like_count: u64,
    /// Reposts, clamped to zero.
    pub repost_count: u64,
    /// Replies, clamped to zero.
    pub reply_count: u64,
    /// Terms in the post before vocabulary restriction.
    pub term_count: usize,
}

/// Per-row metadata of a feature matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowMeta {
    /// Key of the post this row was built from.
    pub dedup_key: DedupKey,
    /// Structured fields of the post.
    pub structured: StructuredFields,
}

/// TF-IDF weights plus structured fields, one row per corpus post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    weights: SparseMatrix,
    rows: Vec<RowMeta>,
}

impl FeatureMatrix {
    /// Pairs a weight matrix with its row metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the row counts differ.
    pub fn new(weights: SparseMatrix, rows: Vec<RowMeta>) -> Result<Self> {
        if weights.n_rows() != rows.len() {
            return Err(Error::InvalidInput(format!(
                "matrix has {} rows but {} row records",
                weights.n_rows(),
                rows.len()
            )));
        }
        Ok(Self { weights, rows })
    }

    /// A matrix with no rows over `n_cols` terms.
    #[must_use]
    pub fn empty(n_cols: usize) -> Self {
        Self {
            weights: SparseMatrix::new(n_cols),
            rows: Vec::new(),
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of term columns.
    #[must_use]
    pub const fn n_cols(&self) -> usize {
        self.weights.n_cols()
    }

    /// The sparse weights.
    #[must_use]
    pub const fn weights(&self) -> &SparseMatrix {
        &self.weights
    }

    /// Row metadata in row order.
    #[must_use]
    pub fn rows(&self) -> &[RowMeta] {
        &self.rows
    }

    /// Metadata of one row.
    #[must_use]
    pub fn row_meta(&self, row: usize) -> Option<&RowMeta> {
        self.rows.get(row)
    }

    /// Dense copy of `rows`, refusing slices larger than `max_cells`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the range is out of bounds or the
    /// slice would hold more than `max_cells` values.
    pub fn dense_slice(&self, rows: Range<usize>, max_cells: usize) -> Result<Vec<Vec<f64>>> {
        if rows.start > rows.end || rows.end > self.n_rows() {
            return Err(Error::InvalidInput(format!(
                "row range {}..{} out of bounds for {} rows",
                rows.start,
                rows.end,
                self.n_rows()
            )));
        }
        let cells = rows.len().saturating_mul(self.n_cols());
        if cells > max_cells {
            return Err(Error::InvalidInput(format!(
                "dense slice of {cells} cells exceeds limit of {max_cells}"
            )));
        }

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut dense = vec![0.0; self.n_cols()];
            if let Some(sparse) = self.weights.row(row) {
                for (col, value) in sparse.iter() {
                    dense[col] = value;
                }
            }
            out.push(dense);
        }
        Ok(out)
    }

    /// Mean weight of every row, zeros included.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn row_means(&self) -> Vec<f64> {
        let n_cols = self.n_cols();
        self.weights
            .rows()
            .map(|row| if n_cols == 0 { 0.0 } else { row.sum() / n_cols as f64 })
            .collect()
    }

    /// Row means of at most `sample_size` rows picked at an even stride.
    ///
    /// Returns `(row, mean)` pairs in row order. The sample is deterministic,
    /// so repeated plots of one matrix match.
    #[must_use]
    pub fn sampled_row_means(&self, sample_size: usize) -> Vec<(usize, f64)> {
        let means = self.row_means();
        let n = means.len();
        if n <= sample_size {
            return means.into_iter().enumerate().collect();
        }
        (0..sample_size)
            .map(|i| {
                let row = i * n / sample_size;
                (row, means[row])
            })
            .collect()
    }
}
