//! Signal export for downstream consumers.
//!
//! An export directory holds:
//!
//! | File | Content |
//! |------|---------|
//! | `manifest.json` | snapshot id, schema version, feature config, counts |
//! | `vocabulary.json` | terms in column order with df and idf |
//! | `features.parquet` | non-zero weights as `row`, `col`, `value` triplets |
//! | `posts.csv` | one line per row: key, structured fields, row summary |
//! | `aggregate.json` | per-term mean, std and 95% interval half-width |

use crate::features::{
    FeatureConfig, FeatureMatrix, FeatureVocabulary, SignalAggregate, SparseRow, StructuredFields,
};
use crate::models::DedupKey;
use crate::storage::{CorpusStore, SCHEMA_VERSION, StagedFile};
use crate::{Error, Result, current_timestamp};
use arrow::array::{ArrayRef, Float64Array, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Name of the manifest file in an export directory.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Name of the vocabulary file.
pub const VOCABULARY_FILE: &str = "vocabulary.json";
/// Name of the sparse weights file.
pub const FEATURES_FILE: &str = "features.parquet";
/// Name of the per-post table.
pub const POSTS_FILE: &str = "posts.csv";
/// Name of the aggregate file.
pub const AGGREGATE_FILE: &str = "aggregate.json";

/// Provenance of an extraction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// Snapshot id of the corpus the features were built from.
    pub snapshot_id: String,
    /// Corpus schema version.
    pub schema_version: u32,
    /// Options used for extraction.
    pub feature_config: FeatureConfig,
    /// Unix seconds when the export was assembled.
    pub created_at: i64,
}

impl ExportMetadata {
    /// Metadata for features extracted from `corpus` with `config`.
    #[must_use]
    pub fn for_corpus(corpus: &CorpusStore, config: &FeatureConfig) -> Self {
        Self {
            snapshot_id: corpus.snapshot_id(),
            schema_version: SCHEMA_VERSION,
            feature_config: config.clone(),
            created_at: current_timestamp(),
        }
    }
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalManifest {
    /// Provenance.
    #[serde(flatten)]
    pub metadata: ExportMetadata,
    /// Number of rows (posts).
    pub n_rows: usize,
    /// Number of terms (columns).
    pub n_terms: usize,
    /// Number of non-zero weights.
    pub nnz: usize,
    /// Mean per-term standard deviation.
    pub mean_std: f64,
    /// Mean per-term 95% interval half-width.
    pub mean_ci95: f64,
    /// Files written next to the manifest.
    pub files: Vec<String>,
}

/// One row of an export.
#[derive(Debug, Clone, Copy)]
pub struct SignalRow<'a> {
    /// Key of the source post.
    pub dedup_key: &'a DedupKey,
    /// Hashtags, mentions and engagement counts.
    pub structured: &'a StructuredFields,
    /// Term weights.
    pub weights: SparseRow<'a>,
}

/// Read-only view of a vocabulary, its matrix and their provenance.
#[derive(Debug, Clone)]
pub struct ExportedSignals<'a> {
    vocabulary: &'a FeatureVocabulary,
    matrix: &'a FeatureMatrix,
    metadata: ExportMetadata,
}

/// Assembles [`ExportedSignals`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalExporter;

impl SignalExporter {
    /// Combines a vocabulary and matrix into an export view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the matrix width does not match the
    /// vocabulary.
    pub fn export<'a>(
        vocabulary: &'a FeatureVocabulary,
        matrix: &'a FeatureMatrix,
        metadata: ExportMetadata,
    ) -> Result<ExportedSignals<'a>> {
        if matrix.n_cols() != vocabulary.len() {
            return Err(Error::InvalidInput(format!(
                "matrix has {} columns but vocabulary has {} terms",
                matrix.n_cols(),
                vocabulary.len()
            )));
        }
        Ok(ExportedSignals {
            vocabulary,
            matrix,
            metadata,
        })
    }
}

#[derive(Serialize)]
struct VocabularyEntry<'a> {
    index: usize,
    term: &'a str,
    document_frequency: usize,
    idf: f64,
}

#[derive(Serialize)]
struct PostLine<'a> {
    row: usize,
    dedup_key: &'a str,
    hashtags: String,
    mentions: String,
    like_count: u64,
    repost_count: u64,
    reply_count: u64,
    term_count: usize,
    nnz: usize,
    mean_weight: f64,
}

impl<'a> ExportedSignals<'a> {
    /// The vocabulary.
    #[must_use]
    pub const fn vocabulary(&self) -> &'a FeatureVocabulary {
        self.vocabulary
    }

    /// The feature matrix.
    #[must_use]
    pub const fn matrix(&self) -> &'a FeatureMatrix {
        self.matrix
    }

    /// Provenance.
    #[must_use]
    pub const fn metadata(&self) -> &ExportMetadata {
        &self.metadata
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.matrix.n_rows()
    }

    /// Number of terms.
    #[must_use]
    pub fn n_terms(&self) -> usize {
        self.vocabulary.len()
    }

    /// Row `row`, if it exists.
    #[must_use]
    pub fn row(&self, row: usize) -> Option<SignalRow<'a>> {
        let meta = self.matrix.row_meta(row)?;
        let weights = self.matrix.weights().row(row)?;
        Some(SignalRow {
            dedup_key: &meta.dedup_key,
            structured: &meta.structured,
            weights,
        })
    }

    /// Rows in order.
    pub fn rows(&self) -> impl Iterator<Item = SignalRow<'a>> + '_ {
        (0..self.n_rows()).filter_map(|row| self.row(row))
    }

    /// Per-term aggregate of the matrix.
    #[must_use]
    pub fn aggregate(&self) -> SignalAggregate {
        self.matrix.aggregate()
    }

    /// Builds the manifest for this export.
    #[must_use]
    pub fn manifest(&self) -> SignalManifest {
        let aggregate = self.aggregate();
        SignalManifest {
            metadata: self.metadata.clone(),
            n_rows: self.n_rows(),
            n_terms: self.n_terms(),
            nnz: self.matrix.weights().nnz(),
            mean_std: aggregate.mean_std(),
            mean_ci95: aggregate.mean_ci95(),
            files: [VOCABULARY_FILE, FEATURES_FILE, POSTS_FILE, AGGREGATE_FILE]
                .iter()
                .map(|f| (*f).to_string())
                .collect(),
        }
    }

    /// Writes every export file into `dir`.
    ///
    /// Each file is staged and renamed into place; the manifest goes last so
    /// its presence marks a complete export.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be written.
    #[instrument(skip_all, fields(dir = %dir.display(), rows = self.n_rows()))]
    pub fn write_to_dir(&self, dir: &Path) -> Result<SignalManifest> {
        let entries: Vec<VocabularyEntry<'_>> = self
            .vocabulary
            .entries()
            .iter()
            .enumerate()
            .map(|(index, stats)| VocabularyEntry {
                index,
                term: &stats.term,
                document_frequency: stats.document_frequency,
                idf: stats.idf,
            })
            .collect();
        write_json(&dir.join(VOCABULARY_FILE), &entries)?;
        self.write_features(&dir.join(FEATURES_FILE))?;
        self.write_posts(&dir.join(POSTS_FILE))?;
        write_json(&dir.join(AGGREGATE_FILE), &self.aggregate())?;

        let manifest = self.manifest();
        write_json(&dir.join(MANIFEST_FILE), &manifest)?;

        tracing::info!(
            n_terms = manifest.n_terms,
            nnz = manifest.nnz,
            snapshot_id = %manifest.metadata.snapshot_id,
            "Signals exported"
        );
        Ok(manifest)
    }

    fn write_features(&self, path: &Path) -> Result<()> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("row", DataType::UInt64, false),
            Field::new("col", DataType::UInt64, false),
            Field::new("value", DataType::Float64, false),
        ]));

        let mut rows = Vec::with_capacity(self.matrix.weights().nnz());
        let mut cols = Vec::with_capacity(rows.capacity());
        let mut values = Vec::with_capacity(rows.capacity());
        for (row, weights) in self.matrix.weights().rows().enumerate() {
            for (col, value) in weights.iter() {
                rows.push(row as u64);
                cols.push(col as u64);
                values.push(value);
            }
        }

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .set_key_value_metadata(Some(vec![
                KeyValue::new("tagsignal.snapshot_id".to_string(), self.metadata.snapshot_id.clone()),
                KeyValue::new("tagsignal.n_rows".to_string(), self.n_rows().to_string()),
                KeyValue::new("tagsignal.n_cols".to_string(), self.n_terms().to_string()),
            ]))
            .build();

        let mut staged = StagedFile::create(path)?;
        let mut writer = ArrowWriter::try_new(staged.file_mut()?, schema.clone(), Some(props))
            .map_err(|e| Error::op("create_parquet_writer", e))?;
        if !values.is_empty() {
            let columns: Vec<ArrayRef> = vec![
                Arc::new(UInt64Array::from(rows)),
                Arc::new(UInt64Array::from(cols)),
                Arc::new(Float64Array::from(values)),
            ];
            let batch =
                RecordBatch::try_new(schema, columns).map_err(|e| Error::op("build_record_batch", e))?;
            writer
                .write(&batch)
                .map_err(|e| Error::op("write_parquet_batch", e))?;
        }
        writer
            .close()
            .map_err(|e| Error::op("close_parquet_writer", e))?;
        staged.commit()
    }

    #[allow(clippy::cast_precision_loss)]
    fn write_posts(&self, path: &Path) -> Result<()> {
        let n_terms = self.n_terms();
        let mut staged = StagedFile::create(path)?;
        {
            let mut writer = csv::Writer::from_writer(staged.file_mut()?);
            for (row, signal) in self.rows().enumerate() {
                let mean_weight = if n_terms == 0 {
                    0.0
                } else {
                    signal.weights.sum() / n_terms as f64
                };
                writer
                    .serialize(PostLine {
                        row,
                        dedup_key: signal.dedup_key.as_str(),
                        hashtags: signal.structured.hashtags.join(";"),
                        mentions: signal.structured.mentions.join(";"),
                        like_count: signal.structured.like_count,
                        repost_count: signal.structured.repost_count,
                        reply_count: signal.structured.reply_count,
                        term_count: signal.structured.term_count,
                        nnz: signal.weights.len(),
                        mean_weight,
                    })
                    .map_err(|e| Error::op("write_csv", e))?;
            }
            writer.flush().map_err(|e| Error::op("flush_csv", e))?;
        }
        staged.commit()
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut staged = StagedFile::create(path)?;
    {
        let file = staged.file_mut()?;
        serde_json::to_writer_pretty(&mut *file, value).map_err(|e| Error::op("write_json", e))?;
        writeln!(file).map_err(|e| Error::op("write_json", e))?;
    }
    staged.commit()
}
