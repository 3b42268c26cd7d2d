//! Text-to-signal conversion.
//!
//! Post text is tokenized into terms, a vocabulary is chosen from document
//! frequencies, and each post becomes a sparse TF-IDF row. Hashtags,
//! mentions and engagement counts ride along as structured fields.

mod aggregate;
mod extractor;
mod matrix;
pub mod stop_words;
pub mod tokenizer;
mod vocabulary;

pub use aggregate::SignalAggregate;
pub use extractor::{FeatureConfig, FeatureExtractor};
pub use matrix::{FeatureMatrix, RowMeta, SparseMatrix, SparseRow, StructuredFields};
pub use tokenizer::Tokenizer;
pub use vocabulary::{FeatureVocabulary, TermStats, smooth_idf};
