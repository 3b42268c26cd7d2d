//! Corpus storage.
//!
//! The corpus lives in memory as a [`CorpusStore`] and is persisted as a
//! single Parquet file. Concurrent sessions merge through [`SharedCorpus`].

pub mod atomic;
mod corpus;
pub mod parquet;
mod shared;

pub use atomic::StagedFile;
pub use corpus::{CorpusStore, MergeReport};
pub use parquet::{SCHEMA_VERSION, SCHEMA_VERSION_KEY};
pub use shared::SharedCorpus;
