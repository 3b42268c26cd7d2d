//! Corpus shared between concurrent ingestion sessions.

use crate::{Error, Result};
use std::sync::Mutex;

use super::corpus::{CorpusStore, MergeReport};

/// A corpus guarded by a mutex.
///
/// Sessions build their own [`CorpusStore`] without touching this one; the
/// merge is the only step that takes the lock.
#[derive(Debug, Default)]
pub struct SharedCorpus {
    inner: Mutex<CorpusStore>,
}

impl SharedCorpus {
    /// Wraps a corpus.
    #[must_use]
    pub const fn new(store: CorpusStore) -> Self {
        Self {
            inner: Mutex::new(store),
        }
    }

    /// Merges a finished session corpus.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn merge_session(&self, session: CorpusStore) -> Result<MergeReport> {
        let mut guard = self.inner.lock().map_err(|_| Error::OperationFailed {
            operation: "merge_session".to_string(),
            cause: "Lock poisoned".to_string(),
        })?;
        Ok(guard.merge(session))
    }

    /// Runs `f` against the current corpus while holding the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn read<R>(&self, f: impl FnOnce(&CorpusStore) -> R) -> Result<R> {
        let guard = self.inner.lock().map_err(|_| Error::OperationFailed {
            operation: "read_corpus".to_string(),
            cause: "Lock poisoned".to_string(),
        })?;
        Ok(f(&guard))
    }

    /// Unwraps the corpus.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn into_inner(self) -> Result<CorpusStore> {
        self.inner.into_inner().map_err(|_| Error::OperationFailed {
            operation: "into_inner".to_string(),
            cause: "Lock poisoned".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawPostRecord;
    use crate::services::DeduplicationService;
    use std::thread;

    fn session(author: &str, texts: &[&str]) -> CorpusStore {
        let mut corpus = CorpusStore::new();
        let mut dedup = DeduplicationService::default();
        for text in texts {
            dedup
                .submit(RawPostRecord::new(author, *text), &mut corpus)
                .unwrap();
        }
        corpus
    }

    #[test]
    fn test_concurrent_merges_are_serialized() {
        let shared = SharedCorpus::default();
        thread::scope(|scope| {
            for author in ["a", "b", "c", "d"] {
                let shared = &shared;
                scope.spawn(move || {
                    let corpus = session(author, &["nifty up", "sensex down", "nifty up #x"]);
                    shared.merge_session(corpus).unwrap();
                });
            }
        });

        let corpus = shared.into_inner().unwrap();
        assert_eq!(corpus.len(), 8);
    }

    #[test]
    fn test_overlapping_sessions_counted_once() {
        let shared = SharedCorpus::new(session("a", &["one", "two"]));
        let report = shared.merge_session(session("a", &["two", "three"])).unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.skipped_duplicates, 1);
        assert_eq!(shared.read(CorpusStore::len).unwrap(), 3);
    }
}
