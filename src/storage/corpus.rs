//! In-memory corpus of canonical posts.

use crate::models::{CanonicalPost, DedupKey};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Instant;
use tracing::instrument;

use super::atomic::StagedFile;
use super::parquet::{self, SCHEMA_VERSION};

/// Result of merging one corpus into another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Rows appended from the other corpus.
    pub added: usize,
    /// Rows skipped because their dedup key was already present.
    pub skipped_duplicates: usize,
}

impl MergeReport {
    /// Adds another report's counts to this one.
    pub const fn absorb(&mut self, other: Self) {
        self.added += other.added;
        self.skipped_duplicates += other.skipped_duplicates;
    }
}

/// Ordered collection of canonical posts, unique by dedup key.
///
/// Rows keep insertion order, which is also the row order of persisted files
/// and of feature matrices built from the corpus.
#[derive(Debug, Clone, Default)]
pub struct CorpusStore {
    posts: Vec<CanonicalPost>,
    index: HashMap<DedupKey, usize>,
    post_ids: HashSet<String>,
}

impl CorpusStore {
    /// Creates an empty corpus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a corpus from posts in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] if two posts share a dedup key.
    pub fn from_posts(posts: impl IntoIterator<Item = CanonicalPost>) -> Result<Self> {
        let mut store = Self::new();
        for post in posts {
            store.append(post)?;
        }
        Ok(store)
    }

    /// Number of posts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    /// Whether the corpus holds no posts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Whether a post with this dedup key is stored.
    #[must_use]
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.index.contains_key(key)
    }

    /// Whether a post with this platform id is stored.
    #[must_use]
    pub fn contains_post_id(&self, post_id: &str) -> bool {
        self.post_ids.contains(post_id)
    }

    /// Looks up a post by dedup key.
    #[must_use]
    pub fn get(&self, key: &DedupKey) -> Option<&CanonicalPost> {
        self.index.get(key).map(|&row| &self.posts[row])
    }

    /// Posts in corpus order.
    #[must_use]
    pub fn posts(&self) -> &[CanonicalPost] {
        &self.posts
    }

    /// Iterates posts in corpus order.
    pub fn iter(&self) -> std::slice::Iter<'_, CanonicalPost> {
        self.posts.iter()
    }

    /// Iterates dedup keys in corpus order.
    pub fn keys(&self) -> impl Iterator<Item = &DedupKey> {
        self.posts.iter().map(|p| &p.dedup_key)
    }

    /// Appends a post at the end of the corpus.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] if the dedup key is already present.
    pub fn append(&mut self, post: CanonicalPost) -> Result<()> {
        if self.index.contains_key(&post.dedup_key) {
            return Err(Error::DuplicateKey {
                key: post.dedup_key.to_string(),
            });
        }
        self.index.insert(post.dedup_key.clone(), self.posts.len());
        if let Some(id) = &post.post_id {
            self.post_ids.insert(id.clone());
        }
        self.posts.push(post);
        Ok(())
    }

    /// Merges `other` into this corpus.
    ///
    /// Existing rows keep their order; rows of `other` whose key is new are
    /// appended in `other`'s order. The result holds `|A| + |B| - |A ∩ B|`
    /// posts.
    pub fn merge(&mut self, other: Self) -> MergeReport {
        let mut report = MergeReport::default();
        for post in other.posts {
            if self.contains(&post.dedup_key) {
                report.skipped_duplicates += 1;
                continue;
            }
            self.index.insert(post.dedup_key.clone(), self.posts.len());
            if let Some(id) = &post.post_id {
                self.post_ids.insert(id.clone());
            }
            self.posts.push(post);
            report.added += 1;
        }

        tracing::info!(
            added = report.added,
            skipped_duplicates = report.skipped_duplicates,
            total = self.len(),
            "Corpus merged"
        );
        report
    }

    /// Identifier of the current contents.
    ///
    /// SHA-256 hex over the schema version and the ordered dedup keys, so it
    /// changes whenever rows are added or reordered.
    #[must_use]
    pub fn snapshot_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(SCHEMA_VERSION.to_be_bytes());
        for key in self.keys() {
            hasher.update(key.as_str().as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    /// Number of posts per source hashtag query.
    #[must_use]
    pub fn query_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for post in &self.posts {
            *counts.entry(post.source_hashtag_query.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Writes the corpus to `path` as Parquet.
    ///
    /// The file is staged next to `path` and renamed into place only after a
    /// complete write.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding, writing or renaming fails.
    #[instrument(skip_all, fields(path = %path.display(), rows = self.len()))]
    pub fn persist(&self, path: &Path) -> Result<()> {
        let start = Instant::now();
        let mut staged = StagedFile::create(path)?;
        parquet::write_posts(staged.file_mut()?, &self.posts)?;
        staged.commit()?;

        tracing::info!(
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Corpus persisted"
        );
        Ok(())
    }

    /// Loads a corpus written by [`CorpusStore::persist`].
    ///
    /// Files from older schema versions are upgraded in memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] for unsupported files,
    /// [`Error::DuplicateKey`] if the file repeats a key, or an operation
    /// error if it cannot be read.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let store = Self::from_posts(parquet::read_posts(path)?)?;
        tracing::info!(rows = store.len(), "Corpus loaded");
        Ok(store)
    }

    /// Loads `path` if it exists, otherwise returns an empty corpus.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`CorpusStore::load`].
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.display(), "No corpus file yet, starting empty");
            Ok(Self::new())
        }
    }
}

impl<'a> IntoIterator for &'a CorpusStore {
    type Item = &'a CanonicalPost;
    type IntoIter = std::slice::Iter<'a, CanonicalPost>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
