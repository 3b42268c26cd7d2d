//! Post records and identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::lenient::{deserialize_count, deserialize_non_blank, deserialize_timestamp};

/// SHA-256 hex digest of normalized post text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps an existing hex digest.
    #[must_use]
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the digest as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Uniqueness key of a canonical post: fingerprint combined with author.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    /// Wraps an existing hex digest.
    #[must_use]
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DedupKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DedupKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A post as produced by the scraper.
///
/// Legacy field names of the scraper output (`tweet_id`, `username`,
/// `content`, `likes`, `retweets`, `replies`) are accepted as aliases.
/// Author and text are optional here so that incomplete records still parse
/// and can be rejected one by one during deduplication.
///
/// # Field Mapping
///
/// | Field | Required | Default |
/// |-------|----------|---------|
/// | `text` | Yes | - |
/// | `author_handle` | Yes | - |
/// | `post_id` | No | `None` (blank is `None`) |
/// | `timestamp` | No | `None` (unparsable is `None`) |
/// | engagement counts | No | `0` (display text is parsed) |
/// | `source_hashtag_query` | No | empty |
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPostRecord {
    /// Platform-assigned identifier; may be absent or unstable.
    #[serde(default, alias = "tweet_id", deserialize_with = "deserialize_non_blank")]
    pub post_id: Option<String>,

    /// Handle of the posting account.
    #[serde(default, alias = "username")]
    pub author_handle: Option<String>,

    /// When the post was published.
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Post body.
    #[serde(default, alias = "content")]
    pub text: Option<String>,

    /// Hashtags in order of appearance, as the scraper reported them.
    #[serde(default)]
    pub hashtags: Vec<String>,

    /// Mentions in order of appearance, as the scraper reported them.
    #[serde(default)]
    pub mentions: Vec<String>,

    /// Like count.
    #[serde(default, alias = "likes", deserialize_with = "deserialize_count")]
    pub like_count: i64,

    /// Repost count.
    #[serde(default, alias = "retweets", deserialize_with = "deserialize_count")]
    pub repost_count: i64,

    /// Reply count.
    #[serde(default, alias = "replies", deserialize_with = "deserialize_count")]
    pub reply_count: i64,

    /// Hashtag query of the scraping session that produced this record.
    #[serde(default, alias = "query")]
    pub source_hashtag_query: String,
}

impl RawPostRecord {
    /// Creates a record with author and text set.
    #[must_use]
    pub fn new(author_handle: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author_handle: Some(author_handle.into()),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Sets the platform post id.
    #[must_use]
    pub fn with_post_id(mut self, post_id: impl Into<String>) -> Self {
        self.post_id = Some(post_id.into());
        self
    }

    /// Sets the publication timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets like, repost and reply counts.
    #[must_use]
    pub const fn with_engagement(mut self, likes: i64, reposts: i64, replies: i64) -> Self {
        self.like_count = likes;
        self.repost_count = reposts;
        self.reply_count = replies;
        self
    }

    /// Sets the session query.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.source_hashtag_query = query.into();
        self
    }
}

/// A deduplicated post held by the corpus.
///
/// Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalPost {
    /// Uniqueness key.
    pub dedup_key: DedupKey,
    /// Digest of the normalized text.
    pub content_fingerprint: Fingerprint,
    /// Platform-assigned identifier, if any.
    pub post_id: Option<String>,
    /// Handle of the posting account, as received.
    pub author_handle: String,
    /// Publication time, if known.
    pub timestamp: Option<DateTime<Utc>>,
    /// Post body, as received.
    pub text: String,
    /// Hashtags reported by the scraper.
    pub hashtags: Vec<String>,
    /// Mentions reported by the scraper.
    pub mentions: Vec<String>,
    /// Like count, as received.
    pub like_count: i64,
    /// Repost count, as received.
    pub repost_count: i64,
    /// Reply count, as received.
    pub reply_count: i64,
    /// Session query that produced the post.
    pub source_hashtag_query: String,
    /// Unix seconds when the post entered a corpus; 0 when unknown.
    pub ingested_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_record_accepts_scraper_field_names() {
        let json = r#"{
            "tweet_id": "1764",
            "username": "marketwatcher",
            "timestamp": "2024-03-01T09:15:00.000Z",
            "content": "Nifty50 rallies today! #nifty50",
            "likes": "1,204 Likes",
            "retweets": 17,
            "replies": null,
            "mentions": [],
            "hashtags": ["nifty50"]
        }"#;
        let record: RawPostRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.post_id.as_deref(), Some("1764"));
        assert_eq!(record.author_handle.as_deref(), Some("marketwatcher"));
        assert!(record.timestamp.is_some());
        assert_eq!(record.like_count, 1204);
        assert_eq!(record.repost_count, 17);
        assert_eq!(record.reply_count, 0);
        assert_eq!(record.hashtags, vec!["nifty50".to_string()]);
    }

    #[test]
    fn test_raw_record_blank_post_id_is_none() {
        let record: RawPostRecord =
            serde_json::from_str(r#"{"tweet_id": "", "username": "a", "content": "b"}"#).unwrap();
        assert!(record.post_id.is_none());
    }

    #[test]
    fn test_raw_record_missing_fields_still_parse() {
        let record: RawPostRecord = serde_json::from_str("{}").unwrap();
        assert!(record.text.is_none());
        assert!(record.author_handle.is_none());
        assert_eq!(record.like_count, 0);
    }

    #[test]
    fn test_builder_sets_fields() {
        let record = RawPostRecord::new("alice", "Sensex up")
            .with_post_id("42")
            .with_engagement(3, 2, 1)
            .with_query("#sensex");
        assert_eq!(record.post_id.as_deref(), Some("42"));
        assert_eq!(record.like_count, 3);
        assert_eq!(record.reply_count, 1);
        assert_eq!(record.source_hashtag_query, "#sensex");
    }

    #[test]
    fn test_dedup_key_display() {
        let key = DedupKey::new("abc123");
        assert_eq!(key.to_string(), "abc123");
        assert_eq!(DedupKey::from("abc123"), key);
    }
}
