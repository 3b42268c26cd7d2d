//! Data models for tagsignal.
//!
//! Raw records as produced by the scraper, and the canonical posts the
//! corpus stores after deduplication.

mod lenient;
mod post;

pub use lenient::{parse_count_text, parse_timestamp};
pub use post::{CanonicalPost, DedupKey, Fingerprint, RawPostRecord};
