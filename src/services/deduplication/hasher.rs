//! Content hashing for deduplication.
//!
//! Post text is normalized before hashing so that reposts differing only in
//! case, links, emoji or a trailing run of hashtags collapse to the same
//! fingerprint.

use crate::features::tokenizer::{is_tag_token, strip_urls};
use crate::models::{DedupKey, Fingerprint};
use sha2::{Digest, Sha256};

use super::config::NormalizationConfig;

/// Separator between fingerprint and author in the dedup key preimage.
const KEY_SEPARATOR: u8 = 0x1F;

/// Content hasher for deduplication.
///
/// # Normalization
///
/// Each step can be switched off in [`NormalizationConfig`]:
/// - Lowercase
/// - Replace URLs with whitespace
/// - Replace emoji and pictographic symbols with whitespace
/// - Collapse whitespace
/// - Drop the trailing run of `#tag` / `@mention` tokens, unless the run is
///   the whole text
///
/// # Example
///
/// ```rust
/// use tagsignal::services::deduplication::ContentHasher;
///
/// let hasher = ContentHasher::default();
/// assert_eq!(
///     hasher.normalize("Nifty50 rallies today! #nifty50 #banknifty"),
///     "nifty50 rallies today!"
/// );
/// assert_eq!(
///     hasher.fingerprint("Nifty50 rallies today! #nifty50 #banknifty"),
///     hasher.fingerprint("Nifty50 rallies today! #nifty50"),
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    config: NormalizationConfig,
}

impl ContentHasher {
    /// Creates a hasher with the given normalization rules.
    #[must_use]
    pub const fn new(config: NormalizationConfig) -> Self {
        Self { config }
    }

    /// Normalizes post text for fingerprinting.
    #[must_use]
    pub fn normalize(&self, text: &str) -> String {
        let mut text = if self.config.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        if self.config.strip_urls {
            text = strip_urls(&text);
        }
        if self.config.strip_emoji {
            text = text
                .chars()
                .map(|c| if is_emoji(c) { ' ' } else { c })
                .collect();
        }

        let tokens: Vec<&str> = text.split_whitespace().collect();
        let kept = self.trailing_run_start(&tokens);
        tokens[..kept].join(" ")
    }

    /// Computes the SHA-256 fingerprint of normalized text.
    #[must_use]
    pub fn fingerprint(&self, text: &str) -> Fingerprint {
        let normalized = self.normalize(text);
        Fingerprint::new(hex::encode(Sha256::digest(normalized.as_bytes())))
    }

    /// Normalizes an author handle: trimmed, lowercased, leading `@` removed.
    #[must_use]
    pub fn normalize_author(handle: &str) -> String {
        let trimmed = handle.trim();
        trimmed
            .strip_prefix('@')
            .unwrap_or(trimmed)
            .to_lowercase()
    }

    /// Derives the dedup key from a fingerprint and an author handle.
    #[must_use]
    pub fn dedup_key(fingerprint: &Fingerprint, author_handle: &str) -> DedupKey {
        let mut hasher = Sha256::new();
        hasher.update(fingerprint.as_str().as_bytes());
        hasher.update([KEY_SEPARATOR]);
        hasher.update(Self::normalize_author(author_handle).as_bytes());
        DedupKey::new(hex::encode(hasher.finalize()))
    }

    /// Index where the strippable trailing tag run begins.
    fn trailing_run_start(&self, tokens: &[&str]) -> usize {
        let strippable = |token: &str| {
            is_tag_token(token)
                && ((self.config.strip_trailing_hashtags && token.starts_with('#'))
                    || (self.config.strip_trailing_mentions && token.starts_with('@')))
        };

        let mut end = tokens.len();
        while end > 0 && strippable(tokens[end - 1]) {
            end -= 1;
        }
        if end == 0 { tokens.len() } else { end }
    }
}

/// Emoji, pictographs, dingbats, regional indicators and their joiners.
const fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1FAFF
            | 0x2600..=0x27BF
            | 0x2B00..=0x2BFF
            | 0xFE00..=0xFE0F
            | 0x200D
            | 0x20E3
            | 0xE0020..=0xE007F
    )
}
