//! Deduplication configuration.

use serde::{Deserialize, Serialize};

/// Which normalization steps run before fingerprinting.
///
/// All steps are on by default. The exact near-duplicate boundary is a
/// judgment call, so every step can be switched off from the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct NormalizationConfig {
    /// Lowercase the text.
    pub lowercase: bool,
    /// Remove `http(s)://` and `www.` links.
    pub strip_urls: bool,
    /// Remove emoji and pictographic symbols.
    pub strip_emoji: bool,
    /// Drop trailing `#tag` tokens.
    pub strip_trailing_hashtags: bool,
    /// Drop trailing `@mention` tokens.
    pub strip_trailing_mentions: bool,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            strip_urls: true,
            strip_emoji: true,
            strip_trailing_hashtags: true,
            strip_trailing_mentions: true,
        }
    }
}

/// Configuration for the deduplication service.
///
/// # Example
///
/// ```rust
/// use tagsignal::services::deduplication::DeduplicationConfig;
///
/// let config = DeduplicationConfig::default();
/// assert!(config.reject_seen_post_ids);
/// assert!(config.normalization.strip_trailing_hashtags);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeduplicationConfig {
    /// Text normalization rules.
    pub normalization: NormalizationConfig,

    /// Also reject records whose platform post id was already seen.
    ///
    /// Post ids can be unstable across scrapes, so this is a secondary check
    /// on top of the dedup key.
    pub reject_seen_post_ids: bool,
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            normalization: NormalizationConfig::default(),
            reject_seen_post_ids: true,
        }
    }
}

impl DeduplicationConfig {
    /// Sets the normalization rules.
    #[must_use]
    pub const fn with_normalization(mut self, normalization: NormalizationConfig) -> Self {
        self.normalization = normalization;
        self
    }

    /// Enables or disables the post id check.
    #[must_use]
    pub const fn with_reject_seen_post_ids(mut self, reject: bool) -> Self {
        self.reject_seen_post_ids = reject;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: DeduplicationConfig = toml::from_str(
            r"
            reject_seen_post_ids = false

            [normalization]
            strip_emoji = false
            ",
        )
        .unwrap();

        assert!(!config.reject_seen_post_ids);
        assert!(!config.normalization.strip_emoji);
        assert!(config.normalization.strip_urls);
        assert!(config.normalization.strip_trailing_hashtags);
    }

    #[test]
    fn test_builders() {
        let config = DeduplicationConfig::default()
            .with_reject_seen_post_ids(false)
            .with_normalization(NormalizationConfig {
                lowercase: false,
                ..NormalizationConfig::default()
            });
        assert!(!config.reject_seen_post_ids);
        assert!(!config.normalization.lowercase);
    }
}
