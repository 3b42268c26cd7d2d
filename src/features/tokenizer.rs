//! Token grammar for post text.
//!
//! Hashtags are `#word`, mentions are `@word`, terms are runs of at least two
//! word characters. URLs are removed before anything else is matched.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static URL_PATTERN: LazyLock<Regex> = lazy_regex!(r"(?i)(?:https?://|www\.)\S+");
static HASHTAG_PATTERN: LazyLock<Regex> = lazy_regex!(r"#(\w+)");
static MENTION_PATTERN: LazyLock<Regex> = lazy_regex!(r"@(\w+)");
static TERM_PATTERN: LazyLock<Regex> = lazy_regex!(r"\b\w\w+\b");
static TAG_TOKEN_PATTERN: LazyLock<Regex> = lazy_regex!(r"^[#@]\w+\W*$");

/// Replaces every URL in `text` with a space.
#[must_use]
pub fn strip_urls(text: &str) -> String {
    URL_PATTERN.replace_all(text, " ").into_owned()
}

/// Returns hashtags in order of appearance, without the `#`.
#[must_use]
pub fn extract_hashtags(text: &str) -> Vec<String> {
    HASHTAG_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Returns mentions in order of appearance, without the `@`.
#[must_use]
pub fn extract_mentions(text: &str) -> Vec<String> {
    MENTION_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Whether a whitespace-delimited token is a hashtag or mention.
///
/// Trailing punctuation is allowed so that `#nifty50,` still counts.
#[must_use]
pub fn is_tag_token(token: &str) -> bool {
    TAG_TOKEN_PATTERN.is_match(token)
}

/// Removes URLs and mentions, drops `#` so hashtag words remain as text,
/// and collapses whitespace.
#[must_use]
pub fn clean_text(text: &str) -> String {
    let without_urls = strip_urls(text);
    let without_mentions = MENTION_PATTERN.replace_all(&without_urls, " ");
    without_mentions
        .replace('#', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits post text into vectorizer terms.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    stop_words: BTreeSet<String>,
    ngram_range: (usize, usize),
}

impl Tokenizer {
    /// Creates a tokenizer.
    ///
    /// `ngram_range` is inclusive on both ends and is expected to be
    /// validated by the caller (`1 <= min <= max`).
    #[must_use]
    pub const fn new(stop_words: BTreeSet<String>, ngram_range: (usize, usize)) -> Self {
        Self {
            stop_words,
            ngram_range,
        }
    }

    /// Lowercased unigrams of `text` with stop words removed.
    #[must_use]
    pub fn words(&self, text: &str) -> Vec<String> {
        let cleaned = clean_text(text).to_lowercase();
        TERM_PATTERN
            .find_iter(&cleaned)
            .map(|m| m.as_str())
            .filter(|word| !self.stop_words.contains(*word))
            .map(str::to_string)
            .collect()
    }

    /// All terms of `text`: n-grams for every `n` in the configured range,
    /// joined with a single space, in order of `n` then position.
    #[must_use]
    pub fn terms(&self, text: &str) -> Vec<String> {
        let words = self.words(text);
        let (min_n, max_n) = self.ngram_range;
        if min_n == 1 && max_n == 1 {
            return words;
        }

        let mut terms = Vec::new();
        for n in min_n..=max_n.min(words.len()) {
            terms.extend(words.windows(n).map(|window| window.join(" ")));
        }
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_stop_words(range: (usize, usize)) -> Tokenizer {
        Tokenizer::new(BTreeSet::new(), range)
    }

    #[test]
    fn test_extract_hashtags_in_order() {
        let tags = extract_hashtags("Watching #BankNifty and #nifty50 today #BankNifty");
        assert_eq!(tags, vec!["BankNifty", "nifty50", "BankNifty"]);
    }

    #[test]
    fn test_extract_mentions() {
        assert_eq!(
            extract_mentions("cc @trader_one, @desk2"),
            vec!["trader_one", "desk2"]
        );
        assert!(extract_mentions("email me at nowhere").is_empty());
    }

    #[test]
    fn test_strip_urls() {
        let text = strip_urls("chart https://t.co/abc123 and www.example.com/x done");
        assert!(!text.contains("t.co"));
        assert!(!text.contains("example"));
        assert!(text.contains("chart"));
        assert!(text.contains("done"));

        let shouted = strip_urls("chart HTTPS://T.CO/ABC and Www.Example.com done");
        assert_eq!(shouted.split_whitespace().collect::<Vec<_>>(), ["chart", "and", "done"]);
    }

    #[test]
    fn test_clean_text_keeps_hashtag_words() {
        assert_eq!(
            clean_text("@desk #Sensex breaks out https://t.co/x"),
            "Sensex breaks out"
        );
    }

    #[test]
    fn test_is_tag_token() {
        assert!(is_tag_token("#nifty50"));
        assert!(is_tag_token("@desk,"));
        assert!(!is_tag_token("#"));
        assert!(!is_tag_token("nifty50"));
        assert!(!is_tag_token("a#b"));
    }

    #[test]
    fn test_words_skip_single_characters_and_stop_words() {
        let stop: BTreeSet<String> = ["the".to_string()].into_iter().collect();
        let tokenizer = Tokenizer::new(stop, (1, 1));
        assert_eq!(
            tokenizer.words("The Nifty is a rally, I think!"),
            vec!["nifty", "is", "rally", "think"]
        );
    }

    #[test]
    fn test_bigrams() {
        let tokenizer = no_stop_words((1, 2));
        assert_eq!(
            tokenizer.terms("nifty rally today"),
            vec!["nifty", "rally", "today", "nifty rally", "rally today"]
        );
    }

    #[test]
    fn test_bigrams_only_on_short_text() {
        let tokenizer = no_stop_words((2, 2));
        assert!(tokenizer.terms("rally").is_empty());
    }

    #[test]
    fn test_empty_text_has_no_terms() {
        assert!(no_stop_words((1, 1)).terms("  #  @ https://t.co/x ").is_empty());
    }
}
