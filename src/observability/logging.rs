//! Structured logging.

use crate::config::LoggingSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filter used when neither the config nor the environment sets one.
const DEFAULT_FILTER: &str = "info";
const VERBOSE_FILTER: &str = "debug";

/// Output format of log events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, falling back to pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Event format.
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. `info,tagsignal=debug`.
    pub filter: String,
    /// Append events to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: DEFAULT_FILTER.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    ///
    /// `TAGSIGNAL_LOG` wins over `RUST_LOG`, which wins over the config file.
    #[must_use]
    pub fn from_settings(settings: &LoggingSettings, verbose: bool) -> Self {
        Self::from_settings_with(settings, verbose, |key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_settings`] with a custom environment lookup.
    #[must_use]
    pub fn from_settings_with<F>(settings: &LoggingSettings, verbose: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
        let filter = lookup("TAGSIGNAL_LOG")
            .or_else(|| lookup("RUST_LOG"))
            .or_else(|| settings.filter.clone())
            .filter(|directive| !directive.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string());

        Self {
            format: settings.format.unwrap_or_default(),
            filter,
            file: settings.file.clone(),
        }
    }
}
