//! Configuration management.
//!
//! Values come from, in increasing precedence: built-in defaults, a TOML
//! file, then `TAGSIGNAL_*` environment variables.
//!
//! ```toml
//! hashtags = ["#nifty50", "#sensex"]
//! min_posts = 500
//! data_dir = "/var/lib/tagsignal"
//!
//! [dedup.normalization]
//! strip_emoji = false
//!
//! [features]
//! min_df = 2
//! ngram_range = [1, 2]
//!
//! [observability.logging]
//! format = "json"
//! file = "scraper.log"
//! ```

use crate::features::FeatureConfig;
use crate::observability::LogFormat;
use crate::services::deduplication::DeduplicationConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Hashtags tracked when none are configured.
pub const DEFAULT_HASHTAGS: [&str; 4] = ["#nifty50", "#sensex", "#intraday", "#banknifty"];

/// Collection target per run. Falling short is logged, never fatal.
pub const DEFAULT_MIN_POSTS: usize = 2000;

/// File name of the corpus inside the data directory.
pub const CORPUS_FILE_NAME: &str = "tweets.parquet";

/// Directory name of exported signals inside the data directory.
pub const SIGNALS_DIR_NAME: &str = "signals";

/// Main configuration for tagsignal.
#[derive(Debug, Clone, PartialEq)]
pub struct TagsignalConfig {
    /// Hashtag queries the collector tracks.
    pub hashtags: Vec<String>,
    /// Target number of posts per run.
    pub min_posts: usize,
    /// Base directory for persisted data.
    pub data_dir: PathBuf,
    /// Location of the persisted corpus.
    pub corpus_path: PathBuf,
    /// Directory exported signals are written to.
    pub signals_dir: PathBuf,
    /// Deduplication rules.
    pub dedup: DeduplicationConfig,
    /// Feature extraction options.
    pub features: FeatureConfig,
    /// Logging and metrics settings.
    pub observability: ObservabilitySettings,
}

/// Observability section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Metrics settings.
    pub metrics: MetricsSettings,
}

/// Logging section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<LogFormat>,
    /// `EnvFilter` directive.
    pub filter: Option<String>,
    /// Append log events to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Metrics section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Install the Prometheus recorder.
    pub enabled: Option<bool>,
    /// File the rendered metrics are written to at shutdown.
    pub snapshot_path: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Tracked hashtags.
    pub hashtags: Option<Vec<String>>,
    /// Collection target.
    pub min_posts: Option<usize>,
    /// Data directory.
    pub data_dir: Option<String>,
    /// Corpus file; defaults to `tweets.parquet` in the data directory.
    pub corpus_path: Option<String>,
    /// Signals directory; defaults to `signals` in the data directory.
    pub signals_dir: Option<String>,
    /// Deduplication section.
    pub dedup: Option<DeduplicationConfig>,
    /// Feature extraction section.
    pub features: Option<FeatureConfig>,
    /// Observability section.
    pub observability: Option<ObservabilitySettings>,
}

impl Default for TagsignalConfig {
    fn default() -> Self {
        Self::with_data_dir(default_data_dir())
    }
}

impl TagsignalConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration rooted at `data_dir`.
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            hashtags: DEFAULT_HASHTAGS.iter().map(ToString::to_string).collect(),
            min_posts: DEFAULT_MIN_POSTS,
            corpus_path: data_dir.join(CORPUS_FILE_NAME),
            signals_dir: data_dir.join(SIGNALS_DIR_NAME),
            data_dir,
            dedup: DeduplicationConfig::default(),
            features: FeatureConfig::default(),
            observability: ObservabilitySettings::default(),
        }
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid config file.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/tagsignal/` on macOS)
    /// 2. XDG config dir (`~/.config/tagsignal/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let platform_config = base_dirs.config_dir().join("tagsignal").join("config.toml");
        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("tagsignal")
            .join("config.toml");

        for candidate in [platform_config, xdg_config] {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %candidate.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `TagsignalConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = file
            .data_dir
            .map_or_else(Self::default, |dir| Self::with_data_dir(PathBuf::from(dir)));

        if let Some(hashtags) = file.hashtags {
            config.hashtags = hashtags;
        }
        if let Some(min_posts) = file.min_posts {
            config.min_posts = min_posts;
        }
        if let Some(path) = file.corpus_path {
            config.corpus_path = PathBuf::from(path);
        }
        if let Some(dir) = file.signals_dir {
            config.signals_dir = PathBuf::from(dir);
        }
        if let Some(dedup) = file.dedup {
            config.dedup = dedup;
        }
        if let Some(features) = file.features {
            config.features = features;
        }
        if let Some(observability) = file.observability {
            config.observability = observability;
        }

        config
    }

    /// Applies `TAGSIGNAL_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a numeric variable does not parse.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Applies overrides using a custom environment lookup.
    ///
    /// Recognized keys: `TAGSIGNAL_DATA_DIR`, `TAGSIGNAL_CORPUS_PATH`,
    /// `TAGSIGNAL_SIGNALS_DIR`, `TAGSIGNAL_HASHTAGS` (comma or space
    /// separated) and `TAGSIGNAL_MIN_POSTS`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a numeric variable does not parse.
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("TAGSIGNAL_DATA_DIR") {
            let data_dir = PathBuf::from(dir);
            if self.corpus_path == self.data_dir.join(CORPUS_FILE_NAME) {
                self.corpus_path = data_dir.join(CORPUS_FILE_NAME);
            }
            if self.signals_dir == self.data_dir.join(SIGNALS_DIR_NAME) {
                self.signals_dir = data_dir.join(SIGNALS_DIR_NAME);
            }
            self.data_dir = data_dir;
        }
        if let Some(path) = get("TAGSIGNAL_CORPUS_PATH") {
            self.corpus_path = PathBuf::from(path);
        }
        if let Some(dir) = get("TAGSIGNAL_SIGNALS_DIR") {
            self.signals_dir = PathBuf::from(dir);
        }
        if let Some(tags) = get("TAGSIGNAL_HASHTAGS") {
            self.hashtags = tags
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(min_posts) = get("TAGSIGNAL_MIN_POSTS") {
            self.min_posts = min_posts.trim().parse().map_err(|_| {
                Error::InvalidInput(format!("TAGSIGNAL_MIN_POSTS is not a number: {min_posts}"))
            })?;
        }

        Ok(self)
    }

    /// Checks the configuration for values no run can use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty or malformed hashtag list
    /// or invalid feature options.
    pub fn validate(&self) -> Result<()> {
        if self.hashtags.is_empty() {
            return Err(Error::InvalidInput("at least one hashtag is required".to_string()));
        }
        if let Some(bad) = self
            .hashtags
            .iter()
            .find(|tag| !tag.starts_with('#') || tag.len() < 2)
        {
            return Err(Error::InvalidInput(format!(
                "hashtag must look like '#tag': {bad}"
            )));
        }
        self.features.validate()
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "tagsignal")
        .map_or_else(|| PathBuf::from(".tagsignal"), |dirs| dirs.data_dir().to_path_buf())
}
