//! Prometheus metrics.
//!
//! Counters and histograms go through the `metrics` facade. With metrics
//! enabled a Prometheus recorder collects them, and the rendered snapshot is
//! written to a text file when the process shuts down.

use crate::config::MetricsSettings;
use crate::storage::StagedFile;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::io::Write;
use std::path::PathBuf;

/// Metrics configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Where to write the Prometheus text snapshot.
    pub snapshot_path: Option<PathBuf>,
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings with env overrides.
    #[must_use]
    pub fn from_settings(settings: &MetricsSettings) -> Self {
        Self::from_settings_with(settings, |key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_settings`] with a custom environment lookup.
    #[must_use]
    pub fn from_settings_with<F>(settings: &MetricsSettings, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            enabled: settings.enabled.unwrap_or(false),
            snapshot_path: settings.snapshot_path.clone(),
        };

        if let Some(enabled) = lookup("TAGSIGNAL_METRICS_ENABLED").map(|v| parse_bool(&v)) {
            config.enabled = enabled;
        }
        if let Some(path) = lookup("TAGSIGNAL_METRICS_SNAPSHOT").filter(|v| !v.is_empty()) {
            config.snapshot_path = Some(PathBuf::from(path));
        }

        config
    }
}

/// Metrics handle for flushing on shutdown.
#[derive(Debug)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
    snapshot_path: Option<PathBuf>,
}

impl MetricsHandle {
    /// Current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }
}

/// Installs the global Prometheus recorder.
///
/// Returns `None` when metrics are disabled.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::op("metrics_recorder_install", e))?;

    Ok(Some(MetricsHandle {
        prometheus,
        snapshot_path: config.snapshot_path.clone(),
    }))
}

/// Writes the current snapshot to the configured file, if any.
pub fn flush(handle: &MetricsHandle) -> Result<()> {
    let Some(path) = &handle.snapshot_path else {
        tracing::debug!("No metrics snapshot path configured, skipping flush");
        return Ok(());
    };

    let mut payload = handle.render();
    if !payload.ends_with('\n') {
        payload.push('\n');
    }

    let mut staged = StagedFile::create(path)?;
    staged
        .file_mut()?
        .write_all(payload.as_bytes())
        .map_err(|e| Error::op("write_metrics_snapshot", e))?;
    staged.commit()?;

    tracing::debug!(bytes = payload.len(), path = %path.display(), "Wrote metrics snapshot");
    Ok(())
}

fn parse_bool(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "true" || value == "1" || value == "yes"
}
