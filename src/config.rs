// ABOUTME: TOML configuration for the connector (destination, sync policy, sources)
// ABOUTME: Loads, resolves relative paths and validates before anything connects

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::PartialFailurePolicy;

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// JSON file describing the row pipelines, relative to the config file
    pub pipeline_path: PathBuf,
    pub es: EsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Tracked tables, grouped by schema
    #[serde(rename = "source", default)]
    pub sources: Vec<SourceTables>,
}

/// Elasticsearch destination settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EsConfig {
    pub nodes: Vec<String>,
    /// Number of pending actions that triggers a flush
    #[serde(default = "default_bulk_size")]
    pub bulk_size: usize,
    /// Flush timer interval in milliseconds
    #[serde(default = "default_flush_duration")]
    pub flush_duration: u64,
    /// Ask Elasticsearch to refresh affected shards after each bulk request
    #[serde(default = "default_refresh")]
    pub refresh: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl EsConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_duration)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Capacity of the intake queue; a full queue pauses the binlog client
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Minimum spacing of checkpoints taken on ordinary commit markers
    #[serde(default = "default_checkpoint_interval_secs")]
    pub checkpoint_interval_secs: u64,
    #[serde(default)]
    pub partial_failure_policy: PartialFailurePolicy,
}

impl SyncConfig {
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            checkpoint_interval_secs: default_checkpoint_interval_secs(),
            partial_failure_policy: PartialFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_checkpoint_path")]
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: default_checkpoint_path(),
        }
    }
}

/// A `[[source]]` entry: one schema and the tables tracked in it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceTables {
    pub schema: String,
    pub tables: Vec<String>,
}

fn default_bulk_size() -> usize {
    1000
}

fn default_flush_duration() -> u64 {
    1000
}

fn default_refresh() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    4096
}

fn default_checkpoint_interval_secs() -> u64 {
    3
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from(".binlog-indexer/checkpoint.json")
}

impl Config {
    /// Load and validate a configuration file.
    ///
    /// Relative `pipeline_path` and checkpoint paths are resolved against the
    /// directory containing the configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let mut config = Self::parse(&contents)
            .with_context(|| format!("Invalid config file {:?}", path))?;

        if let Some(base) = path.parent() {
            config.pipeline_path = resolve(base, &config.pipeline_path);
            config.checkpoint.path = resolve(base, &config.checkpoint.path);
        }
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.es.nodes.is_empty() {
            bail!("es.nodes must list at least one Elasticsearch node");
        }
        for node in &self.es.nodes {
            let parsed = url::Url::parse(node)
                .with_context(|| format!("Invalid Elasticsearch node URL '{}'", sanitize_url(node)))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                bail!(
                    "Elasticsearch node '{}' must use http or https",
                    sanitize_url(node)
                );
            }
        }
        if self.es.bulk_size == 0 {
            bail!("es.bulk_size must be greater than 0");
        }
        if self.es.flush_duration == 0 {
            bail!("es.flush_duration must be greater than 0");
        }
        if self.sync.queue_capacity == 0 {
            bail!("sync.queue_capacity must be greater than 0");
        }
        if self.sources.is_empty() {
            bail!("At least one [[source]] entry is required");
        }
        Ok(())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Mask the password component of a URL for logging
pub fn sanitize_url(url: &str) -> String {
    if let Ok(mut parsed) = url::Url::parse(url) {
        if parsed.password().is_some() {
            let _ = parsed.set_password(Some("***"));
        }
        parsed.to_string()
    } else {
        url.to_string()
    }
}
