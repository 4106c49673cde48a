// ABOUTME: Pipeline configuration file (JSON) - which tables/actions run which stages
// ABOUTME: Each entry expands to one PipelineConfig per (table, action) routing key

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

use super::transforms::StageArgs;
use crate::event::{routing_key, Action};

/// One stage of a pipeline: a transform name and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    pub function: String,
    pub args: StageArgs,
}

/// A pipeline bound to a single routing key.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub routing_key: String,
    pub stages: Vec<StageConfig>,
    pub destination_index: String,
}

/// Parsed pipeline file plus a digest of its contents.
#[derive(Debug, Clone)]
pub struct PipelineFile {
    pub configs: Vec<PipelineConfig>,
    /// Hex SHA-256 of the file contents, stored alongside checkpoints
    pub fingerprint: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PipelineEntry {
    schema: String,
    tables: Vec<String>,
    actions: Vec<String>,
    stages: Vec<Value>,
    destination: Destination,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Destination {
    index: String,
}

impl PipelineFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {:?}", path))?;
        Self::parse(&contents).with_context(|| format!("Invalid pipeline file {:?}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let entries: Vec<PipelineEntry> =
            serde_json::from_str(contents).context("Failed to parse pipeline JSON")?;

        let mut configs = Vec::new();
        for (idx, entry) in entries.into_iter().enumerate() {
            configs.extend(
                expand(entry).with_context(|| format!("Pipeline entry #{} is invalid", idx + 1))?,
            );
        }

        Ok(Self {
            configs,
            fingerprint: fingerprint(contents),
        })
    }
}

fn expand(entry: PipelineEntry) -> Result<Vec<PipelineConfig>> {
    if entry.schema.trim().is_empty() {
        bail!("schema cannot be empty");
    }
    if entry.tables.is_empty() {
        bail!("tables must list at least one table");
    }
    if entry.actions.is_empty() {
        bail!("actions must list at least one of 'insert' or 'update'");
    }
    if entry.destination.index.trim().is_empty() {
        bail!("destination.index cannot be empty");
    }

    let mut actions = Vec::with_capacity(entry.actions.len());
    for action in &entry.actions {
        match Action::parse(action) {
            Some(parsed) => actions.push(parsed),
            None if action == "delete" => bail!(
                "action 'delete' is not supported: delete events are not propagated to the index"
            ),
            None => bail!("unknown action '{}'", action),
        }
    }

    let stages = entry
        .stages
        .into_iter()
        .enumerate()
        .map(|(idx, stage)| {
            parse_stage(stage).with_context(|| format!("stage #{} is invalid", idx + 1))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut configs = Vec::with_capacity(entry.tables.len() * actions.len());
    for table in &entry.tables {
        for action in &actions {
            configs.push(PipelineConfig {
                routing_key: routing_key(&entry.schema, table, *action),
                stages: stages.clone(),
                destination_index: entry.destination.index.clone(),
            });
        }
    }
    Ok(configs)
}

/// A stage is written as a single-key object: `{"rename": {"fields": {...}}}`.
fn parse_stage(stage: Value) -> Result<StageConfig> {
    let Value::Object(map) = stage else {
        bail!("expected an object of the form {{\"name\": {{args}}}}");
    };
    if map.len() != 1 {
        bail!(
            "expected exactly one transform name per stage, found {}",
            map.len()
        );
    }

    let Some((function, args)) = map.into_iter().next() else {
        bail!("stage is empty");
    };
    let args = match args {
        Value::Object(args) => args,
        Value::Null => StageArgs::new(),
        other => bail!("arguments of '{}' must be an object, got {}", function, other),
    };

    Ok(StageConfig { function, args })
}

/// Stable digest of the pipeline file contents
pub fn fingerprint(contents: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents.as_bytes());
    format!("{:x}", hasher.finalize())
}
