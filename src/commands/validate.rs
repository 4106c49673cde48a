// ABOUTME: Validate command - loads configuration and pipelines without connecting anywhere
// ABOUTME: Prints tracked tables and routing keys so operators can review the setup

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::{sanitize_url, Config};
use crate::event::{routing_key, Action};
use crate::filters::SourceFilter;
use crate::pipeline::{PipelineEngine, PipelineFile, TransformRegistry};

pub async fn validate(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let filter = SourceFilter::new(&config.sources)?;
    let pipelines = PipelineFile::load(&config.pipeline_path)?;
    let engine = PipelineEngine::new(pipelines.configs, &TransformRegistry::with_builtins())
        .with_context(|| format!("Invalid pipeline file {:?}", config.pipeline_path))?;

    println!("Elasticsearch nodes:");
    for node in &config.es.nodes {
        println!("  {}", sanitize_url(node));
    }

    println!("Tracked tables:");
    for table in filter.tracked_tables() {
        println!("  {}", table);
    }

    println!("Pipelines:");
    for key in engine.routing_keys() {
        println!("  {}", key);
    }

    let unrouted: Vec<String> = config
        .sources
        .iter()
        .flat_map(|source| {
            source.tables.iter().flat_map(move |table| {
                [Action::Insert, Action::Update]
                    .into_iter()
                    .map(move |action| routing_key(&source.schema, table, action))
            })
        })
        .filter(|key| !engine.has_route(key))
        .collect();
    if !unrouted.is_empty() {
        println!("Tracked changes without a pipeline (skipped):");
        for key in &unrouted {
            println!("  {}", key);
        }
    }

    println!("Configuration is valid");
    Ok(())
}
