// ABOUTME: Run command - wires the binlog feed, intake, pipelines and sync loop together
// ABOUTME: Ctrl-C or any fatal error stops every component through one shutdown signal

use anyhow::{Context, Result};
use binlog_source::{ReplayFeed, ReplayStats};
use std::path::Path;
use tokio::io::AsyncBufRead;

use crate::config::{sanitize_url, Config};
use crate::destination::ElasticsearchClient;
use crate::filters::SourceFilter;
use crate::intake::{self, Intake};
use crate::pipeline::{PipelineEngine, PipelineFile, TransformRegistry};
use crate::shutdown::Shutdown;
use crate::sync::{CheckpointStore, FileCheckpointStore, SyncLoop, SyncSettings};

/// Stream notifications from `feed` (a JSON-lines file, or `-` for stdin)
/// into the index until the feed ends or shutdown is requested.
pub async fn run(config_path: &Path, feed: &str) -> Result<()> {
    let config = Config::load(config_path)?;
    let pipelines = PipelineFile::load(&config.pipeline_path)?;
    let engine = PipelineEngine::new(pipelines.configs, &TransformRegistry::with_builtins())
        .context("Failed to build pipelines")?;
    let filter = SourceFilter::new(&config.sources)?;
    let client = ElasticsearchClient::new(&config.es)?;
    let store = FileCheckpointStore::new(&config.checkpoint.path)
        .with_fingerprint(pipelines.fingerprint);
    let start = store.read().await?;

    tracing::info!(
        "Indexing into {} from {} tracked tables",
        config
            .es
            .nodes
            .iter()
            .map(|node| sanitize_url(node))
            .collect::<Vec<_>>()
            .join(", "),
        filter.tracked_tables().len()
    );
    match &start {
        Some(position) => tracing::info!("Resuming after checkpoint {}", position),
        None => tracing::info!("No checkpoint recorded, starting from the beginning of the feed"),
    }

    let shutdown = Shutdown::new();
    let (tx, rx) = intake::queue(config.sync.queue_capacity);
    let intake = Intake::new(tx, filter, shutdown.clone());

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down");
            signal.trigger();
        }
    });

    let sync_loop = SyncLoop::new(
        engine,
        client,
        store,
        SyncSettings::from_config(&config),
        start.clone(),
    );

    let source = if feed == "-" {
        None
    } else {
        Some(ReplayFeed::open(Path::new(feed), start.clone()).await?)
    };

    let loop_handle = tokio::spawn(sync_loop.run(rx, shutdown.clone()));
    let replayed = match source {
        Some(file) => replay(file, intake, &shutdown).await,
        None => replay(ReplayFeed::stdin(start), intake, &shutdown).await,
    };
    let interrupted = shutdown.is_triggered();

    let stats = loop_handle.await.context("Sync loop task panicked")??;
    match replayed {
        Ok(replayed) => tracing::info!(
            "Feed finished: {} notifications dispatched, {} already indexed",
            replayed.dispatched,
            replayed.skipped
        ),
        Err(e) if interrupted => tracing::debug!("Feed stopped by shutdown: {:#}", e),
        Err(e) => return Err(e),
    }

    match stats.last_checkpoint {
        Some(position) => tracing::info!("Last checkpoint: {}", position),
        None => tracing::info!("No checkpoint written in this run"),
    }
    Ok(())
}

/// Drive the feed into the intake. Dropping the intake afterwards closes the
/// queue so the sync loop drains and exits.
async fn replay<R>(
    feed: ReplayFeed<R>,
    mut intake: Intake,
    shutdown: &Shutdown,
) -> Result<ReplayStats>
where
    R: AsyncBufRead + Unpin + Send,
{
    let result = feed.run(&mut intake, shutdown.wait()).await;
    drop(intake);
    result
}
