// ABOUTME: SyncLoop - single consumer of the intake queue that batches writes and checkpoints
// ABOUTME: Flushes on size or timer and always flushes before persisting a position

pub mod checkpoint;

use anyhow::{bail, Context, Result};
use binlog_source::Position;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::Config;
use crate::destination::{BulkClient, WriteOp};
use crate::event::{ChangeEvent, PositionMarker, SyncMessage};
use crate::pipeline::PipelineEngine;
use crate::shutdown::Shutdown;

pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};

/// What to do when the destination rejects individual items of a bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialFailurePolicy {
    /// Log every rejected item and keep going
    #[default]
    Log,
    /// Stop before the next checkpoint is written
    Fail,
}

/// Configuration for the SyncLoop.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Flush timer interval
    pub flush_interval: Duration,
    /// Pending operations that trigger a flush without waiting for the timer
    pub bulk_size: usize,
    /// Minimum spacing between checkpoints taken on ordinary commit markers
    pub checkpoint_interval: Duration,
    pub partial_failure_policy: PartialFailurePolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(1),
            bulk_size: 1000,
            checkpoint_interval: Duration::from_secs(3),
            partial_failure_policy: PartialFailurePolicy::Log,
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            flush_interval: config.es.flush_interval(),
            bulk_size: config.es.bulk_size,
            checkpoint_interval: config.sync.checkpoint_interval(),
            partial_failure_policy: config.sync.partial_failure_policy,
        }
    }
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStats {
    /// Change events taken off the queue
    pub events: u64,
    /// Write operations submitted to the destination
    pub write_ops: u64,
    pub flushes: u64,
    pub checkpoints: u64,
    /// Items the destination rejected
    pub failed_items: u64,
    pub last_checkpoint: Option<Position>,
}

pub struct SyncLoop<C, S> {
    engine: PipelineEngine,
    client: C,
    store: S,
    settings: SyncSettings,
    pending: Vec<WriteOp>,
    last_checkpoint: Option<Position>,
    last_checkpoint_at: Instant,
    /// Newest marker skipped by throttling, persisted when the queue drains
    throttled: Option<Position>,
    stats: SyncStats,
}

impl<C, S> SyncLoop<C, S>
where
    C: BulkClient,
    S: CheckpointStore,
{
    /// `start` is the position the log client resumes from, as read from the
    /// checkpoint store.
    pub fn new(
        engine: PipelineEngine,
        client: C,
        store: S,
        settings: SyncSettings,
        start: Option<Position>,
    ) -> Self {
        Self {
            engine,
            client,
            store,
            settings,
            pending: Vec::new(),
            last_checkpoint: start,
            last_checkpoint_at: Instant::now(),
            throttled: None,
            stats: SyncStats::default(),
        }
    }

    /// Consume the queue until it closes, shutdown is requested or a fatal
    /// error occurs. Shutdown is triggered on every exit path so producers
    /// and the log client stop with the loop.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<SyncMessage>,
        shutdown: Shutdown,
    ) -> Result<SyncStats> {
        tracing::info!(
            "Starting sync loop (bulk size {}, flush every {:?}, resume from {})",
            self.settings.bulk_size,
            self.settings.flush_interval,
            self.last_checkpoint
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "stream start".to_string())
        );

        let result = self.process(&mut rx, &shutdown).await;
        shutdown.trigger();
        rx.close();

        match result {
            Ok(()) => {
                tracing::info!(
                    "Sync loop stopped: {} events, {} operations in {} flushes, {} checkpoints",
                    self.stats.events,
                    self.stats.write_ops,
                    self.stats.flushes,
                    self.stats.checkpoints
                );
                Ok(self.stats)
            }
            Err(e) => {
                tracing::error!("Sync loop failed: {:#}", e);
                Err(e)
            }
        }
    }

    async fn process(
        &mut self,
        rx: &mut mpsc::Receiver<SyncMessage>,
        shutdown: &Shutdown,
    ) -> Result<()> {
        let period = self.settings.flush_interval;
        let mut flush_timer = interval_at(Instant::now() + period, period);
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.last_checkpoint_at = Instant::now();

        loop {
            let mut flush_due = false;
            let mut checkpoint_due = None;

            tokio::select! {
                biased; // Check shutdown first

                _ = shutdown.wait() => {
                    tracing::info!("Shutdown signal received, stopping sync loop");
                    return Ok(());
                }
                _ = flush_timer.tick() => {
                    flush_due = true;
                }
                message = rx.recv() => match message {
                    Some(SyncMessage::Position(marker)) => {
                        if let Some(position) = self.on_marker(marker) {
                            flush_due = true;
                            checkpoint_due = Some(position);
                        }
                    }
                    Some(SyncMessage::Change(data)) => {
                        flush_due = self.on_change(&data)?;
                    }
                    None => {
                        tracing::info!("Event queue closed, draining pending writes");
                        self.flush().await?;
                        if let Some(position) = self.throttled.take() {
                            self.checkpoint(position).await?;
                        }
                        return Ok(());
                    }
                },
            }

            if flush_due {
                self.flush().await?;
            }
            if let Some(position) = checkpoint_due {
                self.checkpoint(position).await?;
            }
        }
    }

    /// Decide whether a marker is checkpointed now. Returns the position to
    /// persist, if any.
    fn on_marker(&mut self, marker: PositionMarker) -> Option<Position> {
        if !self.is_newer(&marker.position) {
            return None;
        }

        if marker.force_checkpoint
            || self.last_checkpoint_at.elapsed() >= self.settings.checkpoint_interval
        {
            self.throttled = None;
            Some(marker.position)
        } else {
            self.throttled = Some(marker.position);
            None
        }
    }

    /// Run a change event through the pipelines. Returns true when the
    /// pending batch reached the bulk size.
    fn on_change(&mut self, data: &[u8]) -> Result<bool> {
        let event = ChangeEvent::decode(data).context("Unrecognized message on event queue")?;
        let ops = self
            .engine
            .apply(&event)
            .with_context(|| format!("Pipeline failed for {}.{}", event.schema, event.table))?;

        self.stats.events += 1;
        self.pending.extend(ops);
        Ok(self.pending.len() >= self.settings.bulk_size)
    }

    async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.pending);
        let response = self
            .client
            .bulk(&batch)
            .await
            .with_context(|| format!("Bulk request with {} operations failed", batch.len()))?;

        self.stats.flushes += 1;
        self.stats.write_ops += batch.len() as u64;

        let mut failed = 0u64;
        for item in response.failed() {
            failed += 1;
            tracing::error!(
                "Destination rejected {} of {}/{} (status {}): {}",
                item.kind,
                item.index,
                item.id,
                item.status,
                item.error.as_deref().unwrap_or("no reason given")
            );
        }
        self.stats.failed_items += failed;

        tracing::debug!(
            "Flushed {} operations ({} rejected)",
            batch.len(),
            failed
        );

        if failed > 0 && self.settings.partial_failure_policy == PartialFailurePolicy::Fail {
            bail!("Destination rejected {} of {} operations", failed, batch.len());
        }
        Ok(())
    }

    async fn checkpoint(&mut self, position: Position) -> Result<()> {
        if !self.is_newer(&position) {
            return Ok(());
        }

        self.store
            .write(&position)
            .await
            .with_context(|| format!("Failed to persist checkpoint {}", position))?;

        tracing::info!("Checkpoint saved at {}", position);
        self.last_checkpoint_at = Instant::now();
        self.stats.checkpoints += 1;
        self.stats.last_checkpoint = Some(position.clone());
        self.last_checkpoint = Some(position);
        Ok(())
    }

    fn is_newer(&self, position: &Position) -> bool {
        self.last_checkpoint
            .as_ref()
            .map_or(true, |last| position > last)
    }
}
