// ABOUTME: Checkpoint stores - durable record of the last safely indexed binlog position
// ABOUTME: File store persists JSON via temp file + rename; memory store is for tests

use anyhow::{Context, Result};
use binlog_source::Position;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::fs;
use tracing::warn;

const CHECKPOINT_VERSION: u32 = 1;

/// Where the sync loop records its resume point.
pub trait CheckpointStore: Send {
    /// Last persisted position, `None` when nothing has been recorded yet
    fn read(&self) -> impl Future<Output = Result<Option<Position>>> + Send;

    fn write(&mut self, position: &Position) -> impl Future<Output = Result<()>> + Send;
}

/// On-disk checkpoint format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Version of the checkpoint format
    pub version: u32,
    pub position: Position,
    pub saved_at: chrono::DateTime<chrono::Utc>,
    /// Digest of the pipeline file active when this checkpoint was written
    #[serde(default)]
    pub pipeline_fingerprint: Option<String>,
}

impl Checkpoint {
    pub fn new(position: Position, pipeline_fingerprint: Option<String>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            position,
            saved_at: chrono::Utc::now(),
            pipeline_fingerprint,
        }
    }

    /// Load a checkpoint file, `None` if it does not exist
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read checkpoint from {:?}", path))
            }
        };
        let checkpoint: Checkpoint = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse checkpoint from {:?}", path))?;
        Ok(Some(checkpoint))
    }

    /// Save atomically: write a sibling temp file, then rename over the target
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }

        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize checkpoint")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)
            .await
            .with_context(|| format!("Failed to write checkpoint to {:?}", tmp))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to move checkpoint into place at {:?}", path))?;
        Ok(())
    }
}

/// Checkpoint store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
    fingerprint: Option<String>,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fingerprint: None,
        }
    }

    /// Stamp written checkpoints with the pipeline digest and warn when an
    /// existing checkpoint was taken under a different pipeline file.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the checkpoint file. Returns whether a file was removed.
    pub async fn reset(&self) -> Result<bool> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove checkpoint {:?}", self.path)),
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    async fn read(&self) -> Result<Option<Position>> {
        let Some(checkpoint) = Checkpoint::load(&self.path).await? else {
            return Ok(None);
        };

        if let (Some(current), Some(stored)) = (&self.fingerprint, &checkpoint.pipeline_fingerprint)
        {
            if current != stored {
                warn!(
                    "Checkpoint {} was written with a different pipeline configuration; \
                     events before it will not be re-indexed with the new pipelines",
                    checkpoint.position
                );
            }
        }

        Ok(Some(checkpoint.position))
    }

    async fn write(&mut self, position: &Position) -> Result<()> {
        Checkpoint::new(position.clone(), self.fingerprint.clone())
            .save(&self.path)
            .await
    }
}

/// In-memory checkpoint store; clones share the recorded history.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    writes: Arc<Mutex<Vec<Position>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that starts out holding `position`
    pub fn starting_at(position: Position) -> Self {
        Self {
            writes: Arc::new(Mutex::new(vec![position])),
        }
    }

    fn writes_guard(&self) -> MutexGuard<'_, Vec<Position>> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every position written so far, oldest first
    pub fn writes(&self) -> Vec<Position> {
        self.writes_guard().clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    async fn read(&self) -> Result<Option<Position>> {
        Ok(self.writes_guard().last().cloned())
    }

    async fn write(&mut self, position: &Position) -> Result<()> {
        self.writes_guard().push(position.clone());
        Ok(())
    }
}
