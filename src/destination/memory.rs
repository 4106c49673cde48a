// ABOUTME: In-memory bulk client that records every batch it receives
// ABOUTME: Can reject chosen document ids or fail whole requests

use anyhow::{bail, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{BulkClient, BulkItem, BulkResponse, WriteKind, WriteOp};

#[derive(Debug, Default)]
struct Recorded {
    batches: Vec<Vec<WriteOp>>,
    failing_ids: HashSet<String>,
    fail_requests: bool,
}

/// Cloneable handle; every clone shares the same recorded state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBulkClient {
    state: Arc<Mutex<Recorded>>,
}

impl MemoryBulkClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Recorded> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Report items with this document id as rejected (status 400)
    pub fn fail_id(&self, id: impl Into<String>) {
        self.state().failing_ids.insert(id.into());
    }

    /// Make every subsequent request fail as a transport error
    pub fn fail_requests(&self, fail: bool) {
        self.state().fail_requests = fail;
    }

    /// Every successful batch, in submission order
    pub fn batches(&self) -> Vec<Vec<WriteOp>> {
        self.state().batches.clone()
    }

    /// All operations across batches, flattened
    pub fn operations(&self) -> Vec<WriteOp> {
        self.state().batches.iter().flatten().cloned().collect()
    }
}

impl BulkClient for MemoryBulkClient {
    async fn bulk(&mut self, ops: &[WriteOp]) -> Result<BulkResponse> {
        let mut state = self.state();
        if state.fail_requests {
            bail!("connection refused");
        }

        let items = ops
            .iter()
            .map(|op| {
                let rejected = state.failing_ids.contains(&op.id);
                BulkItem {
                    kind: op.kind,
                    index: op.index.clone(),
                    id: op.id.clone(),
                    status: match (rejected, op.kind) {
                        (true, _) => 400,
                        (false, WriteKind::Index) => 201,
                        (false, WriteKind::Upsert) => 200,
                    },
                    error: rejected.then(|| "rejected by test client".to_string()),
                }
            })
            .collect();

        state.batches.push(ops.to_vec());
        Ok(BulkResponse { items })
    }
}
