// ABOUTME: Destination side of the connector - bulk write operations and clients
// ABOUTME: BulkClient separates transport failures (Err) from per-item failures

pub mod elasticsearch;
pub mod memory;

use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::future::Future;

use crate::pipeline::Row;

pub use elasticsearch::ElasticsearchClient;
pub use memory::MemoryBulkClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteKind {
    /// Create or replace the whole document
    Index,
    /// Merge into the document, creating it when absent
    Upsert,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteKind::Index => f.write_str("index"),
            WriteKind::Upsert => f.write_str("upsert"),
        }
    }
}

/// A single document write produced by the pipeline engine.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    pub kind: WriteKind,
    pub index: String,
    pub id: String,
    pub doc: Row,
}

/// Outcome of one item in a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    pub kind: WriteKind,
    pub index: String,
    pub id: String,
    pub status: u16,
    pub error: Option<String>,
}

impl BulkItem {
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || !(200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    /// Items the destination rejected
    pub fn failed(&self) -> impl Iterator<Item = &BulkItem> {
        self.items.iter().filter(|item| item.is_failure())
    }
}

/// Submits batches of write operations to the search index.
pub trait BulkClient: Send {
    /// Send every operation in one request. An `Err` means the request as a
    /// whole failed; rejected items are reported in the response instead.
    fn bulk(&mut self, ops: &[WriteOp]) -> impl Future<Output = Result<BulkResponse>> + Send;
}
