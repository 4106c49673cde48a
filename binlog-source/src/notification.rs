// ABOUTME: Structured notifications produced by a binlog client
// ABOUTME: One variant per callback of the EventHandler contract

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::position::Position;
use crate::value::ColumnValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowAction {
    Insert,
    Update,
    Delete,
}

impl RowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowAction::Insert => "insert",
            RowAction::Update => "update",
            RowAction::Delete => "delete",
        }
    }
}

/// A row-change notification for one table.
///
/// For updates `rows` interleaves before and after images:
/// `[before0, after0, before1, after1, ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowsNotification {
    pub position: Position,
    pub schema: String,
    pub table: String,
    pub action: RowAction,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ColumnValue>>,
}

impl RowsNotification {
    /// Qualified table name (schema.table)
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Row images that represent the table state after the change.
    ///
    /// Inserts yield every row, updates yield every after-image and deletes
    /// yield nothing.
    pub fn post_images(&self) -> Result<Vec<&[ColumnValue]>> {
        match self.action {
            RowAction::Insert => Ok(self.rows.iter().map(|row| row.as_slice()).collect()),
            RowAction::Update => {
                if self.rows.len() % 2 != 0 {
                    bail!(
                        "update on {} carries {} row images, expected before/after pairs",
                        self.qualified_name(),
                        self.rows.len()
                    );
                }
                Ok(self
                    .rows
                    .chunks(2)
                    .map(|pair| pair[1].as_slice())
                    .collect())
            }
            RowAction::Delete => Ok(Vec::new()),
        }
    }
}

/// A single notification from the binlog stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// The server switched to a new binlog file
    Rotate { position: Position },
    /// A schema-definition statement was executed
    Ddl {
        position: Position,
        #[serde(default)]
        query: String,
    },
    /// A transaction committed
    Xid { position: Position },
    /// Row images for one table
    Rows(RowsNotification),
    /// Cached table metadata was invalidated
    TableChanged { schema: String, table: String },
}

impl Notification {
    /// Stream position carried by the notification, if any.
    pub fn position(&self) -> Option<&Position> {
        match self {
            Notification::Rotate { position }
            | Notification::Ddl { position, .. }
            | Notification::Xid { position } => Some(position),
            Notification::Rows(rows) => Some(&rows.position),
            Notification::TableChanged { .. } => None,
        }
    }
}
