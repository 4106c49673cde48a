// ABOUTME: Callback contract between a binlog client and its consumer
// ABOUTME: Returning an error from any callback asks the client to stop

use anyhow::Result;
use std::future::Future;

use crate::notification::{Notification, RowsNotification};
use crate::position::Position;

/// Receives notifications from a binlog client, in stream order.
///
/// Callbacks may suspend (for example on a full queue); the client must not
/// deliver the next notification until the previous callback returned.
pub trait EventHandler: Send {
    /// The server rotated to a new binlog file; `next` is the first position in it.
    fn on_rotate(&mut self, next: &Position) -> impl Future<Output = Result<()>> + Send;

    /// A DDL statement completed; `next` is the position after it.
    fn on_ddl(&mut self, next: &Position, query: &str) -> impl Future<Output = Result<()>> + Send;

    /// A transaction committed; `next` is the position after the commit.
    fn on_xid(&mut self, next: &Position) -> impl Future<Output = Result<()>> + Send;

    /// Row images for one table.
    fn on_row(&mut self, rows: &RowsNotification) -> impl Future<Output = Result<()>> + Send;

    /// Table metadata was invalidated.
    fn on_table_changed(
        &mut self,
        _schema: &str,
        _table: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// Route a notification to the matching callback.
pub async fn dispatch<H: EventHandler>(handler: &mut H, notification: &Notification) -> Result<()> {
    match notification {
        Notification::Rotate { position } => handler.on_rotate(position).await,
        Notification::Ddl { position, query } => handler.on_ddl(position, query).await,
        Notification::Xid { position } => handler.on_xid(position).await,
        Notification::Rows(rows) => handler.on_row(rows).await,
        Notification::TableChanged { schema, table } => {
            handler.on_table_changed(schema, table).await
        }
    }
}
