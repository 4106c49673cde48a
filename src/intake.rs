// ABOUTME: Event intake - turns binlog notifications into queue messages for the sync loop
// ABOUTME: Drops deletes and untracked tables; a full queue pauses the binlog client

use anyhow::{anyhow, bail, Context, Result};
use binlog_source::{EventHandler, Position, RowAction, RowsNotification};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use crate::codec;
use crate::event::{Action, ChangeEvent, PositionMarker, SyncMessage};
use crate::filters::SourceFilter;
use crate::shutdown::Shutdown;

/// Bounded queue between the intake and the sync loop.
pub fn queue(capacity: usize) -> (mpsc::Sender<SyncMessage>, mpsc::Receiver<SyncMessage>) {
    mpsc::channel(capacity.max(1))
}

/// Binlog event handler feeding the sync loop.
pub struct Intake {
    tx: mpsc::Sender<SyncMessage>,
    filter: SourceFilter,
    shutdown: Shutdown,
}

impl Intake {
    pub fn new(tx: mpsc::Sender<SyncMessage>, filter: SourceFilter, shutdown: Shutdown) -> Self {
        Self {
            tx,
            filter,
            shutdown,
        }
    }

    /// Send one message, waiting for queue space. Fails once shutdown has
    /// been requested so the binlog client stops delivering notifications.
    async fn enqueue(&self, message: SyncMessage) -> Result<()> {
        tokio::select! {
            biased;

            _ = self.shutdown.wait() => {
                bail!("Shutdown requested, event intake stopped");
            }
            sent = self.tx.send(message) => {
                sent.map_err(|_| anyhow!("Sync loop is no longer receiving events"))?;
            }
        }

        if self.shutdown.is_triggered() {
            bail!("Shutdown requested, event intake stopped");
        }
        Ok(())
    }

    async fn mark(&self, position: &Position, force_checkpoint: bool) -> Result<()> {
        self.enqueue(SyncMessage::Position(PositionMarker {
            position: position.clone(),
            force_checkpoint,
        }))
        .await
    }
}

impl EventHandler for Intake {
    async fn on_rotate(&mut self, next: &Position) -> Result<()> {
        tracing::debug!("Binlog rotated to {}", next);
        self.mark(next, true).await
    }

    async fn on_ddl(&mut self, next: &Position, query: &str) -> Result<()> {
        tracing::debug!("Schema change at {}: {}", next, query);
        self.mark(next, true).await
    }

    async fn on_xid(&mut self, next: &Position) -> Result<()> {
        self.mark(next, false).await
    }

    async fn on_row(&mut self, rows: &RowsNotification) -> Result<()> {
        let action = match rows.action {
            RowAction::Insert => Action::Insert,
            RowAction::Update => Action::Update,
            RowAction::Delete => return Ok(()),
        };
        if !self.filter.allows(&rows.schema, &rows.table) {
            return Ok(());
        }

        for image in rows.post_images()? {
            if image.len() != rows.columns.len() {
                bail!(
                    "{} on {} has {} values for {} columns",
                    action.as_str(),
                    rows.qualified_name(),
                    image.len(),
                    rows.columns.len()
                );
            }

            let body: BTreeMap<String, String> = rows
                .columns
                .iter()
                .zip(image)
                .map(|(column, value)| (column.clone(), codec::encode(value)))
                .collect();
            let event = ChangeEvent {
                schema: rows.schema.clone(),
                table: rows.table.clone(),
                action,
                body,
            };
            let data = event
                .encode()
                .with_context(|| format!("Failed to queue change for {}", rows.qualified_name()))?;
            self.enqueue(SyncMessage::Change(data)).await?;
        }
        Ok(())
    }

    async fn on_table_changed(&mut self, schema: &str, table: &str) -> Result<()> {
        tracing::debug!("Table metadata changed for {}.{}", schema, table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceTables;
    use binlog_source::ColumnValue;

    fn intake(capacity: usize) -> (Intake, mpsc::Receiver<SyncMessage>, Shutdown) {
        let (tx, rx) = queue(capacity);
        let filter = SourceFilter::new(&[SourceTables {
            schema: "shop".to_string(),
            tables: vec!["items".to_string()],
        }])
        .unwrap();
        let shutdown = Shutdown::new();
        (Intake::new(tx, filter, shutdown.clone()), rx, shutdown)
    }

    fn insert(values: Vec<ColumnValue>) -> RowsNotification {
        RowsNotification {
            position: Position::new("mysql-bin.000001", 200),
            schema: "shop".to_string(),
            table: "items".to_string(),
            action: RowAction::Insert,
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![values],
        }
    }

    #[tokio::test]
    async fn test_insert_is_encoded() {
        let (mut intake, mut rx, _) = intake(4);
        intake
            .on_row(&insert(vec![ColumnValue::I64(7), ColumnValue::from("a")]))
            .await
            .unwrap();

        let Some(SyncMessage::Change(data)) = rx.recv().await else {
            panic!("expected a change message");
        };
        let event = ChangeEvent::decode(&data).unwrap();
        assert_eq!(event.action, Action::Insert);
        assert_eq!(event.body.get("id").map(String::as_str), Some("7"));
        assert_eq!(event.body.get("name").map(String::as_str), Some("a"));
    }

    #[tokio::test]
    async fn test_column_count_mismatch_is_fatal() {
        let (mut intake, _rx, _) = intake(4);
        let err = intake
            .on_row(&insert(vec![ColumnValue::I64(7)]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 values for 2 columns"));
    }

    #[tokio::test]
    async fn test_enqueue_fails_after_shutdown() {
        let (mut intake, _rx, shutdown) = intake(4);
        shutdown.trigger();
        assert!(intake
            .on_xid(&Position::new("mysql-bin.000001", 300))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_full_queue_released_by_shutdown() {
        let (mut intake, _rx, shutdown) = intake(1);
        intake
            .on_xid(&Position::new("mysql-bin.000001", 300))
            .await
            .unwrap();

        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            stopper.trigger();
        });

        // Queue is full and nobody is receiving; only shutdown unblocks it
        assert!(intake
            .on_xid(&Position::new("mysql-bin.000001", 400))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_closed_queue_is_an_error() {
        let (mut intake, rx, _) = intake(4);
        drop(rx);
        assert!(intake
            .on_rotate(&Position::new("mysql-bin.000002", 4))
            .await
            .is_err());
    }
}
