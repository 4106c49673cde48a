// ABOUTME: Messages carried from the event intake to the sync loop
// ABOUTME: ChangeEvent rows travel as JSON bytes, position markers travel as-is

use anyhow::{Context, Result};
use binlog_source::Position;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Row actions that reach the pipeline. Deletes are dropped at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Insert,
    Update,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Insert => "insert",
            Action::Update => "update",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "insert" => Some(Action::Insert),
            "update" => Some(Action::Update),
            _ => None,
        }
    }
}

/// A single post-image row change for a tracked table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub schema: String,
    pub table: String,
    pub action: Action,
    /// Column name to canonical string value, ordered by column name so the
    /// queued encoding is deterministic
    pub body: BTreeMap<String, String>,
}

impl ChangeEvent {
    /// Key used to select pipeline configurations: `schema_table_action`.
    pub fn routing_key(&self) -> String {
        routing_key(&self.schema, &self.table, self.action)
    }

    /// Serialize for the intake queue.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to serialize change event")
    }

    /// Decode an event produced by [`ChangeEvent::encode`].
    pub fn decode(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).context("Failed to decode change event")
    }
}

pub fn routing_key(schema: &str, table: &str, action: Action) -> String {
    format!("{}_{}_{}", schema, table, action.as_str())
}

/// A point in the stream that is safe to resume from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionMarker {
    pub position: Position,
    /// Boundary and DDL markers must be persisted immediately
    pub force_checkpoint: bool,
}

/// Everything the sync loop consumes, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    Position(PositionMarker),
    Change(Vec<u8>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ChangeEvent {
        ChangeEvent {
            schema: "shop".to_string(),
            table: "items".to_string(),
            action: Action::Update,
            body: BTreeMap::from([
                ("id".to_string(), "7".to_string()),
                ("name".to_string(), "a".to_string()),
            ]),
        }
    }

    #[test]
    fn test_routing_key() {
        assert_eq!(event().routing_key(), "shop_items_update");
    }

    #[test]
    fn test_decode_encoded_event() {
        let original = event();
        let decoded = ChangeEvent::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_encoded_body_is_ordered_by_column_name() {
        let mut event = event();
        event.body = BTreeMap::from([
            ("name".to_string(), "a".to_string()),
            ("id".to_string(), "7".to_string()),
            ("created".to_string(), "2026-01-02".to_string()),
        ]);

        let encoded = String::from_utf8(event.encode().unwrap()).unwrap();
        assert!(encoded.contains(r#""body":{"created":"2026-01-02","id":"7","name":"a"}"#));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ChangeEvent::decode(b"{not json").is_err());
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(Action::parse("insert"), Some(Action::Insert));
        assert_eq!(Action::parse("update"), Some(Action::Update));
        assert_eq!(Action::parse("delete"), None);
    }
}
