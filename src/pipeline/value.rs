// ABOUTME: Typed row representation threaded through pipeline stages
// ABOUTME: FieldValue is a tagged union over null/bool/int/float/string

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::event::ChangeEvent;

/// Row fields carrying event metadata. They are visible to stages but never
/// written to the destination document. A source column with the same name
/// takes precedence and is kept in the document.
pub const META_SCHEMA: &str = "_schema";
pub const META_TABLE: &str = "_table";
pub const META_ACTION: &str = "_action";

pub const META_FIELDS: [&str; 3] = [META_SCHEMA, META_TABLE, META_ACTION];

/// A row threaded through pipeline stages.
pub type Row = BTreeMap<String, FieldValue>;

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON scalar from stage arguments. Arrays and objects are
    /// not representable and yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(FieldValue::Null),
            serde_json::Value::Bool(b) => Some(FieldValue::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(FieldValue::Int)
                .or_else(|| n.as_f64().map(FieldValue::Float)),
            serde_json::Value::String(s) => Some(FieldValue::String(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

/// Text form used for comparisons, ids and concatenation. Null renders empty.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Flatten an event into the initial pipeline row: body columns plus the
/// metadata fields the body does not already define.
pub fn flatten(event: &ChangeEvent) -> Row {
    let mut row: Row = event
        .body
        .iter()
        .map(|(k, v)| (k.clone(), FieldValue::String(v.clone())))
        .collect();
    for (field, value) in [
        (META_SCHEMA, event.schema.as_str()),
        (META_TABLE, event.table.as_str()),
        (META_ACTION, event.action.as_str()),
    ] {
        row.entry(field.to_string()).or_insert_with(|| value.into());
    }
    row
}

/// Destination document for a row of `event`: everything except the
/// metadata fields [`flatten`] injected.
pub fn document(row: &Row, event: &ChangeEvent) -> Row {
    row.iter()
        .filter(|(k, _)| !is_injected(k, event))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn is_injected(field: &str, event: &ChangeEvent) -> bool {
    META_FIELDS.contains(&field) && !event.body.contains_key(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Action;

    fn event() -> ChangeEvent {
        ChangeEvent {
            schema: "shop".to_string(),
            table: "items".to_string(),
            action: Action::Insert,
            body: BTreeMap::from([
                ("id".to_string(), "7".to_string()),
                ("name".to_string(), "a".to_string()),
            ]),
        }
    }

    #[test]
    fn test_flatten_adds_metadata() {
        let row = flatten(&event());
        assert_eq!(row.get("id"), Some(&FieldValue::from("7")));
        assert_eq!(row.get(META_SCHEMA), Some(&FieldValue::from("shop")));
        assert_eq!(row.get(META_TABLE), Some(&FieldValue::from("items")));
        assert_eq!(row.get(META_ACTION), Some(&FieldValue::from("insert")));
    }

    #[test]
    fn test_document_strips_metadata() {
        let event = event();
        let doc = document(&flatten(&event), &event);
        assert_eq!(doc.len(), 2);
        assert!(doc.keys().all(|k| !k.starts_with('_')));
    }

    #[test]
    fn test_source_column_named_like_metadata_is_kept() {
        let mut event = event();
        event
            .body
            .insert(META_ACTION.to_string(), "refund".to_string());

        let row = flatten(&event);
        assert_eq!(row.get(META_ACTION), Some(&FieldValue::from("refund")));
        assert_eq!(row.get(META_TABLE), Some(&FieldValue::from("items")));

        let doc = document(&row, &event);
        assert_eq!(doc.get(META_ACTION), Some(&FieldValue::from("refund")));
        assert!(!doc.contains_key(META_SCHEMA));
        assert!(!doc.contains_key(META_TABLE));
        assert_eq!(doc.len(), 3);
    }

    #[test]
    fn test_serializes_as_plain_json() {
        let mut row = Row::new();
        row.insert("a".into(), FieldValue::Int(1));
        row.insert("b".into(), FieldValue::Null);
        row.insert("c".into(), FieldValue::from("x"));
        row.insert("d".into(), FieldValue::Float(2.5));
        row.insert("e".into(), FieldValue::Bool(false));
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"a":1,"b":null,"c":"x","d":2.5,"e":false}"#
        );
    }

    #[test]
    fn test_from_json() {
        assert_eq!(
            FieldValue::from_json(&serde_json::json!(3)),
            Some(FieldValue::Int(3))
        );
        assert_eq!(
            FieldValue::from_json(&serde_json::json!(0.5)),
            Some(FieldValue::Float(0.5))
        );
        assert_eq!(FieldValue::from_json(&serde_json::json!([1])), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(FieldValue::Int(-3).to_string(), "-3");
        assert_eq!(FieldValue::Null.to_string(), "");
        assert_eq!(FieldValue::Bool(true).to_string(), "true");
    }
}
