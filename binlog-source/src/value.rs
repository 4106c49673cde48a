// ABOUTME: Raw column values as delivered by the binlog client
// ABOUTME: Keeps integer width so the row codec sees what the source stored

use serde::{Deserialize, Deserializer, Serialize};

/// A single column value from a row image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// Shape of a column value inside a JSON feed line. JSON has no integer
/// widths, so feed values land on the widest variant of their class.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeedValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl From<FeedValue> for ColumnValue {
    fn from(value: FeedValue) -> Self {
        match value {
            FeedValue::Null => ColumnValue::Null,
            FeedValue::Bool(v) => ColumnValue::Bool(v),
            FeedValue::I64(v) => ColumnValue::I64(v),
            FeedValue::U64(v) => ColumnValue::U64(v),
            FeedValue::F64(v) => ColumnValue::F64(v),
            FeedValue::String(v) => ColumnValue::String(v),
            FeedValue::Bytes(v) => ColumnValue::Bytes(v),
        }
    }
}

impl<'de> Deserialize<'de> for ColumnValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        FeedValue::deserialize(deserializer).map(ColumnValue::from)
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::String(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::String(value)
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        ColumnValue::I64(value)
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        ColumnValue::Bool(value)
    }
}
