// ABOUTME: Row codec - renders binlog column values as canonical strings
// ABOUTME: Unsupported types (NULL, binary) degrade to an empty string

use binlog_source::ColumnValue;

/// Render a column value in its canonical string form.
///
/// Integers use decimal form, floats the shortest representation that
/// round-trips (never exponent notation), booleans `true`/`false`, strings
/// unchanged. Anything else becomes `""`; this is deliberate and not an error.
pub fn encode(value: &ColumnValue) -> String {
    match value {
        ColumnValue::I8(v) => v.to_string(),
        ColumnValue::I16(v) => v.to_string(),
        ColumnValue::I32(v) => v.to_string(),
        ColumnValue::I64(v) => v.to_string(),
        ColumnValue::U8(v) => v.to_string(),
        ColumnValue::U16(v) => v.to_string(),
        ColumnValue::U32(v) => v.to_string(),
        ColumnValue::U64(v) => v.to_string(),
        // Formatted at 64-bit precision
        ColumnValue::F32(v) => f64::from(*v).to_string(),
        ColumnValue::F64(v) => v.to_string(),
        ColumnValue::Bool(v) => v.to_string(),
        ColumnValue::String(v) => v.clone(),
        ColumnValue::Null | ColumnValue::Bytes(_) => String::new(),
    }
}
