// ABOUTME: Binlog stream position (file name + byte offset)
// ABOUTME: Positions order by file name first, then offset within the file

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A point in the binlog stream that is safe to resume from.
///
/// File names order by their numeric extension when both have one, so
/// `mysql-bin.999999` sorts before `mysql-bin.1000000`. Other names compare
/// lexically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Binlog file name
    pub name: String,
    /// Byte offset of the next event inside `name`
    pub pos: u32,
}

impl Position {
    pub fn new(name: impl Into<String>, pos: u32) -> Self {
        Self {
            name: name.into(),
            pos,
        }
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_names(&self.name, &other.name).then_with(|| self.pos.cmp(&other.pos))
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    match (split_sequence(a), split_sequence(b)) {
        (Some((base_a, seq_a)), Some((base_b, seq_b))) if base_a == base_b => seq_a
            .cmp(&seq_b)
            .then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

/// `mysql-bin.000042` -> (`mysql-bin`, 42)
fn split_sequence(name: &str) -> Option<(&str, u64)> {
    let (base, sequence) = name.rsplit_once('.')?;
    if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((base, sequence.parse().ok()?))
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.pos)
    }
}
