// ABOUTME: Source table filter for the binlog stream
// ABOUTME: Only changes to configured schema.table pairs reach the pipeline

use anyhow::{bail, Result};
use std::collections::HashSet;

use crate::config::SourceTables;

/// Set of qualified table names whose changes are tracked.
///
/// Built once at startup; lookups are a single hash probe.
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    tables: HashSet<String>,
}

impl SourceFilter {
    /// Creates a filter from the `[[source]]` entries of the configuration.
    pub fn new(sources: &[SourceTables]) -> Result<Self> {
        let mut tables = HashSet::new();
        for source in sources {
            if source.schema.trim().is_empty() {
                bail!("Source schema name cannot be empty");
            }
            for table in &source.tables {
                if table.trim().is_empty() {
                    bail!("Table name in schema '{}' cannot be empty", source.schema);
                }
                tables.insert(qualified_name(&source.schema, table));
            }
        }

        Ok(Self { tables })
    }

    /// Checks if changes to `schema.table` should be replicated
    pub fn allows(&self, schema: &str, table: &str) -> bool {
        self.tables.contains(&qualified_name(schema, table))
    }

    /// Tracked tables in "schema.table" format, sorted
    pub fn tracked_tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self.tables.iter().map(|s| s.as_str()).collect();
        tables.sort_unstable();
        tables
    }
}

fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table)
}
