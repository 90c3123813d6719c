use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use seedwright_core::TableDefinition;

use crate::record::RecordSet;

/// Options for the generation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// Maximum attempts to build a single row.
    pub max_attempts_row: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_attempts_row: 50,
        }
    }
}

/// Requested row counts: per-table override, else the table's own `rows`,
/// else the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowTargets {
    pub default_rows: u64,
    #[serde(default)]
    pub overrides: BTreeMap<String, u64>,
}

impl RowTargets {
    pub fn new(default_rows: u64) -> Self {
        Self {
            default_rows,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, table: impl Into<String>, rows: u64) -> Self {
        self.overrides.insert(table.into(), rows);
        self
    }

    pub fn rows_for(&self, table: &TableDefinition) -> u64 {
        self.overrides
            .get(&table.name)
            .copied()
            .or(table.rows)
            .unwrap_or(self.default_rows)
    }
}

/// Summary of a generated table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    pub rows_requested: u64,
    pub rows_generated: u64,
    pub retries: u64,
    pub duration_ms: u64,
}

/// Report for a generation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub seed: u64,
    pub tables: Vec<TableReport>,
    pub retries_total: u64,
    pub duration_ms: u64,
}

impl GenerationReport {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            tables: Vec::new(),
            retries_total: 0,
            duration_ms: 0,
        }
    }

    pub fn record_table(&mut self, table: TableReport) {
        self.retries_total += table.retries;
        self.tables.push(table);
    }

    pub fn rows_total(&self) -> u64 {
        self.tables.iter().map(|table| table.rows_generated).sum()
    }
}

/// Every table of a schema, fully materialised in resolution order.
#[derive(Debug, Clone)]
pub struct GeneratedDataset {
    pub tables: Vec<RecordSet>,
    pub report: GenerationReport,
}

impl GeneratedDataset {
    pub fn table(&self, name: &str) -> Option<&RecordSet> {
        self.tables.iter().find(|set| set.table() == name)
    }
}
