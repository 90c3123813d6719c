use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use seedwright_generate::RecordSet;

use crate::error::Result;

/// Destination family of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    File,
    Connection,
    DryRun,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Connection => "connection",
            Self::DryRun => "dry_run",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a sink reports once everything it accepted is durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkSummary {
    pub kind: SinkKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub rows_written: u64,
    pub tables: BTreeMap<String, u64>,
}

/// Run facts a sink may record alongside the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkContext {
    pub schema: String,
    pub seed: u64,
}

/// Destination for generated record batches.
///
/// Batches arrive in resolution order, so a parent's rows are always written
/// before any child row referencing them. Nothing written is considered
/// durable until `finalize` succeeds; `abort` discards or marks whatever
/// the sink accepted so far.
#[async_trait]
pub trait SeedSink: Send {
    fn kind(&self) -> SinkKind;

    /// Write one batch of `table`, returning the number of rows accepted.
    async fn write(&mut self, table: &str, records: &RecordSet) -> Result<u64>;

    async fn finalize(&mut self) -> Result<SinkSummary>;

    async fn abort(&mut self, reason: &str) -> Result<()>;
}

/// Per-table row counters shared by the sinks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowCounts {
    tables: BTreeMap<String, u64>,
}

impl RowCounts {
    pub fn add(&mut self, table: &str, rows: u64) {
        *self.tables.entry(table.to_string()).or_default() += rows;
    }

    pub fn get(&self, table: &str) -> u64 {
        self.tables.get(table).copied().unwrap_or_default()
    }

    pub fn total(&self) -> u64 {
        self.tables.values().sum()
    }

    pub fn into_tables(self) -> BTreeMap<String, u64> {
        self.tables
    }

    pub fn summary(&self, kind: SinkKind, destination: Option<String>) -> SinkSummary {
        SinkSummary {
            kind,
            destination,
            rows_written: self.total(),
            tables: self.tables.clone(),
        }
    }
}
