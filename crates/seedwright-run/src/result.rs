use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use seedwright_sink::SinkKind;

use crate::error::{ErrorKind, SeedError};
use crate::state::RunState;

/// Per-table outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRun {
    pub table: String,
    pub rows_requested: u64,
    /// Rows the sink acknowledged. After a failed connection run these were
    /// rolled back.
    pub rows_written: u64,
    pub retries: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunErrorRecord {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub message: String,
}

impl From<&SeedError> for RunErrorRecord {
    fn from(error: &SeedError) -> Self {
        Self {
            kind: error.kind(),
            table: error.table().map(str::to_string),
            message: error.to_string(),
        }
    }
}

/// Record of one seeding run, returned on success and on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRun {
    pub run_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub seed: u64,
    /// The seed was drawn at random because none was configured.
    pub seed_generated: bool,
    pub sink: SinkKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub dry_run: bool,
    pub state: RunState,
    pub transitions: Vec<RunState>,
    pub tables: Vec<TableRun>,
    /// RFC 3339 start time.
    pub started_at: String,
    pub elapsed_ms: u64,
    pub errors: Vec<RunErrorRecord>,
}

impl SeedRun {
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    pub fn table(&self, name: &str) -> Option<&TableRun> {
        self.tables.iter().find(|table| table.table == name)
    }

    pub fn rows_written(&self) -> u64 {
        self.tables.iter().map(|table| table.rows_written).sum()
    }
}

/// A failed run together with the error that ended it.
#[derive(Debug, Error)]
#[error("seeding run {} failed: {error}", .run.run_id)]
pub struct RunFailure {
    pub run: SeedRun,
    #[source]
    pub error: SeedError,
}
