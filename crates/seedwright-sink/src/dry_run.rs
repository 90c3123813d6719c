use async_trait::async_trait;
use tracing::{debug, info};

use seedwright_generate::RecordSet;

use crate::error::Result;
use crate::sink::{RowCounts, SeedSink, SinkKind, SinkSummary};

/// Counts rows per table and writes nothing.
#[derive(Debug, Default)]
pub struct DryRunSink {
    counts: RowCounts,
}

impl DryRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, table: &str) -> u64 {
        self.counts.get(table)
    }
}

#[async_trait]
impl SeedSink for DryRunSink {
    fn kind(&self) -> SinkKind {
        SinkKind::DryRun
    }

    async fn write(&mut self, table: &str, records: &RecordSet) -> Result<u64> {
        let rows = records.len() as u64;
        self.counts.add(table, rows);
        debug!(table = %table, rows, "dry run batch counted");
        Ok(rows)
    }

    async fn finalize(&mut self) -> Result<SinkSummary> {
        info!(rows = self.counts.total(), "dry run finished");
        Ok(self.counts.summary(SinkKind::DryRun, None))
    }

    async fn abort(&mut self, _reason: &str) -> Result<()> {
        Ok(())
    }
}
