use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use seedwright_generate::RecordSet;

use crate::dialect::SqlDialect;
use crate::error::{Result, SinkError};
use crate::sink::{RowCounts, SeedSink, SinkContext, SinkKind, SinkSummary};

pub const COMPLETE_MARKER: &str = "-- seedwright:complete";
pub const INCOMPLETE_MARKER: &str = "-- seedwright:incomplete";

/// Bytes read from the end of a file when looking for the completion marker.
const MARKER_WINDOW: u64 = 512;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSinkOptions {
    pub path: PathBuf,
    #[serde(default)]
    pub dialect: SqlDialect,
    /// Wrap the statements in `BEGIN;` / `COMMIT;`.
    #[serde(default = "default_transaction")]
    pub transaction: bool,
}

fn default_transaction() -> bool {
    true
}

impl FileSinkOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dialect: SqlDialect::default(),
            transaction: true,
        }
    }
}

/// Writes batches as SQL `INSERT` statements.
///
/// The file only counts as a usable seed once its last line is the
/// completion marker; see [`file_is_complete`].
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<tokio::fs::File>,
    dialect: SqlDialect,
    transaction: bool,
    counts: RowCounts,
    closed: bool,
}

impl FileSink {
    pub async fn create(options: &FileSinkOptions, context: &SinkContext) -> Result<Self> {
        if let Some(parent) = options.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = tokio::fs::File::create(&options.path).await?;
        let mut writer = BufWriter::new(file);

        let mut header = format!(
            "-- seedwright seed file\n-- schema: {}\n-- seed: {}\n-- dialect: {}\n",
            single_line(&context.schema),
            context.seed,
            options.dialect
        );
        if options.transaction {
            header.push_str(options.dialect.begin());
            header.push('\n');
        }
        writer.write_all(header.as_bytes()).await?;
        writer.flush().await?;

        info!(path = %options.path.display(), dialect = %options.dialect, "file sink opened");
        Ok(Self {
            path: options.path.clone(),
            writer,
            dialect: options.dialect,
            transaction: options.transaction,
            counts: RowCounts::default(),
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line and flush it to the file.
    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    fn ensure_open(&self, table: &str) -> Result<()> {
        if self.closed {
            return Err(SinkError::Write {
                table: table.to_string(),
                message: "file sink is already closed".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SeedSink for FileSink {
    fn kind(&self) -> SinkKind {
        SinkKind::File
    }

    async fn write(&mut self, table: &str, records: &RecordSet) -> Result<u64> {
        self.ensure_open(table)?;
        if records.is_empty() {
            return Ok(0);
        }
        let statement = self
            .dialect
            .insert_statement(table, records.columns(), records.records());
        self.write_line(&statement).await?;

        let rows = records.len() as u64;
        self.counts.add(table, rows);
        debug!(table = %table, rows, "batch written to file");
        Ok(rows)
    }

    async fn finalize(&mut self) -> Result<SinkSummary> {
        self.ensure_open("")?;
        if self.transaction {
            self.write_line("COMMIT;").await?;
        }
        let marker = format!("{COMPLETE_MARKER} rows={}", self.counts.total());
        self.write_line(&marker).await?;
        self.writer.get_ref().sync_all().await?;
        self.closed = true;

        info!(
            path = %self.path.display(),
            rows = self.counts.total(),
            "file sink finalized"
        );
        Ok(self
            .counts
            .summary(SinkKind::File, Some(self.path.display().to_string())))
    }

    async fn abort(&mut self, reason: &str) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.transaction {
            self.write_line("ROLLBACK;").await?;
        }
        let marker = format!("{INCOMPLETE_MARKER} {}", single_line(reason));
        self.write_line(&marker).await?;
        warn!(path = %self.path.display(), reason = %reason, "file sink aborted");
        Ok(())
    }
}

/// Whether the seed file at `path` ends with the completion marker.
pub fn file_is_complete(path: impl AsRef<Path>) -> std::io::Result<bool> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(MARKER_WINDOW)))?;
    let mut tail = Vec::new();
    file.read_to_end(&mut tail)?;
    let tail = String::from_utf8_lossy(&tail);
    Ok(tail
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| line.starts_with(COMPLETE_MARKER)))
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
