//! Database sink: batched multi-row inserts inside a transaction.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::query_builder::Separated;
use sqlx::{MySql, MySqlPool, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info, warn};

use seedwright_generate::{GeneratedRecord, GeneratedValue, RecordSet};

use crate::config::redact_url;
use crate::dialect::SqlDialect;
use crate::error::{Result, SinkError};
use crate::sink::{RowCounts, SeedSink, SinkKind, SinkSummary};

/// Upper bound on bind parameters per statement (PostgreSQL's wire limit).
const MAX_BIND_PARAMS: usize = 65_535;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub url: String,
    /// Rows per `INSERT` statement.
    pub batch_size: usize,
    /// Total connection attempts before giving up.
    pub connect_retries: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub backoff_ms: u64,
    /// Commit once at the end instead of after every batch.
    pub single_transaction: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            batch_size: 500,
            connect_retries: 3,
            backoff_ms: 500,
            single_transaction: true,
        }
    }
}

impl ConnectionOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Transaction primitives a [`ConnectionSink`] drives.
#[async_trait]
pub trait TransactionalBackend: Send {
    async fn begin(&mut self) -> Result<()>;

    /// Insert `records` as one statement inside the open transaction.
    async fn insert(
        &mut self,
        table: &str,
        columns: &[String],
        records: &[GeneratedRecord],
    ) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// Seeds a live database through a [`TransactionalBackend`].
///
/// A failed batch is never retried: the open transaction is rolled back and
/// the write error is returned.
pub struct ConnectionSink<B> {
    backend: B,
    target: String,
    batch_size: usize,
    single_transaction: bool,
    in_transaction: bool,
    failed: bool,
    counts: RowCounts,
    pending: RowCounts,
}

impl<B: TransactionalBackend> ConnectionSink<B> {
    pub fn new(backend: B, target: impl Into<String>, options: &ConnectionOptions) -> Self {
        Self {
            backend,
            target: target.into(),
            batch_size: options.batch_size.max(1),
            single_transaction: options.single_transaction,
            in_transaction: false,
            failed: false,
            counts: RowCounts::default(),
            pending: RowCounts::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn ensure_transaction(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.backend.begin().await?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.backend.commit().await?;
            self.in_transaction = false;
        }
        for (table, rows) in std::mem::take(&mut self.pending).into_tables() {
            self.counts.add(&table, rows);
        }
        Ok(())
    }

    async fn fail(&mut self, table: &str, error: SinkError) -> SinkError {
        self.failed = true;
        if self.in_transaction {
            self.in_transaction = false;
            if let Err(rollback) = self.backend.rollback().await {
                warn!(table = %table, error = %rollback, "rollback failed");
            }
        }
        self.pending = RowCounts::default();
        match error {
            SinkError::Write { .. } => error,
            other => SinkError::Write {
                table: table.to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl<B: TransactionalBackend> SeedSink for ConnectionSink<B> {
    fn kind(&self) -> SinkKind {
        SinkKind::Connection
    }

    async fn write(&mut self, table: &str, records: &RecordSet) -> Result<u64> {
        if self.failed {
            return Err(SinkError::Write {
                table: table.to_string(),
                message: "an earlier write failed and the transaction was rolled back".to_string(),
            });
        }
        if records.is_empty() {
            return Ok(0);
        }
        if let Err(err) = self.ensure_transaction().await {
            return Err(self.fail(table, err).await);
        }

        let per_statement = self
            .batch_size
            .min(MAX_BIND_PARAMS / records.columns().len().max(1))
            .max(1);
        let mut written = 0u64;
        for chunk in records.records().chunks(per_statement) {
            match self.backend.insert(table, records.columns(), chunk).await {
                Ok(rows) => written += rows,
                Err(err) => return Err(self.fail(table, err).await),
            }
        }
        self.pending.add(table, written);

        if !self.single_transaction {
            if let Err(err) = self.commit().await {
                return Err(self.fail(table, err).await);
            }
        }
        debug!(table = %table, rows = written, "batch inserted");
        Ok(written)
    }

    async fn finalize(&mut self) -> Result<SinkSummary> {
        if self.failed {
            return Err(SinkError::Write {
                table: String::new(),
                message: "cannot commit after a failed write".to_string(),
            });
        }
        self.commit().await?;
        info!(
            destination = %self.target,
            rows = self.counts.total(),
            "connection sink committed"
        );
        Ok(self
            .counts
            .summary(SinkKind::Connection, Some(self.target.clone())))
    }

    async fn abort(&mut self, reason: &str) -> Result<()> {
        self.failed = true;
        self.pending = RowCounts::default();
        if self.in_transaction {
            self.in_transaction = false;
            self.backend.rollback().await?;
        }
        warn!(destination = %self.target, reason = %reason, "connection sink rolled back");
        Ok(())
    }
}

/// Retry `connect` with exponential backoff.
pub async fn connect_with_retry<T, F, Fut>(
    target: &str,
    attempts: u32,
    backoff: Duration,
    mut connect: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let attempts = attempts.max(1);
    let mut delay = backoff;
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match connect().await {
            Ok(connection) => {
                if attempt > 1 {
                    info!(destination = %target, attempt, "connected after retry");
                }
                return Ok(connection);
            }
            Err(err) => {
                last_error = err.to_string();
                if attempt < attempts {
                    warn!(
                        destination = %target,
                        attempt,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %last_error,
                        "connection failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }
    }
    Err(SinkError::Connect {
        target: target.to_string(),
        attempts,
        message: last_error,
    })
}

/// Open a connection sink for the database named by `options.url`.
pub async fn open_connection_sink(options: &ConnectionOptions) -> Result<Box<dyn SeedSink>> {
    let dialect = SqlDialect::from_url(&options.url).ok_or_else(|| {
        SinkError::Config(format!(
            "unsupported connection url scheme: {}",
            redact_url(&options.url)
        ))
    })?;
    let target = redact_url(&options.url);
    let backoff = Duration::from_millis(options.backoff_ms);
    info!(destination = %target, dialect = %dialect, "connecting");

    let sink: Box<dyn SeedSink> = match dialect {
        SqlDialect::Postgres => {
            let pool = connect_with_retry(&target, options.connect_retries, backoff, || {
                PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(Duration::from_secs(10))
                    .connect(&options.url)
            })
            .await?;
            Box::new(ConnectionSink::new(PgBackend::new(pool), target, options))
        }
        SqlDialect::Mysql => {
            let pool = connect_with_retry(&target, options.connect_retries, backoff, || {
                MySqlPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(Duration::from_secs(10))
                    .connect(&options.url)
            })
            .await?;
            Box::new(ConnectionSink::new(MySqlBackend::new(pool), target, options))
        }
    };
    Ok(sink)
}

fn no_transaction(table: &str) -> SinkError {
    SinkError::Write {
        table: table.to_string(),
        message: "no open transaction".to_string(),
    }
}

fn insert_prefix(dialect: SqlDialect, table: &str, columns: &[String]) -> String {
    let columns = columns
        .iter()
        .map(|column| dialect.quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {} ({columns}) ", dialect.quote_ident(table))
}

/// PostgreSQL backend over a single-connection pool.
pub struct PgBackend {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }
}

fn push_pg_value(separated: &mut Separated<'_, '_, Postgres, &'static str>, value: &GeneratedValue) {
    match value {
        GeneratedValue::Null => {
            separated.push("NULL");
        }
        GeneratedValue::Bool(flag) => {
            separated.push_bind(*flag);
        }
        GeneratedValue::Int(number) => {
            separated.push_bind(*number);
        }
        GeneratedValue::Decimal(number) => {
            separated.push_bind(*number);
        }
        GeneratedValue::Text(text) => {
            separated.push_bind(text.clone());
        }
        GeneratedValue::Date(date) => {
            separated.push_bind(*date);
        }
        GeneratedValue::Timestamp(timestamp) => {
            separated.push_bind(*timestamp);
        }
    }
}

/// Multi-row `INSERT` with every non-null value bound as a parameter.
fn pg_insert_query(
    table: &str,
    columns: &[String],
    records: &[GeneratedRecord],
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(insert_prefix(SqlDialect::Postgres, table, columns));
    builder.push_values(records, |mut separated, record| {
        for value in &record.values {
            push_pg_value(&mut separated, value);
        }
    });
    builder
}

#[async_trait]
impl TransactionalBackend for PgBackend {
    async fn begin(&mut self) -> Result<()> {
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn insert(
        &mut self,
        table: &str,
        columns: &[String],
        records: &[GeneratedRecord],
    ) -> Result<u64> {
        let tx = self.tx.as_mut().ok_or_else(|| no_transaction(table))?;
        let mut builder = pg_insert_query(table, columns, records);
        let result = builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(|err| SinkError::Write {
                table: table.to_string(),
                message: err.to_string(),
            })?;
        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

/// MySQL backend over a single-connection pool.
pub struct MySqlBackend {
    pool: MySqlPool,
    tx: Option<Transaction<'static, MySql>>,
}

impl MySqlBackend {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool, tx: None }
    }
}

fn push_mysql_value(separated: &mut Separated<'_, '_, MySql, &'static str>, value: &GeneratedValue) {
    match value {
        GeneratedValue::Null => {
            separated.push("NULL");
        }
        GeneratedValue::Bool(flag) => {
            separated.push_bind(*flag);
        }
        GeneratedValue::Int(number) => {
            separated.push_bind(*number);
        }
        GeneratedValue::Decimal(number) => {
            separated.push_bind(*number);
        }
        GeneratedValue::Text(text) => {
            separated.push_bind(text.clone());
        }
        GeneratedValue::Date(date) => {
            separated.push_bind(*date);
        }
        GeneratedValue::Timestamp(timestamp) => {
            separated.push_bind(*timestamp);
        }
    }
}

/// Multi-row `INSERT` with every non-null value bound as a parameter.
fn mysql_insert_query(
    table: &str,
    columns: &[String],
    records: &[GeneratedRecord],
) -> QueryBuilder<'static, MySql> {
    let mut builder = QueryBuilder::new(insert_prefix(SqlDialect::Mysql, table, columns));
    builder.push_values(records, |mut separated, record| {
        for value in &record.values {
            push_mysql_value(&mut separated, value);
        }
    });
    builder
}

#[async_trait]
impl TransactionalBackend for MySqlBackend {
    async fn begin(&mut self) -> Result<()> {
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn insert(
        &mut self,
        table: &str,
        columns: &[String],
        records: &[GeneratedRecord],
    ) -> Result<u64> {
        let tx = self.tx.as_mut().ok_or_else(|| no_transaction(table))?;
        let mut builder = mysql_insert_query(table, columns, records);
        let result = builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(|err| SinkError::Write {
                table: table.to_string(),
                message: err.to_string(),
            })?;
        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
