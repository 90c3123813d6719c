//! Output sinks for Seedwright: SQL files, live MySQL/PostgreSQL
//! connections and dry runs.

pub mod config;
pub mod connection;
pub mod dialect;
pub mod dry_run;
pub mod error;
pub mod file;
pub mod sink;

pub use config::{open_sink, redact_url, SinkConfig};
pub use connection::{
    connect_with_retry, ConnectionOptions, ConnectionSink, MySqlBackend, PgBackend,
    TransactionalBackend,
};
pub use dialect::SqlDialect;
pub use dry_run::DryRunSink;
pub use error::{Result, SinkError};
pub use file::{file_is_complete, FileSink, FileSinkOptions, COMPLETE_MARKER, INCOMPLETE_MARKER};
pub use sink::{RowCounts, SeedSink, SinkContext, SinkKind, SinkSummary};
