use thiserror::Error;

/// Errors raised by output sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The database could not be reached, even after retrying.
    #[error("failed to connect to {target} after {attempts} attempt(s): {message}")]
    Connect {
        target: String,
        attempts: u32,
        message: String,
    },
    /// A batch was rejected; any open transaction has been rolled back.
    #[error("write to '{table}' failed: {message}")]
    Write { table: String, message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("sink configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SinkError>;
