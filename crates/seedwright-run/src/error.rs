use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use seedwright_core::{CyclicDependencyError, SchemaError};
use seedwright_generate::GenerationError;
use seedwright_sink::SinkError;

use crate::state::RunState;

/// Any failure that ends a seeding run.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Cycle(#[from] CyclicDependencyError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("illegal run state transition {from} -> {to}")]
    InvalidTransition { from: RunState, to: RunState },
    #[error("internal error: {0}")]
    Internal(String),
}

impl SeedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema(_) => ErrorKind::InvalidSchema,
            Self::Cycle(_) => ErrorKind::CyclicDependency,
            Self::Generation(error) => match error {
                GenerationError::ConstraintUnsatisfiable { .. } => {
                    ErrorKind::ConstraintUnsatisfiable
                }
                GenerationError::EmptyParentSet { .. } => ErrorKind::EmptyParentSet,
                GenerationError::ExhaustedSequence { .. } => ErrorKind::ExhaustedSequence,
                GenerationError::Generator { .. } => ErrorKind::Generation,
                GenerationError::ParentUnavailable { .. } => ErrorKind::ParentUnavailable,
                GenerationError::Cancelled { .. } => ErrorKind::Cancelled,
            },
            Self::Sink(error) => match error {
                SinkError::Connect { .. } => ErrorKind::Connect,
                SinkError::Write { .. } => ErrorKind::Write,
                SinkError::Io(_) => ErrorKind::Io,
                SinkError::Database(_) => ErrorKind::Database,
                SinkError::Config(_) => ErrorKind::Config,
            },
            Self::Config(_) => ErrorKind::Config,
            Self::InvalidTransition { .. } | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Table the error is attributed to, when there is one.
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Generation(error) => Some(error.table()),
            Self::Sink(SinkError::Write { table, .. }) if !table.is_empty() => Some(table),
            _ => None,
        }
    }

    /// Errors that only follow from another failure or a stop request.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Self::Generation(error) if error.is_secondary())
    }
}

/// Stable names for error causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidSchema,
    CyclicDependency,
    ConstraintUnsatisfiable,
    EmptyParentSet,
    ExhaustedSequence,
    Generation,
    ParentUnavailable,
    Cancelled,
    Connect,
    Write,
    Io,
    Database,
    Config,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidSchema => "invalid_schema",
            Self::CyclicDependency => "cyclic_dependency",
            Self::ConstraintUnsatisfiable => "constraint_unsatisfiable",
            Self::EmptyParentSet => "empty_parent_set",
            Self::ExhaustedSequence => "exhausted_sequence",
            Self::Generation => "generation",
            Self::ParentUnavailable => "parent_unavailable",
            Self::Cancelled => "cancelled",
            Self::Connect => "connect",
            Self::Write => "write",
            Self::Io => "io",
            Self::Database => "database",
            Self::Config => "config",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
