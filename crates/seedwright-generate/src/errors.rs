use thiserror::Error;

/// Errors emitted by the generation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The schema cannot produce the requested rows for a column.
    #[error("constraint unsatisfiable for '{table}.{column}': {reason}")]
    ConstraintUnsatisfiable {
        table: String,
        column: String,
        reason: String,
    },
    #[error("'{table}.{column}' references '{parent}', which has no rows")]
    EmptyParentSet {
        table: String,
        column: String,
        parent: String,
    },
    #[error("unique sequence for '{table}.{column}' is exhausted after {domain} values")]
    ExhaustedSequence {
        table: String,
        column: String,
        domain: u64,
    },
    /// Generator-internal fault, e.g. a value that cannot be represented.
    #[error("generator fault in '{table}.{column}': {message}")]
    Generator {
        table: String,
        column: String,
        message: String,
    },
    #[error("parent table '{parent}' is not available for '{table}'")]
    ParentUnavailable { table: String, parent: String },
    #[error("generation of '{table}' was cancelled")]
    Cancelled { table: String },
}

impl GenerationError {
    pub fn table(&self) -> &str {
        match self {
            Self::ConstraintUnsatisfiable { table, .. }
            | Self::EmptyParentSet { table, .. }
            | Self::ExhaustedSequence { table, .. }
            | Self::Generator { table, .. }
            | Self::ParentUnavailable { table, .. }
            | Self::Cancelled { table } => table,
        }
    }

    /// Whether this error only follows from another failure or a stop request.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::ParentUnavailable { .. })
    }

    pub(crate) fn generator(table: &str, column: &str, message: impl Into<String>) -> Self {
        Self::Generator {
            table: table.to_string(),
            column: column.to_string(),
            message: message.into(),
        }
    }
}
