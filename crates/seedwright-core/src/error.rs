use serde::Serialize;
use thiserror::Error;

/// Category of a schema problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaErrorKind {
    MalformedInput,
    UnknownColumnType,
    DuplicateTableName,
    DuplicateColumnName,
    DanglingForeignKey,
    InvalidGeneratorSpec,
    UnknownColumn,
    InvalidConstraint,
}

impl SchemaErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedInput => "malformed_input",
            Self::UnknownColumnType => "unknown_column_type",
            Self::DuplicateTableName => "duplicate_table_name",
            Self::DuplicateColumnName => "duplicate_column_name",
            Self::DanglingForeignKey => "dangling_foreign_key",
            Self::InvalidGeneratorSpec => "invalid_generator_spec",
            Self::UnknownColumn => "unknown_column",
            Self::InvalidConstraint => "invalid_constraint",
        }
    }
}

/// Structured schema problem with its location in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaIssue {
    pub kind: SchemaErrorKind,
    /// JSON pointer into the schema document.
    pub path: String,
    pub message: String,
}

impl SchemaIssue {
    pub fn new(kind: SchemaErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.kind.as_str(), self.path, self.message)
    }
}

/// Every problem found while loading a schema document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid schema ({} issue(s)): {}", .issues.len(), join_issues(.issues))]
pub struct SchemaError {
    pub issues: Vec<SchemaIssue>,
}

impl SchemaError {
    pub fn single(issue: SchemaIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }

    pub fn has_kind(&self, kind: SchemaErrorKind) -> bool {
        self.issues.iter().any(|issue| issue.kind == kind)
    }

    pub fn count_kind(&self, kind: SchemaErrorKind) -> usize {
        self.issues.iter().filter(|issue| issue.kind == kind).count()
    }
}

/// The relationship graph contains a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cyclic dependency between tables: {}", .tables.join(", "))]
pub struct CyclicDependencyError {
    /// Tables that sit on a cycle, sorted by name.
    pub tables: Vec<String>,
}

fn join_issues(issues: &[SchemaIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
