//! Core contracts for Seedwright.
//!
//! This crate defines the schema model consumed by the generator, the JSON
//! document loader that validates it, and the dependency resolver that orders
//! tables for generation.

pub mod document;
pub mod error;
pub mod generator;
pub mod graph;
pub mod loader;
pub mod schema;
pub mod types;

pub use document::{ColumnDocument, SchemaDocument, TableDocument};
pub use error::{CyclicDependencyError, SchemaError, SchemaErrorKind, SchemaIssue};
pub use generator::{
    BooleanSpec, DerivedSpec, EnumEntry, EnumerationSpec, ForeignKeySpec, GeneratorSpec,
    PatternSpec, ScalarRangeSpec, SelectionPolicy, SequenceOrder, UniqueSequenceSpec,
    scale_factor, template_has_empty_placeholder, template_placeholders,
};
pub use graph::{
    build_dependency_report, resolve_order, DependencyReport, DependencySummary, ResolvedOrder,
};
pub use loader::{load_schema, load_schema_file, schema_document_json_schema, validate_document};
pub use schema::{
    ColumnConstraints, ColumnDefinition, Relationship, SchemaDefinition, TableColumnRef,
    TableDefinition,
};
pub use types::{Cardinality, ColumnType, ScalarBound};
