use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::generator::GeneratorSpec;
use crate::types::{Cardinality, ColumnType, ScalarBound};

/// A validated, read-only data-generation schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaDefinition {
    pub name: String,
    /// Domain the schema models (e.g. `fintech`, `healthcare`, `retail`).
    pub vertical: Option<String>,
    pub description: Option<String>,
    pub tables: Vec<TableDefinition>,
}

impl SchemaDefinition {
    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|table| table.name == name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|table| table.name.as_str())
    }

    /// Columns of `table` that some relationship in the schema points at.
    pub fn referenced_columns(&self, table: &str) -> BTreeSet<String> {
        self.tables
            .iter()
            .flat_map(|child| child.relationships.iter())
            .filter(|relationship| relationship.references.table == table)
            .map(|relationship| relationship.references.column.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDefinition {
    pub name: String,
    /// Default row count when the run configuration has no override.
    pub rows: Option<u64>,
    pub primary_key: Option<String>,
    pub columns: Vec<ColumnDefinition>,
    pub relationships: Vec<Relationship>,
}

impl TableDefinition {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    pub fn relationship_for(&self, column: &str) -> Option<&Relationship> {
        self.relationships
            .iter()
            .find(|relationship| relationship.column == column)
    }

    /// Distinct tables this table holds foreign keys to.
    pub fn parent_tables(&self) -> BTreeSet<&str> {
        self.relationships
            .iter()
            .map(|relationship| relationship.references.table.as_str())
            .collect()
    }

    /// True for the primary key and for unique columns.
    pub fn is_key_column(&self, name: &str) -> bool {
        self.primary_key.as_deref() == Some(name)
            || self.column(name).is_some_and(|column| column.constraints.unique)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Type of the stored values. Equals `column_type` except for
    /// `reference` columns, which take the referenced column's type.
    pub storage_type: ColumnType,
    pub generator: GeneratorSpec,
    pub constraints: ColumnConstraints,
    /// Digits after the decimal point for `decimal` columns.
    pub scale: u32,
}

impl ColumnDefinition {
    /// Whether every non-null value must be distinct within the table.
    pub fn requires_unique(&self) -> bool {
        self.constraints.unique || matches!(self.generator, GeneratorSpec::UniqueSequence(_))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ColumnConstraints {
    pub nullable: bool,
    /// Chance of emitting `NULL` before the generator is consulted.
    pub null_probability: f64,
    pub unique: bool,
    pub min: Option<ScalarBound>,
    pub max: Option<ScalarBound>,
    /// Enumerated set of permitted values.
    pub values: Option<Vec<Value>>,
}

/// Foreign key from a child column to a parent key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Relationship {
    pub column: String,
    pub references: TableColumnRef,
    #[serde(default)]
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableColumnRef {
    pub table: String,
    pub column: String,
}
