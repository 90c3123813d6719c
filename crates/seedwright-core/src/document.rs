//! Wire format of schema documents, before validation.
//!
//! Column types, generators and bounds are kept loosely typed here so the
//! loader can report every problem in one pass instead of stopping at the
//! first deserialization error.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::generator::GeneratorSpec;
use crate::schema::Relationship;
use crate::types::{ColumnType, ScalarBound};

/// Top-level schema document.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SchemaDocument {
    pub name: String,
    #[serde(default)]
    pub vertical: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub tables: Vec<TableDocument>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TableDocument {
    pub name: String,
    #[serde(default)]
    pub rows: Option<u64>,
    #[serde(default)]
    pub primary_key: Option<String>,
    pub columns: Vec<ColumnDocument>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ColumnDocument {
    pub name: String,
    #[serde(rename = "type")]
    #[schemars(with = "ColumnType")]
    pub column_type: String,
    /// Defaults to a type-appropriate generator when omitted.
    #[serde(default)]
    #[schemars(with = "Option<GeneratorSpec>")]
    pub generator: Option<Value>,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub null_probability: Option<f64>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    #[schemars(with = "Option<ScalarBound>")]
    pub min: Option<Value>,
    #[serde(default)]
    #[schemars(with = "Option<ScalarBound>")]
    pub max: Option<Value>,
    #[serde(default)]
    pub values: Option<Vec<Value>>,
    #[serde(default)]
    pub scale: Option<u32>,
}
