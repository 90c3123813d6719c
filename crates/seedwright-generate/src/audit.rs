//! Integrity audit of a materialised dataset.
//!
//! Re-checks what the engine promises (no dangling references, unique keys,
//! no nulls in non-nullable columns, values inside declared bounds) against
//! the generated rows, without trusting the engine's own bookkeeping.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use seedwright_core::{ColumnDefinition, SchemaDefinition, TableDefinition};

use crate::model::GeneratedDataset;
use crate::record::RecordSet;
use crate::value::{GeneratedValue, ValueBound};

/// Structured violation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub code: String,
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

/// Generic constraint counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintStats {
    pub checked: u64,
    pub violations: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegritySummary {
    pub not_null: ConstraintStats,
    pub unique: ConstraintStats,
    pub foreign_key: ConstraintStats,
    pub bounds: ConstraintStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub summary: IntegritySummary,
    pub violations: Vec<Violation>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn count(&self, code: &str) -> usize {
        self.violations
            .iter()
            .filter(|violation| violation.code == code)
            .count()
    }
}

pub fn audit_dataset(schema: &SchemaDefinition, dataset: &GeneratedDataset) -> IntegrityReport {
    let mut report = IntegrityReport::default();
    for table in &schema.tables {
        let Some(data) = dataset.table(&table.name) else {
            continue;
        };
        for column in &table.columns {
            audit_not_null(table, column, data, &mut report);
            audit_unique(table, column, data, &mut report);
            audit_bounds(table, column, data, &mut report);
        }
        audit_foreign_keys(table, data, dataset, &mut report);
    }
    sort_violations(&mut report.violations);
    report
}

fn audit_not_null(
    table: &TableDefinition,
    column: &ColumnDefinition,
    data: &RecordSet,
    report: &mut IntegrityReport,
) {
    if column.constraints.nullable {
        return;
    }
    report.summary.not_null.checked += 1;
    let nulls = data.column_values(&column.name).filter(|v| v.is_null()).count() as u64;
    if nulls > 0 {
        report.summary.not_null.violations += nulls;
        report.violations.push(Violation {
            code: "not_null".to_string(),
            path: format!("{}.{}", table.name, column.name),
            message: format!("{nulls} null value(s) found"),
            row_index: None,
            example: None,
        });
    }
}

fn audit_unique(
    table: &TableDefinition,
    column: &ColumnDefinition,
    data: &RecordSet,
    report: &mut IntegrityReport,
) {
    if !column.requires_unique() {
        return;
    }
    report.summary.unique.checked += 1;
    let mut seen = HashSet::new();
    for (row_idx, value) in data.column_values(&column.name).enumerate() {
        if value.is_null() || seen.insert(value) {
            continue;
        }
        report.summary.unique.violations += 1;
        report.violations.push(Violation {
            code: "unique".to_string(),
            path: format!("{}.{}", table.name, column.name),
            message: "duplicate key detected".to_string(),
            row_index: Some(row_idx as u64 + 1),
            example: Some(value.to_string()),
        });
    }
}

fn audit_bounds(
    table: &TableDefinition,
    column: &ColumnDefinition,
    data: &RecordSet,
    report: &mut IntegrityReport,
) {
    let min = column.constraints.min.as_ref().and_then(ValueBound::from_scalar);
    let max = column.constraints.max.as_ref().and_then(ValueBound::from_scalar);
    let allowed: Option<HashSet<GeneratedValue>> =
        column.constraints.values.as_ref().map(|values| {
            values
                .iter()
                .filter_map(|value| {
                    GeneratedValue::from_json(value, column.storage_type, column.scale)
                })
                .collect()
        });
    if min.is_none() && max.is_none() && allowed.is_none() {
        return;
    }

    report.summary.bounds.checked += 1;
    for (row_idx, value) in data.column_values(&column.name).enumerate() {
        if value.is_null() {
            continue;
        }
        let below = min
            .as_ref()
            .is_some_and(|bound| bound.compare(value) == Some(Ordering::Less));
        let above = max
            .as_ref()
            .is_some_and(|bound| bound.compare(value) == Some(Ordering::Greater));
        let outside = allowed.as_ref().is_some_and(|set| !set.contains(value));
        if below || above || outside {
            report.summary.bounds.violations += 1;
            report.violations.push(Violation {
                code: "bounds".to_string(),
                path: format!("{}.{}", table.name, column.name),
                message: "value outside declared bounds".to_string(),
                row_index: Some(row_idx as u64 + 1),
                example: Some(value.to_string()),
            });
        }
    }
}

fn audit_foreign_keys(
    table: &TableDefinition,
    data: &RecordSet,
    dataset: &GeneratedDataset,
    report: &mut IntegrityReport,
) {
    let mut parent_keys: HashMap<(&str, &str), HashSet<&GeneratedValue>> = HashMap::new();
    for relationship in &table.relationships {
        report.summary.foreign_key.checked += 1;
        let target = (
            relationship.references.table.as_str(),
            relationship.references.column.as_str(),
        );
        let keys = parent_keys.entry(target).or_insert_with(|| {
            dataset
                .table(target.0)
                .map(|parent| parent.column_values(target.1).collect())
                .unwrap_or_default()
        });
        for (row_idx, value) in data.column_values(&relationship.column).enumerate() {
            if value.is_null() || keys.contains(value) {
                continue;
            }
            report.summary.foreign_key.violations += 1;
            report.violations.push(Violation {
                code: "foreign_key".to_string(),
                path: format!("{}.{}", table.name, relationship.column),
                message: format!("no matching {}.{}", target.0, target.1),
                row_index: Some(row_idx as u64 + 1),
                example: Some(value.to_string()),
            });
        }
    }
}

fn sort_violations(violations: &mut [Violation]) {
    violations.sort_by(|a, b| {
        (&a.path, &a.code, a.row_index.unwrap_or_default()).cmp(&(
            &b.path,
            &b.code,
            b.row_index.unwrap_or_default(),
        ))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GenerationReport;
    use crate::record::GeneratedRecord;
    use seedwright_core::load_schema;
    use serde_json::json;

    #[test]
    fn reports_dangling_and_duplicate_keys() {
        let schema = load_schema(
            json!({
                "name": "audit",
                "tables": [
                    {"name": "customers", "primary_key": "id", "columns": [{"name": "id", "type": "integer"}]},
                    {"name": "orders", "columns": [{"name": "customer_id", "type": "reference"}],
                     "relationships": [{"column": "customer_id", "references": {"table": "customers", "column": "id"}}]}
                ]
            })
            .to_string()
            .as_bytes(),
        )
        .expect("schema");

        let mut customers = RecordSet::for_table(&schema.tables[0]);
        for (id, key) in [(1, 1), (2, 2), (3, 2)] {
            customers.push(GeneratedRecord {
                id,
                values: vec![GeneratedValue::Int(key)],
            });
        }
        let mut orders = RecordSet::for_table(&schema.tables[1]);
        for (id, key) in [(1, 1), (2, 9)] {
            orders.push(GeneratedRecord {
                id,
                values: vec![GeneratedValue::Int(key)],
            });
        }
        let dataset = GeneratedDataset {
            tables: vec![customers, orders],
            report: GenerationReport::new(0),
        };

        let report = audit_dataset(&schema, &dataset);
        assert_eq!(report.count("unique"), 1);
        assert_eq!(report.count("foreign_key"), 1);
        assert_eq!(report.violations[0].path, "customers.id");
        assert_eq!(report.violations[1].example.as_deref(), Some("9"));
        assert_eq!(report.summary.foreign_key.checked, 1);
    }
}
