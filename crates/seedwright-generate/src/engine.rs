use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use tracing::{debug, info, warn};

use seedwright_core::{ResolvedOrder, SchemaDefinition, TableDefinition};

use crate::errors::GenerationError;
use crate::generators::{FieldGenerator, RowContext};
use crate::model::{GeneratedDataset, GenerationOptions, GenerationReport, RowTargets, TableReport};
use crate::record::{GeneratedRecord, ParentKeys, ParentSets, RecordSet};
use crate::rng::{column_seed, row_rng, table_seed};
use crate::stop::StopSignal;
use crate::value::{GeneratedValue, ValueBound};

/// A finished table: its report and the key columns children may reference.
#[derive(Debug, Clone)]
pub struct TableOutcome {
    pub report: TableReport,
    pub keys: ParentKeys,
}

struct CompiledColumn {
    name: String,
    generator: FieldGenerator,
    seed: u64,
    nullable: bool,
    null_probability: f64,
    /// Values emitted so far, for unique columns that need tracking.
    seen: Option<HashSet<GeneratedValue>>,
    allowed: Option<HashSet<GeneratedValue>>,
    min: Option<ValueBound>,
    max: Option<ValueBound>,
}

impl CompiledColumn {
    fn violation(&self, value: &GeneratedValue) -> Option<String> {
        if value.is_null() {
            return (!self.nullable).then(|| "null in a non-nullable column".to_string());
        }
        if let Some(min) = &self.min {
            if min.compare(value) == Some(std::cmp::Ordering::Less) {
                return Some(format!("value {value} is below the column minimum"));
            }
        }
        if let Some(max) = &self.max {
            if max.compare(value) == Some(std::cmp::Ordering::Greater) {
                return Some(format!("value {value} is above the column maximum"));
            }
        }
        if self
            .allowed
            .as_ref()
            .is_some_and(|allowed| !allowed.contains(value))
        {
            return Some(format!("value {value} is outside the column's value set"));
        }
        if self.seen.as_ref().is_some_and(|seen| seen.contains(value)) {
            return Some(format!("duplicate value {value} in a unique column"));
        }
        None
    }
}

struct Violation {
    column: String,
    reason: String,
}

enum RowAttempt {
    Accepted(Vec<GeneratedValue>),
    Rejected(Violation),
}

/// Streams the rows of one table.
///
/// Construction runs the pre-flight checks, so a table that cannot be
/// generated fails before its first row exists.
pub struct TableGenerator {
    table: String,
    names: Vec<String>,
    primary_key: Option<usize>,
    columns: Vec<CompiledColumn>,
    parents: ParentSets,
    rows: u64,
    next_row: u64,
    max_attempts_row: u32,
    retries: u64,
    retained: Vec<usize>,
    keys: ParentKeys,
    started: Instant,
}

impl TableGenerator {
    pub fn new(
        table: &TableDefinition,
        parents: &ParentSets,
        run_seed: u64,
        rows: u64,
        options: &GenerationOptions,
        retain: &BTreeSet<String>,
    ) -> Result<Self, GenerationError> {
        let mut own_parents = ParentSets::new();
        for relationship in &table.relationships {
            let parent_name = &relationship.references.table;
            let parent = parents
                .get(parent_name)
                .ok_or_else(|| GenerationError::ParentUnavailable {
                    table: table.name.clone(),
                    parent: parent_name.clone(),
                })?;
            if rows > 0 && parent.is_empty() {
                return Err(GenerationError::EmptyParentSet {
                    table: table.name.clone(),
                    column: relationship.column.clone(),
                    parent: parent_name.clone(),
                });
            }
            own_parents.insert(parent_name.clone(), Arc::clone(parent));
        }

        let seed = table_seed(run_seed, &table.name);
        let mut columns = Vec::with_capacity(table.columns.len());
        for (position, column) in table.columns.iter().enumerate() {
            let generator = FieldGenerator::compile(table, position, seed, &own_parents)?;
            let unique = column.requires_unique() || generator.is_distinct_by_construction();

            if unique && !column.constraints.nullable {
                if let Some(domain) = generator.domain_size() {
                    if domain < rows {
                        return Err(GenerationError::ConstraintUnsatisfiable {
                            table: table.name.clone(),
                            column: column.name.clone(),
                            reason: format!(
                                "{rows} unique values requested but the generator can produce only {domain}"
                            ),
                        });
                    }
                }
            }

            let allowed = column.constraints.values.as_ref().map(|values| {
                values
                    .iter()
                    .filter_map(|value| {
                        GeneratedValue::from_json(value, column.storage_type, column.scale)
                    })
                    .collect()
            });
            columns.push(CompiledColumn {
                name: column.name.clone(),
                seed: column_seed(seed, position),
                nullable: column.constraints.nullable,
                null_probability: column.constraints.null_probability,
                seen: (unique && !generator.is_distinct_by_construction()).then(HashSet::new),
                allowed,
                min: column.constraints.min.as_ref().and_then(ValueBound::from_scalar),
                max: column.constraints.max.as_ref().and_then(ValueBound::from_scalar),
                generator,
            });
        }

        let retained: Vec<usize> = retain
            .iter()
            .filter_map(|name| table.column_index(name))
            .collect();
        let keys = ParentKeys::new(
            table.name.clone(),
            retained
                .iter()
                .map(|position| table.columns[*position].name.clone())
                .collect(),
        );
        let primary_key = table
            .primary_key
            .as_deref()
            .and_then(|name| table.column_index(name));

        debug!(
            table = %table.name,
            rows,
            retained = retained.len(),
            "table generator ready"
        );

        Ok(Self {
            table: table.name.clone(),
            names: table.column_names(),
            primary_key,
            columns,
            parents: own_parents,
            rows,
            next_row: 0,
            max_attempts_row: options.max_attempts_row.max(1),
            retries: 0,
            retained,
            keys,
            started: Instant::now(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn rows_requested(&self) -> u64 {
        self.rows
    }

    pub fn rows_generated(&self) -> u64 {
        self.next_row
    }

    pub fn is_complete(&self) -> bool {
        self.next_row >= self.rows
    }

    /// Empty record set shaped like this table.
    pub fn record_set(&self) -> RecordSet {
        RecordSet::new(self.table.clone(), self.names.clone(), self.primary_key)
    }

    /// Generate the next row, retrying constraint violations with fresh draws.
    pub fn next_record(&mut self) -> Result<Option<GeneratedRecord>, GenerationError> {
        if self.is_complete() {
            return Ok(None);
        }
        let row_index = self.next_row;
        let mut last = None;
        for attempt in 1..=self.max_attempts_row {
            match self.build_row(row_index, attempt)? {
                RowAttempt::Accepted(values) => {
                    self.accept(&values);
                    self.next_row += 1;
                    return Ok(Some(GeneratedRecord {
                        id: row_index + 1,
                        values,
                    }));
                }
                RowAttempt::Rejected(violation) => {
                    self.retries += 1;
                    last = Some(violation);
                }
            }
        }

        let violation = last.unwrap_or(Violation {
            column: String::new(),
            reason: "row rejected".to_string(),
        });
        warn!(
            table = %self.table,
            column = %violation.column,
            row = row_index + 1,
            attempts = self.max_attempts_row,
            "row attempts exhausted"
        );
        Err(GenerationError::ConstraintUnsatisfiable {
            table: self.table.clone(),
            column: violation.column,
            reason: format!(
                "{} (row {} rejected {} times)",
                violation.reason,
                row_index + 1,
                self.max_attempts_row
            ),
        })
    }

    /// Generate up to `size` rows. Stops between rows when `stop` fires.
    pub fn next_batch(
        &mut self,
        size: usize,
        stop: &StopSignal,
    ) -> Result<Option<RecordSet>, GenerationError> {
        if self.is_complete() {
            return Ok(None);
        }
        let mut batch = self.record_set();
        while batch.len() < size.max(1) {
            if stop.is_stopped() {
                return Err(GenerationError::Cancelled {
                    table: self.table.clone(),
                });
            }
            match self.next_record()? {
                Some(record) => batch.push(record),
                None => break,
            }
        }
        Ok(Some(batch))
    }

    pub fn finish(self) -> TableOutcome {
        TableOutcome {
            report: TableReport {
                table: self.table,
                rows_requested: self.rows,
                rows_generated: self.next_row,
                retries: self.retries,
                duration_ms: self.started.elapsed().as_millis() as u64,
            },
            keys: self.keys,
        }
    }

    fn build_row(&self, row_index: u64, attempt: u32) -> Result<RowAttempt, GenerationError> {
        let mut values: Vec<GeneratedValue> = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let mut rng = row_rng(column.seed, row_index, attempt);
            let value = if column.null_probability > 0.0
                && rng.random::<f64>() < column.null_probability
            {
                GeneratedValue::Null
            } else {
                let mut ctx = RowContext::new(
                    &self.table,
                    &column.name,
                    row_index,
                    rng,
                    &self.names,
                    &values,
                    &self.parents,
                );
                column.generator.produce(&mut ctx)?
            };

            if let Some(reason) = column.violation(&value) {
                return Ok(RowAttempt::Rejected(Violation {
                    column: column.name.clone(),
                    reason,
                }));
            }
            values.push(value);
        }
        Ok(RowAttempt::Accepted(values))
    }

    fn accept(&mut self, values: &[GeneratedValue]) {
        for (column, value) in self.columns.iter_mut().zip(values) {
            if let Some(seen) = column.seen.as_mut() {
                if !value.is_null() {
                    seen.insert(value.clone());
                }
            }
        }
        self.keys
            .push_row(self.retained.iter().map(|position| values[*position].clone()));
    }
}

/// Sequential generator that materialises every table.
#[derive(Debug, Clone, Default)]
pub struct GenerationEngine {
    options: GenerationOptions,
}

impl GenerationEngine {
    pub fn new(options: GenerationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    pub fn generate(
        &self,
        schema: &SchemaDefinition,
        order: &ResolvedOrder,
        targets: &RowTargets,
        seed: u64,
    ) -> Result<GeneratedDataset, GenerationError> {
        let start = Instant::now();
        let mut parents = ParentSets::new();
        let mut report = GenerationReport::new(seed);
        let mut tables = Vec::with_capacity(order.len());

        info!(
            schema = %schema.name,
            tables = order.len(),
            seed,
            "generation started"
        );

        for name in &order.order {
            let table = schema.table(name).ok_or_else(|| {
                GenerationError::generator(name, "", "table is not part of the schema")
            })?;
            let rows = targets.rows_for(table);
            let retain = schema.referenced_columns(name);
            let mut generator =
                TableGenerator::new(table, &parents, seed, rows, &self.options, &retain)?;

            let mut set = generator.record_set();
            while let Some(record) = generator.next_record()? {
                set.push(record);
            }
            let outcome = generator.finish();
            info!(
                table = %name,
                rows_generated = outcome.report.rows_generated,
                retries = outcome.report.retries,
                duration_ms = outcome.report.duration_ms,
                "table generated"
            );

            parents.insert(name.clone(), Arc::new(outcome.keys));
            report.record_table(outcome.report);
            tables.push(set);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            schema = %schema.name,
            rows = report.rows_total(),
            retries = report.retries_total,
            duration_ms = report.duration_ms,
            "generation completed"
        );
        Ok(GeneratedDataset { tables, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedwright_core::{load_schema, resolve_order};
    use serde_json::json;

    fn schema(document: serde_json::Value) -> SchemaDefinition {
        load_schema(document.to_string().as_bytes()).expect("valid schema")
    }

    #[test]
    fn retries_until_unique() {
        let schema = schema(json!({
            "name": "codes",
            "tables": [{"name": "codes", "columns": [
                {"name": "code", "type": "integer", "unique": true,
                 "generator": {"kind": "scalar_range", "min": 1, "max": 40}}
            ]}]
        }));
        let table = &schema.tables[0];
        let mut generator = TableGenerator::new(
            table,
            &ParentSets::new(),
            11,
            40,
            &GenerationOptions {
                max_attempts_row: 10_000,
            },
            &BTreeSet::new(),
        )
        .expect("generator");

        let mut seen = HashSet::new();
        while let Some(record) = generator.next_record().expect("row") {
            assert!(seen.insert(record.values[0].clone()));
        }
        assert_eq!(seen.len(), 40);
        assert!(generator.finish().report.retries > 0);
    }

    #[test]
    fn batches_respect_stop_signal() {
        let schema = schema(json!({
            "name": "events",
            "tables": [{"name": "events", "columns": [{"name": "id", "type": "integer"}]}]
        }));
        let mut generator = TableGenerator::new(
            &schema.tables[0],
            &ParentSets::new(),
            1,
            10,
            &GenerationOptions::default(),
            &BTreeSet::new(),
        )
        .expect("generator");

        let stop = StopSignal::new();
        let batch = generator.next_batch(4, &stop).expect("batch").expect("rows");
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.first_id(), Some(1));

        stop.stop();
        let err = generator.next_batch(4, &stop).expect_err("cancelled");
        assert!(matches!(err, GenerationError::Cancelled { .. }));
        assert_eq!(generator.rows_generated(), 4);
    }

    #[test]
    fn zero_row_parent_publishes_empty_keys() {
        let schema = schema(json!({
            "name": "zero",
            "tables": [
                {"name": "customers", "primary_key": "id", "columns": [{"name": "id", "type": "integer"}]},
                {"name": "orders", "columns": [{"name": "customer_id", "type": "reference"}],
                 "relationships": [{"column": "customer_id", "references": {"table": "customers", "column": "id"}}]}
            ]
        }));
        let order = resolve_order(&schema).expect("order");
        let targets = RowTargets::new(5).with_override("customers", 0);
        let err = GenerationEngine::default()
            .generate(&schema, &order, &targets, 3)
            .expect_err("empty parent");
        assert_eq!(
            err,
            GenerationError::EmptyParentSet {
                table: "orders".into(),
                column: "customer_id".into(),
                parent: "customers".into(),
            }
        );

        let targets = RowTargets::new(0);
        let dataset = GenerationEngine::default()
            .generate(&schema, &order, &targets, 3)
            .expect("all tables empty");
        assert!(dataset.tables.iter().all(RecordSet::is_empty));
    }
}
