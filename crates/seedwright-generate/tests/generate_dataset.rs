use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use seedwright_core::{load_schema, load_schema_file, resolve_order, SchemaDefinition};
use seedwright_generate::{
    audit_dataset, GeneratedDataset, GeneratedValue, GenerationEngine, GenerationError,
    GenerationOptions, ParentSets, RowTargets, TableGenerator,
};
use serde_json::json;

fn retail_orders() -> SchemaDefinition {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../schemas/retail-orders.json");
    load_schema_file(&path).expect("load retail-orders")
}

fn schema_from(document: serde_json::Value) -> SchemaDefinition {
    load_schema(document.to_string().as_bytes()).expect("valid schema")
}

fn generate(schema: &SchemaDefinition, targets: &RowTargets, seed: u64) -> GeneratedDataset {
    let order = resolve_order(schema).expect("acyclic");
    GenerationEngine::default()
        .generate(schema, &order, targets, seed)
        .expect("generate")
}

#[test]
fn retail_orders_respects_row_counts_and_references() {
    let schema = retail_orders();
    let dataset = generate(&schema, &RowTargets::new(10), 42);

    let customers = dataset.table("customers").expect("customers");
    let orders = dataset.table("orders").expect("orders");
    assert_eq!(customers.len(), 100);
    assert_eq!(orders.len(), 500);
    assert_eq!(dataset.report.rows_total(), 600);

    let customer_ids: HashSet<&GeneratedValue> = customers.column_values("id").collect();
    assert_eq!(customer_ids.len(), 100);
    for customer_id in orders.column_values("customer_id") {
        assert!(customer_ids.contains(customer_id), "dangling {customer_id}");
    }

    let report = audit_dataset(&schema, &dataset);
    assert!(report.is_clean(), "violations: {:?}", report.violations);
}

#[test]
fn same_seed_reproduces_every_value() {
    let schema = retail_orders();
    let targets = RowTargets::new(10);
    let first = generate(&schema, &targets, 7);
    let second = generate(&schema, &targets, 7);
    let other = generate(&schema, &targets, 8);

    for (a, b) in first.tables.iter().zip(&second.tables) {
        assert_eq!(a.records(), b.records(), "table {} differs", a.table());
    }
    let orders_first = first.table("orders").expect("orders").records();
    let orders_other = other.table("orders").expect("orders").records();
    assert_ne!(orders_first, orders_other);
}

#[test]
fn derived_columns_follow_their_inputs() {
    let schema = retail_orders();
    let dataset = generate(&schema, &RowTargets::new(10), 3);
    let orders = dataset.table("orders").expect("orders");

    for record in orders.records() {
        let subtotal = orders.value(record, "subtotal").and_then(GeneratedValue::as_decimal);
        let tax = orders.value(record, "tax").and_then(GeneratedValue::as_decimal);
        let total = orders.value(record, "total").and_then(GeneratedValue::as_decimal);
        let (Some(subtotal), Some(tax), Some(total)) = (subtotal, tax, total) else {
            panic!("derived decimals missing in row {}", record.id);
        };
        assert_eq!(total, subtotal + tax);

        let placed = orders.value(record, "placed_at").and_then(GeneratedValue::as_timestamp);
        if let Some(ships) = orders.value(record, "ships_on").and_then(GeneratedValue::as_timestamp) {
            let placed = placed.expect("placed_at").date();
            let days = (ships.date() - placed).num_days();
            assert!((0..=7).contains(&days), "ships {days} days after placement");
        }
    }
}

#[test]
fn undersized_sequence_fails_before_any_row() {
    let schema = schema_from(json!({
        "name": "tiny",
        "tables": [{"name": "codes", "columns": [
            {"name": "code", "type": "integer",
             "generator": {"kind": "unique_sequence", "start": 1, "end": 5}}
        ]}]
    }));
    let result = TableGenerator::new(
        &schema.tables[0],
        &ParentSets::new(),
        1,
        10,
        &GenerationOptions::default(),
        &BTreeSet::new(),
    );
    let Err(err) = result else {
        panic!("expected a pre-flight failure");
    };
    assert!(
        matches!(err, GenerationError::ConstraintUnsatisfiable { ref column, .. } if column == "code"),
        "{err}"
    );
}

#[test]
fn one_to_one_children_take_distinct_parents() {
    let schema = schema_from(json!({
        "name": "profiles",
        "tables": [
            {"name": "users", "rows": 20, "primary_key": "id", "columns": [{"name": "id", "type": "integer"}]},
            {"name": "profiles", "rows": 20, "columns": [{"name": "user_id", "type": "reference"}],
             "relationships": [{"column": "user_id", "references": {"table": "users", "column": "id"},
                                "cardinality": "one_to_one"}]}
        ]
    }));
    let dataset = generate(&schema, &RowTargets::new(0), 5);
    let user_ids: HashSet<&GeneratedValue> = dataset
        .table("profiles")
        .expect("profiles")
        .column_values("user_id")
        .collect();
    assert_eq!(user_ids.len(), 20);

    let oversized = RowTargets::new(0).with_override("profiles", 21);
    let order = resolve_order(&schema).expect("acyclic");
    let err = GenerationEngine::default()
        .generate(&schema, &order, &oversized, 5)
        .expect_err("more children than parents");
    assert!(matches!(err, GenerationError::ConstraintUnsatisfiable { .. }));
}

#[test]
fn impossible_value_set_exhausts_row_attempts() {
    let schema = schema_from(json!({
        "name": "strict",
        "tables": [{"name": "readings", "columns": [
            {"name": "level", "type": "integer", "values": [100],
             "generator": {"kind": "scalar_range", "min": 1, "max": 10}}
        ]}]
    }));
    let order = resolve_order(&schema).expect("acyclic");
    let err = GenerationEngine::new(GenerationOptions { max_attempts_row: 5 })
        .generate(&schema, &order, &RowTargets::new(3), 1)
        .expect_err("no value can satisfy the value set");
    assert_eq!(err.table(), "readings");
    assert!(matches!(err, GenerationError::ConstraintUnsatisfiable { .. }));
}
