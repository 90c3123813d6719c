use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use seedwright_generate::GeneratedRecord;
use seedwright_run::{ErrorKind, Orchestrator, RunState, SeedConfig, StopSignal};
use seedwright_sink::{
    file_is_complete, ConnectionOptions, ConnectionSink, FileSinkOptions, SinkConfig, SinkError,
    SinkKind, TransactionalBackend,
};

fn temp_out_dir(label: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("seedwright_run_{label}_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp out dir");
    dir
}

fn retail_orders() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../schemas/retail-orders.json")
}

fn write_schema(dir: &Path, document: serde_json::Value) -> PathBuf {
    let path = dir.join("schema.json");
    fs::write(&path, document.to_string()).expect("write schema");
    path
}

fn file_config(schema: PathBuf, out: PathBuf, workers: usize) -> SeedConfig {
    SeedConfig {
        seed: Some(42),
        workers,
        batch_size: 64,
        sink: SinkConfig::File(FileSinkOptions::new(out)),
        ..SeedConfig::new(schema)
    }
}

#[derive(Debug, Default)]
struct Database {
    committed: Vec<String>,
    staged: Vec<String>,
    fail_at_row: Option<usize>,
}

/// Shares its state with the test so the outcome stays visible after the
/// sink is consumed by the run.
#[derive(Debug, Clone, Default)]
struct SharedBackend(Arc<Mutex<Database>>);

impl SharedBackend {
    fn committed(&self) -> usize {
        self.0.lock().expect("database lock").committed.len()
    }
}

#[async_trait]
impl TransactionalBackend for SharedBackend {
    async fn begin(&mut self) -> seedwright_sink::Result<()> {
        Ok(())
    }

    async fn insert(
        &mut self,
        table: &str,
        _columns: &[String],
        records: &[GeneratedRecord],
    ) -> seedwright_sink::Result<u64> {
        let mut db = self.0.lock().expect("database lock");
        let before = db.committed.len() + db.staged.len();
        if let Some(limit) = db.fail_at_row {
            if before + records.len() >= limit {
                return Err(SinkError::Write {
                    table: table.to_string(),
                    message: "unique violation".to_string(),
                });
            }
        }
        db.staged
            .extend(records.iter().map(|_| table.to_string()));
        Ok(records.len() as u64)
    }

    async fn commit(&mut self) -> seedwright_sink::Result<()> {
        let mut db = self.0.lock().expect("database lock");
        let mut staged = std::mem::take(&mut db.staged);
        db.committed.append(&mut staged);
        Ok(())
    }

    async fn rollback(&mut self) -> seedwright_sink::Result<()> {
        self.0.lock().expect("database lock").staged.clear();
        Ok(())
    }
}

#[tokio::test]
async fn file_output_is_identical_across_runs_and_worker_counts() {
    let dir = temp_out_dir("deterministic");
    let single = dir.join("single.sql");
    let parallel = dir.join("parallel.sql");
    let stop = StopSignal::new();

    let first = Orchestrator::new(file_config(retail_orders(), single.clone(), 1))
        .run(&stop)
        .await
        .expect("single worker run");
    let second = Orchestrator::new(file_config(retail_orders(), parallel.clone(), 4))
        .run(&stop)
        .await
        .expect("parallel run");

    assert_eq!(first.state, RunState::Completed);
    assert_eq!(
        first.transitions,
        vec![
            RunState::Idle,
            RunState::Loading,
            RunState::Resolving,
            RunState::Generating,
            RunState::Writing,
            RunState::Completed,
        ]
    );
    assert_eq!(first.sink, SinkKind::File);
    assert!(!first.seed_generated);
    assert_eq!(first.table("customers").map(|t| t.rows_written), Some(100));
    assert_eq!(first.table("orders").map(|t| t.rows_written), Some(500));
    assert_eq!(second.rows_written(), 600);

    let single_bytes = fs::read(&single).expect("read single");
    let parallel_bytes = fs::read(&parallel).expect("read parallel");
    assert_eq!(single_bytes, parallel_bytes);
    assert!(file_is_complete(&single).expect("inspect file"));

    let text = String::from_utf8(single_bytes).expect("utf8");
    let customers_at = text.find("INSERT INTO \"customers\"").expect("customers insert");
    let orders_at = text.find("INSERT INTO \"orders\"").expect("orders insert");
    assert!(customers_at < orders_at);
}

#[tokio::test]
async fn dry_run_counts_match_connection_counts() {
    let stop = StopSignal::new();
    let dry = Orchestrator::new(SeedConfig {
        seed: Some(9),
        dry_run: true,
        sink: SinkConfig::Connection(ConnectionOptions::new("postgres://nowhere.invalid/shop")),
        ..SeedConfig::new(retail_orders())
    });
    let dry_run = dry.run(&stop).await.expect("dry run never connects");
    assert_eq!(dry_run.sink, SinkKind::DryRun);
    assert!(dry_run.destination.is_none());

    let backend = SharedBackend::default();
    let options = ConnectionOptions {
        batch_size: 70,
        ..ConnectionOptions::default()
    };
    let sink = ConnectionSink::new(backend.clone(), "memory", &options);
    let wet = Orchestrator::new(SeedConfig {
        seed: Some(9),
        ..SeedConfig::new(retail_orders())
    })
    .run_with_sink(Box::new(sink), &stop)
    .await
    .expect("connection run");

    assert_eq!(wet.sink, SinkKind::Connection);
    for table in ["customers", "orders"] {
        assert_eq!(
            dry_run.table(table).map(|t| t.rows_written),
            wet.table(table).map(|t| t.rows_written),
            "{table}"
        );
    }
    assert_eq!(backend.committed(), 600);
}

#[tokio::test]
async fn failed_insert_commits_nothing() {
    let backend = SharedBackend::default();
    backend.0.lock().expect("database lock").fail_at_row = Some(550);
    let sink = ConnectionSink::new(backend.clone(), "memory", &ConnectionOptions::default());

    let failure = Orchestrator::new(SeedConfig {
        seed: Some(3),
        batch_size: 50,
        ..SeedConfig::new(retail_orders())
    })
    .run_with_sink(Box::new(sink), &StopSignal::new())
    .await
    .expect_err("insert fails");

    assert_eq!(failure.run.state, RunState::Failed);
    assert_eq!(failure.run.errors.len(), 1);
    assert_eq!(failure.run.errors[0].kind, ErrorKind::Write);
    assert_eq!(failure.run.errors[0].table.as_deref(), Some("orders"));
    assert_eq!(backend.committed(), 0);
}

#[tokio::test]
async fn undersized_sequence_fails_and_marks_file_incomplete() {
    let dir = temp_out_dir("undersized");
    let schema = write_schema(
        &dir,
        json!({
            "name": "codes",
            "tables": [
                {
                    "name": "regions",
                    "rows": 3,
                    "primary_key": "id",
                    "columns": [{"name": "id", "type": "integer"}]
                },
                {
                    "name": "codes",
                    "rows": 10,
                    "primary_key": "id",
                    "columns": [{
                        "name": "id",
                        "type": "integer",
                        "generator": {"kind": "unique_sequence", "start": 1, "end": 5}
                    }]
                }
            ]
        }),
    );
    let out = dir.join("codes.sql");

    let failure = Orchestrator::new(file_config(schema, out.clone(), 2))
        .run(&StopSignal::new())
        .await
        .expect_err("domain too small");

    assert_eq!(failure.error.kind(), ErrorKind::ConstraintUnsatisfiable);
    assert_eq!(failure.run.errors.len(), 1);
    assert_eq!(failure.run.errors[0].table.as_deref(), Some("codes"));
    assert_eq!(failure.run.table("codes").map(|t| t.rows_written), Some(0));
    assert!(!file_is_complete(&out).expect("inspect file"));
}

#[tokio::test]
async fn stopped_signal_cancels_the_run() {
    let stop = StopSignal::new();
    stop.stop();
    let failure = Orchestrator::new(SeedConfig {
        seed: Some(1),
        dry_run: true,
        ..SeedConfig::new(retail_orders())
    })
    .run(&stop)
    .await
    .expect_err("cancelled");

    assert_eq!(failure.error.kind(), ErrorKind::Cancelled);
    assert_eq!(failure.run.state, RunState::Failed);
    assert_eq!(failure.run.rows_written(), 0);
}

#[tokio::test]
async fn cyclic_schema_stops_while_resolving() {
    let dir = temp_out_dir("cycle");
    let table = |name: &str, parent: &str| {
        json!({
            "name": name,
            "primary_key": "id",
            "columns": [
                {"name": "id", "type": "integer"},
                {"name": "parent_id", "type": "reference"}
            ],
            "relationships": [
                {"column": "parent_id", "references": {"table": parent, "column": "id"}}
            ]
        })
    };
    let schema = write_schema(
        &dir,
        json!({"name": "loop", "tables": [table("a", "b"), table("b", "a")]}),
    );

    let failure = Orchestrator::new(SeedConfig {
        dry_run: true,
        ..SeedConfig::new(schema)
    })
    .run(&StopSignal::new())
    .await
    .expect_err("cycle");

    assert_eq!(failure.error.kind(), ErrorKind::CyclicDependency);
    assert!(failure.run.seed_generated);
    assert_eq!(
        failure.run.transitions,
        vec![
            RunState::Idle,
            RunState::Loading,
            RunState::Resolving,
            RunState::Failed
        ]
    );
}

#[test]
fn preview_lists_parents_before_children() {
    let mut config = SeedConfig::new(retail_orders());
    config.seed = Some(5);
    config.table_rows.insert("orders".to_string(), 25);
    let plan = Orchestrator::new(config).preview().expect("plan");

    assert_eq!(plan.schema, "retail-orders");
    assert_eq!(plan.order, vec!["customers", "orders"]);
    assert_eq!(plan.tables[1].rows, 25);
    assert_eq!(plan.tables[1].parents, vec!["customers"]);
    assert!(!plan.seed_generated);
}

#[test]
fn preview_rejects_overrides_for_unknown_tables() {
    let mut config = SeedConfig::new(retail_orders());
    config.table_rows.insert("invoices".to_string(), 5);
    let err = Orchestrator::new(config).preview().expect_err("unknown table");
    assert_eq!(err.kind(), ErrorKind::Config);
}
