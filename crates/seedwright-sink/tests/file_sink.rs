use std::fs;
use std::path::PathBuf;

use seedwright_generate::{GeneratedRecord, GeneratedValue, RecordSet};
use seedwright_sink::{
    file_is_complete, FileSink, FileSinkOptions, SeedSink, SinkContext, SinkKind, SqlDialect,
};

fn temp_out_dir(label: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("seedwright_sink_{label}_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp out dir");
    dir
}

fn context() -> SinkContext {
    SinkContext {
        schema: "retail-orders".to_string(),
        seed: 42,
    }
}

fn customers(ids: &[i64]) -> RecordSet {
    let mut set = RecordSet::new(
        "customers",
        vec!["id".into(), "name".into(), "vip".into()],
        Some(0),
    );
    for (position, id) in ids.iter().enumerate() {
        set.push(GeneratedRecord {
            id: position as u64 + 1,
            values: vec![
                GeneratedValue::Int(*id),
                GeneratedValue::Text(format!("O'Neil {id}")),
                if *id % 2 == 0 {
                    GeneratedValue::Bool(true)
                } else {
                    GeneratedValue::Null
                },
            ],
        });
    }
    set
}

#[tokio::test]
async fn finalized_file_ends_with_completion_marker() {
    let path = temp_out_dir("complete").join("seed.sql");
    let mut sink = FileSink::create(&FileSinkOptions::new(&path), &context())
        .await
        .expect("create");
    assert_eq!(sink.kind(), SinkKind::File);

    assert_eq!(sink.write("customers", &customers(&[1, 2])).await.expect("write"), 2);
    assert_eq!(sink.write("customers", &customers(&[3])).await.expect("write"), 1);
    assert!(!file_is_complete(&path).expect("read"));

    let summary = sink.finalize().await.expect("finalize");
    assert_eq!(summary.rows_written, 3);
    assert_eq!(summary.tables.get("customers"), Some(&3));
    assert!(file_is_complete(&path).expect("read"));

    let contents = fs::read_to_string(&path).expect("read seed file");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines[0], "-- seedwright seed file");
    assert_eq!(lines[1], "-- schema: retail-orders");
    assert_eq!(lines[2], "-- seed: 42");
    assert!(contents.contains("BEGIN;\nINSERT INTO \"customers\" (\"id\", \"name\", \"vip\") VALUES\n"));
    assert!(contents.contains("  (1, 'O''Neil 1', NULL),\n  (2, 'O''Neil 2', TRUE);"));
    assert_eq!(contents.matches("INSERT INTO").count(), 2);
    assert_eq!(lines[lines.len() - 2], "COMMIT;");
    assert_eq!(lines[lines.len() - 1], "-- seedwright:complete rows=3");
}

#[tokio::test]
async fn aborted_file_is_marked_incomplete() {
    let path = temp_out_dir("abort").join("seed.sql");
    let options = FileSinkOptions {
        path: path.clone(),
        dialect: SqlDialect::Mysql,
        transaction: true,
    };
    let mut sink = FileSink::create(&options, &context())
        .await
        .expect("create");
    sink.write("customers", &customers(&[7])).await.expect("write");
    sink.abort("constraint unsatisfiable\nfor orders.id").await.expect("abort");

    assert!(!file_is_complete(&path).expect("read"));
    let contents = fs::read_to_string(&path).expect("read seed file");
    assert!(contents.starts_with("-- seedwright seed file\n"));
    assert!(contents.contains("START TRANSACTION;"));
    assert!(contents.contains("(7, 'O\\'Neil 7', NULL)"));
    assert!(contents.ends_with(
        "ROLLBACK;\n-- seedwright:incomplete constraint unsatisfiable for orders.id\n"
    ));
    assert!(sink.write("customers", &customers(&[8])).await.is_err());
}

#[tokio::test]
async fn empty_batches_write_nothing() {
    let path = temp_out_dir("empty").join("seed.sql");
    let options = FileSinkOptions {
        path: path.clone(),
        dialect: SqlDialect::Postgres,
        transaction: false,
    };
    let mut sink = FileSink::create(&options, &context())
        .await
        .expect("create");
    assert_eq!(sink.write("customers", &customers(&[])).await.expect("write"), 0);
    sink.finalize().await.expect("finalize");

    let contents = fs::read_to_string(&path).expect("read seed file");
    assert!(!contents.contains("INSERT"));
    assert!(!contents.contains("BEGIN;"));
    assert!(file_is_complete(&path).expect("read"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sink_runs_inside_spawned_tasks() {
    let path = temp_out_dir("spawned").join("nested").join("seed.sql");
    let options = FileSinkOptions::new(&path);
    let summary = tokio::spawn(async move {
        let mut sink = FileSink::create(&options, &context()).await?;
        for id in 1..=5 {
            sink.write("customers", &customers(&[id])).await?;
        }
        sink.finalize().await
    })
    .await
    .expect("task joins")
    .expect("sink succeeds");

    assert_eq!(summary.rows_written, 5);
    assert_eq!(summary.destination.as_deref(), Some(path.display().to_string().as_str()));
    let contents = fs::read_to_string(&path).expect("read seed file");
    assert_eq!(contents.matches("INSERT INTO").count(), 5);
    assert!(file_is_complete(&path).expect("read"));
}
