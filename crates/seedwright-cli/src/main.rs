mod logging;

use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use seedwright_core::{
    build_dependency_report, load_schema_file, schema_document_json_schema, SchemaError,
};
use seedwright_run::{Orchestrator, SeedConfig, SeedError, StopSignal};
use seedwright_sink::{ConnectionOptions, FileSinkOptions, SinkConfig, SqlDialect};
use serde::Serialize;
use thiserror::Error;

use logging::{init_logging, LogOptions};

#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Seed(#[from] SeedError),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logging setup failed: {0}")]
    Logging(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Parser, Debug)]
#[command(name = "seedwright", version, about = "Seedwright synthetic data seeder")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
    /// Append logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate rows and write them to a sink.
    Seed(SeedArgs),
    /// Print the resolved plan without generating anything.
    Plan(SeedArgs),
    /// Validate a schema document and print its dependency report.
    Validate(ValidateArgs),
    /// Print the JSON Schema of the schema document format.
    SchemaJson,
}

#[derive(Args, Debug, Default)]
struct SeedArgs {
    /// TOML file with a full seeding configuration; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Schema document (JSON).
    #[arg(long)]
    schema: Option<PathBuf>,
    /// Run seed; random and reported when omitted.
    #[arg(long)]
    seed: Option<u64>,
    /// Rows for tables without their own count.
    #[arg(long)]
    rows: Option<u64>,
    /// Per-table row count, as TABLE=ROWS. Repeatable.
    #[arg(long = "table-rows", value_name = "TABLE=ROWS", value_parser = parse_table_rows)]
    table_rows: Vec<(String, u64)>,
    /// Generate and count rows without writing anything.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Concurrent table workers; 0 uses the available parallelism.
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    /// Stop the run after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Write a SQL seed file.
    #[arg(long, conflicts_with = "url")]
    out: Option<PathBuf>,
    /// SQL dialect of the seed file.
    #[arg(long, value_enum)]
    dialect: Option<DialectArg>,
    /// Database URL (postgres:// or mysql://).
    #[arg(long)]
    url: Option<String>,
    /// Password added to `--url` when it has none.
    #[arg(long, env = "SEEDWRIGHT_DB_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Schema document (JSON).
    schema: PathBuf,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum DialectArg {
    Postgres,
    Mysql,
}

impl From<DialectArg> for SqlDialect {
    fn from(value: DialectArg) -> Self {
        match value {
            DialectArg::Postgres => SqlDialect::Postgres,
            DialectArg::Mysql => SqlDialect::Mysql,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_logging(&LogOptions {
        json: cli.log_json,
        file: cli.log_file.clone(),
    })?;

    match cli.command {
        Command::Seed(args) => run_seed(args).await,
        Command::Plan(args) => run_plan(args),
        Command::Validate(args) => run_validate(args),
        Command::SchemaJson => print_json(&schema_document_json_schema()),
    }
}

async fn run_seed(args: SeedArgs) -> Result<(), CliError> {
    let config = build_config(args)?;
    let destination = config.effective_sink().describe();
    tracing::info!(
        event = "seed_started",
        schema = %config.schema.display(),
        destination = %destination
    );

    let stop = StopSignal::new();
    let interrupt = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(event = "interrupted", "stopping after the current rows");
            interrupt.stop();
        }
    });

    match Orchestrator::new(config).run(&stop).await {
        Ok(run) => {
            tracing::info!(event = "seed_finished", run_id = %run.run_id, rows = run.rows_written());
            print_json(&run)
        }
        Err(failure) => {
            print_json(&failure.run)?;
            Err(failure.error.into())
        }
    }
}

fn run_plan(args: SeedArgs) -> Result<(), CliError> {
    let config = build_config(args)?;
    let plan = Orchestrator::new(config).preview()?;
    print_json(&plan)
}

fn run_validate(args: ValidateArgs) -> Result<(), CliError> {
    let schema = load_schema_file(&args.schema)?;
    let report = build_dependency_report(&schema);
    tracing::info!(
        event = "schema_validated",
        schema = %schema.name,
        tables = report.summary.nodes,
        relationships = report.summary.edges
    );
    print_json(&report)?;
    match report.cycle {
        Some(tables) => Err(CliError::InvalidConfig(format!(
            "relationships form a cycle: {}",
            tables.join(", ")
        ))),
        None => Ok(()),
    }
}

/// Start from the TOML file (or defaults) and apply flag overrides.
fn build_config(args: SeedArgs) -> Result<SeedConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => toml::from_str::<SeedConfig>(&fs::read_to_string(path)?)?,
        None => SeedConfig::default(),
    };

    if let Some(schema) = args.schema {
        config.schema = schema;
    }
    if config.schema.as_os_str().is_empty() {
        return Err(CliError::InvalidConfig(
            "a schema is required (--schema or `schema` in --config)".to_string(),
        ));
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(rows) = args.rows {
        config.default_rows = rows;
    }
    config.table_rows.extend(args.table_rows);
    config.dry_run |= args.dry_run;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = Some(timeout_ms);
    }

    if let Some(path) = args.out {
        let mut options = FileSinkOptions::new(path);
        if let Some(dialect) = args.dialect {
            options.dialect = dialect.into();
        }
        config.sink = SinkConfig::File(options);
    } else if let Some(url) = args.url {
        let url = match &args.password {
            Some(password) => with_password(&url, password),
            None => url,
        };
        config.sink = SinkConfig::Connection(ConnectionOptions::new(url));
    } else if let (Some(dialect), SinkConfig::File(options)) = (args.dialect, &mut config.sink) {
        options.dialect = dialect.into();
    }

    tracing::debug!(event = "config_resolved", sink = %config.sink.describe());
    Ok(config)
}

fn parse_table_rows(value: &str) -> Result<(String, u64), String> {
    let (table, rows) = value
        .split_once('=')
        .ok_or_else(|| format!("expected TABLE=ROWS, got '{value}'"))?;
    let table = table.trim();
    if table.is_empty() {
        return Err(format!("missing table name in '{value}'"));
    }
    let rows = rows
        .trim()
        .parse::<u64>()
        .map_err(|err| format!("invalid row count in '{value}': {err}"))?;
    Ok((table.to_string(), rows))
}

/// Insert `password` into a URL whose user info has none.
fn with_password(url: &str, password: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((userinfo, host)) = rest.split_once('@') else {
        return url.to_string();
    };
    if userinfo.contains(':') {
        return url.to_string();
    }
    format!("{scheme}://{userinfo}:{password}@{host}")
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_table_rows() {
        assert_eq!(
            parse_table_rows("orders=25"),
            Ok(("orders".to_string(), 25))
        );
        assert!(parse_table_rows("orders").is_err());
        assert!(parse_table_rows("=3").is_err());
        assert!(parse_table_rows("orders=many").is_err());
    }

    #[test]
    fn password_fills_missing_userinfo_only() {
        assert_eq!(
            with_password("postgres://seed@db:5432/shop", "s3cret"),
            "postgres://seed:s3cret@db:5432/shop"
        );
        assert_eq!(
            with_password("postgres://seed:other@db/shop", "s3cret"),
            "postgres://seed:other@db/shop"
        );
        assert_eq!(with_password("postgres://db/shop", "s3cret"), "postgres://db/shop");
    }

    #[test]
    fn flags_override_the_config_file() {
        let dir = std::env::temp_dir().join(format!("seedwright_cli_{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("seed.toml");
        fs::write(
            &path,
            r#"
schema = "schemas/retail-orders.json"
default_rows = 10
seed = 1

[table_rows]
customers = 5

[sink]
kind = "file"
path = "out.sql"
dialect = "mysql"
"#,
        )
        .expect("write config");

        let config = build_config(SeedArgs {
            config: Some(path),
            seed: Some(99),
            table_rows: vec![("orders".to_string(), 7)],
            url: Some("postgres://seed@localhost/shop".to_string()),
            password: Some("pw".to_string()),
            ..SeedArgs::default()
        })
        .expect("config");

        assert_eq!(config.seed, Some(99));
        assert_eq!(config.default_rows, 10);
        assert_eq!(config.table_rows.get("customers"), Some(&5));
        assert_eq!(config.table_rows.get("orders"), Some(&7));
        match &config.sink {
            SinkConfig::Connection(options) => {
                assert_eq!(options.url, "postgres://seed:pw@localhost/shop")
            }
            other => panic!("unexpected sink {other:?}"),
        }
    }

    #[test]
    fn schema_is_required() {
        let err = build_config(SeedArgs::default()).expect_err("no schema");
        assert!(matches!(err, CliError::InvalidConfig(_)));
    }
}
