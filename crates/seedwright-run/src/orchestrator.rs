//! Seeding pipeline: load, resolve, generate concurrently, write in order.
//!
//! A dispatcher walks the resolution order and starts one worker per table
//! once a permit is free. Workers wait on their parents' key barriers, then
//! generate rows on the blocking pool and push batches into a bounded
//! channel. The writer drains those channels strictly in resolution order,
//! so the sink always sees parent rows before child rows.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use seedwright_core::{load_schema_file, resolve_order, ResolvedOrder, SchemaDefinition};
use seedwright_generate::{
    random_run_seed, GenerationError, GenerationOptions, ParentKeys, ParentSets, RecordSet,
    RowTargets, StopSignal, TableGenerator, TableOutcome, TableReport,
};
use seedwright_sink::{open_sink, SeedSink, SinkConfig, SinkContext, SinkSummary};

use crate::config::SeedConfig;
use crate::error::SeedError;
use crate::result::{RunErrorRecord, RunFailure, SeedRun, TableRun};
use crate::state::{RunState, RunStateMachine};

type KeysSlot = Option<Arc<ParentKeys>>;

/// What a run would do, without generating anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunPlan {
    pub schema: String,
    pub seed: u64,
    pub seed_generated: bool,
    pub order: Vec<String>,
    /// Tables grouped by dependency depth; a group may run concurrently.
    pub groups: Vec<Vec<String>>,
    pub tables: Vec<PlannedTable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTable {
    pub table: String,
    pub rows: u64,
    pub parents: Vec<String>,
}

pub struct Orchestrator {
    config: SeedConfig,
}

impl Orchestrator {
    pub fn new(config: SeedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SeedConfig {
        &self.config
    }

    /// Load and resolve the schema and report the plan.
    pub fn preview(&self) -> Result<RunPlan, SeedError> {
        let schema = load_schema_file(&self.config.schema)?;
        let order = resolve_order(&schema)?;
        let targets = self.config.row_targets();
        check_overrides(&schema, &targets)?;
        let (seed, seed_generated) = self.resolve_seed();

        let tables = order
            .order
            .iter()
            .filter_map(|name| schema.table(name))
            .map(|table| PlannedTable {
                table: table.name.clone(),
                rows: targets.rows_for(table),
                parents: order.parents_of(&table.name).map(str::to_string).collect(),
            })
            .collect();
        Ok(RunPlan {
            schema: schema.name.clone(),
            seed,
            seed_generated,
            groups: order.independent_groups(),
            order: order.order.clone(),
            tables,
        })
    }

    /// Run against the sink named in the configuration.
    pub async fn run(&self, stop: &StopSignal) -> Result<SeedRun, RunFailure> {
        self.run_inner(None, stop).await
    }

    /// Run against a caller-provided sink; `dry_run` and the configured sink
    /// are ignored.
    pub async fn run_with_sink(
        &self,
        sink: Box<dyn SeedSink>,
        stop: &StopSignal,
    ) -> Result<SeedRun, RunFailure> {
        self.run_inner(Some(sink), stop).await
    }

    async fn run_inner(
        &self,
        sink: Option<Box<dyn SeedSink>>,
        stop: &StopSignal,
    ) -> Result<SeedRun, RunFailure> {
        let run_id = Uuid::new_v4();
        let (seed, seed_generated) = self.resolve_seed();
        let sink_config = self.config.effective_sink();
        let mut recorder = RunRecorder::new(run_id, seed, seed_generated, &self.config, &sink_config);
        if let Some(sink) = &sink {
            recorder.run.sink = sink.kind();
            recorder.run.destination = None;
        }
        let stop = match self.config.timeout() {
            Some(timeout) => stop.child_with_timeout(timeout),
            None => stop.child(),
        };

        info!(
            run_id = %run_id,
            seed,
            seed_generated,
            sink = %recorder.run.sink,
            dry_run = self.config.dry_run,
            "seeding run started"
        );

        match self
            .execute(&mut recorder, sink, &sink_config, seed, &stop)
            .await
        {
            Ok(()) => {
                let run = recorder.finish();
                info!(
                    run_id = %run.run_id,
                    rows = run.rows_written(),
                    elapsed_ms = run.elapsed_ms,
                    "seeding run completed"
                );
                Ok(run)
            }
            Err(error) => {
                recorder.fail(&error);
                let run = recorder.finish();
                warn!(
                    run_id = %run.run_id,
                    kind = %error.kind(),
                    error = %error,
                    elapsed_ms = run.elapsed_ms,
                    "seeding run failed"
                );
                Err(RunFailure { run, error })
            }
        }
    }

    async fn execute(
        &self,
        recorder: &mut RunRecorder,
        sink: Option<Box<dyn SeedSink>>,
        sink_config: &SinkConfig,
        seed: u64,
        stop: &StopSignal,
    ) -> Result<(), SeedError> {
        recorder.advance(RunState::Loading)?;
        if sink.is_some() {
            self.config.validate_pipeline()?;
        } else {
            self.config.validate()?;
        }
        let schema = load_schema_file(&self.config.schema)?;
        recorder.run.schema = Some(schema.name.clone());
        info!(schema = %schema.name, tables = schema.tables.len(), "schema loaded");

        recorder.advance(RunState::Resolving)?;
        let order = resolve_order(&schema)?;
        let targets = self.config.row_targets();
        check_overrides(&schema, &targets)?;
        recorder.run.tables = order
            .order
            .iter()
            .filter_map(|name| schema.table(name))
            .map(|table| TableRun {
                table: table.name.clone(),
                rows_requested: targets.rows_for(table),
                rows_written: 0,
                retries: 0,
                duration_ms: 0,
            })
            .collect();
        info!(order = ?order.order, "dependency order resolved");

        recorder.advance(RunState::Generating)?;
        let mut sink = match sink {
            Some(sink) => sink,
            None => {
                let context = SinkContext {
                    schema: schema.name.clone(),
                    seed,
                };
                open_sink(sink_config, &context).await?
            }
        };

        let schema = Arc::new(schema);
        if let Err(error) = self
            .generate_and_write(schema, &order, &targets, seed, sink.as_mut(), stop, recorder)
            .await
        {
            abort_sink(sink.as_mut(), &error).await;
            return Err(error);
        }

        recorder.advance(RunState::Writing)?;
        let summary = match sink.finalize().await {
            Ok(summary) => summary,
            Err(error) => {
                let error = SeedError::from(error);
                abort_sink(sink.as_mut(), &error).await;
                return Err(error);
            }
        };
        recorder.apply_summary(&summary);
        recorder.advance(RunState::Completed)
    }

    #[allow(clippy::too_many_arguments)]
    async fn generate_and_write(
        &self,
        schema: Arc<SchemaDefinition>,
        order: &ResolvedOrder,
        targets: &RowTargets,
        seed: u64,
        sink: &mut dyn SeedSink,
        stop: &StopSignal,
        recorder: &mut RunRecorder,
    ) -> Result<(), SeedError> {
        let run_stop = stop.child();
        let failure = Arc::new(FirstFailure::default());
        let workers = self.config.effective_workers();
        let semaphore = Arc::new(Semaphore::new(workers));
        let settings = WorkerSettings {
            seed,
            options: self.config.generation_options(),
            batch_size: self.config.batch_size,
        };

        let mut barriers = BTreeMap::new();
        let mut publishers = BTreeMap::new();
        for name in &order.order {
            let (publisher, barrier) = watch::channel::<KeysSlot>(None);
            publishers.insert(name.clone(), publisher);
            barriers.insert(name.clone(), barrier);
        }

        let mut jobs = Vec::with_capacity(order.len());
        let mut streams = Vec::with_capacity(order.len());
        for name in &order.order {
            let table = schema.table(name).ok_or_else(|| {
                SeedError::Internal(format!("resolved table '{name}' is not in the schema"))
            })?;
            let publisher = publishers.remove(name).ok_or_else(|| {
                SeedError::Internal(format!("table '{name}' appears twice in the order"))
            })?;
            let parents = order
                .parents_of(name)
                .filter_map(|parent| {
                    barriers
                        .get(parent)
                        .map(|barrier| (parent.to_string(), barrier.clone()))
                })
                .collect();
            let (batches, receiver) = mpsc::channel(self.config.channel_depth.max(1));
            let (done, done_receiver) = oneshot::channel();
            jobs.push(TableJob {
                table: name.clone(),
                rows: targets.rows_for(table),
                parents,
                publisher,
                batches,
                done,
            });
            streams.push(TableStream {
                table: name.clone(),
                batches: receiver,
                done: done_receiver,
            });
        }
        drop(barriers);

        debug!(workers, tables = jobs.len(), "dispatching table workers");
        let dispatcher = tokio::spawn(dispatch(
            jobs,
            Arc::clone(&schema),
            settings,
            semaphore,
            run_stop.clone(),
            Arc::clone(&failure),
        ));

        drain(streams, sink, recorder, &run_stop, &failure).await;

        if let Err(err) = dispatcher.await {
            failure.record(SeedError::Internal(format!("dispatcher failed: {err}")));
        }
        match failure.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn resolve_seed(&self) -> (u64, bool) {
        match self.config.seed {
            Some(seed) => (seed, false),
            None => (random_run_seed(), true),
        }
    }
}

async fn abort_sink(sink: &mut dyn SeedSink, error: &SeedError) {
    if let Err(abort_error) = sink.abort(&error.to_string()).await {
        warn!(error = %abort_error, "sink abort failed");
    }
}

fn check_overrides(schema: &SchemaDefinition, targets: &RowTargets) -> Result<(), SeedError> {
    let unknown: Vec<&str> = targets
        .overrides
        .keys()
        .map(String::as_str)
        .filter(|name| schema.table(name).is_none())
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(SeedError::Config(format!(
            "row overrides name unknown tables: {}",
            unknown.join(", ")
        )))
    }
}

/// Keeps the first error that caused the run to fail. An error that only
/// follows from another failure is replaced by the cause when it arrives.
#[derive(Default)]
struct FirstFailure {
    error: Mutex<Option<SeedError>>,
}

impl FirstFailure {
    fn record(&self, error: SeedError) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        let replace = match slot.as_ref() {
            None => true,
            Some(current) => current.is_secondary() && !error.is_secondary(),
        };
        if replace {
            *slot = Some(error);
        }
    }

    fn take(&self) -> Option<SeedError> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[derive(Debug, Clone)]
struct WorkerSettings {
    seed: u64,
    options: GenerationOptions,
    batch_size: usize,
}

struct TableJob {
    table: String,
    rows: u64,
    parents: Vec<(String, watch::Receiver<KeysSlot>)>,
    publisher: watch::Sender<KeysSlot>,
    batches: mpsc::Sender<RecordSet>,
    done: oneshot::Sender<Option<TableReport>>,
}

struct TableStream {
    table: String,
    batches: mpsc::Receiver<RecordSet>,
    done: oneshot::Receiver<Option<TableReport>>,
}

async fn dispatch(
    jobs: Vec<TableJob>,
    schema: Arc<SchemaDefinition>,
    settings: WorkerSettings,
    semaphore: Arc<Semaphore>,
    stop: StopSignal,
    failure: Arc<FirstFailure>,
) {
    let mut workers = Vec::with_capacity(jobs.len());
    for job in jobs {
        let permit = if stop.is_stopped() {
            None
        } else {
            Arc::clone(&semaphore).acquire_owned().await.ok()
        };
        let Some(permit) = permit.filter(|_| !stop.is_stopped()) else {
            failure.record(GenerationError::Cancelled { table: job.table }.into());
            break;
        };
        workers.push(tokio::spawn(run_table(
            job,
            Arc::clone(&schema),
            settings.clone(),
            stop.clone(),
            Arc::clone(&failure),
            permit,
        )));
    }

    for worker in workers {
        if let Err(err) = worker.await {
            failure.record(SeedError::Internal(format!("table worker failed: {err}")));
            stop.stop();
        }
    }
}

async fn run_table(
    job: TableJob,
    schema: Arc<SchemaDefinition>,
    settings: WorkerSettings,
    stop: StopSignal,
    failure: Arc<FirstFailure>,
    permit: OwnedSemaphorePermit,
) {
    let TableJob {
        table,
        rows,
        parents,
        publisher,
        batches,
        done,
    } = job;

    let result = generate_table(&table, rows, parents, schema, settings, &stop, batches).await;
    drop(permit);

    match result {
        Ok(outcome) => {
            publisher.send_replace(Some(Arc::new(outcome.keys)));
            // The writer may already have stopped listening.
            let _ = done.send(Some(outcome.report));
        }
        Err(error) => {
            if !error.is_secondary() {
                warn!(table = %table, error = %error, "table generation failed");
            }
            failure.record(error);
            stop.stop();
            let _ = done.send(None);
        }
    }
}

async fn generate_table(
    table: &str,
    rows: u64,
    parents: Vec<(String, watch::Receiver<KeysSlot>)>,
    schema: Arc<SchemaDefinition>,
    settings: WorkerSettings,
    stop: &StopSignal,
    batches: mpsc::Sender<RecordSet>,
) -> Result<TableOutcome, SeedError> {
    let mut parent_sets = ParentSets::new();
    for (parent, mut barrier) in parents {
        let keys: KeysSlot = match barrier.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        let Some(keys) = keys else {
            return Err(GenerationError::ParentUnavailable {
                table: table.to_string(),
                parent,
            }
            .into());
        };
        parent_sets.insert(parent, keys);
    }
    debug!(table = %table, parents = parent_sets.len(), "parents ready");

    let name = table.to_string();
    let stop = stop.clone();
    let worker = tokio::task::spawn_blocking(move || -> Result<TableOutcome, GenerationError> {
        let definition = schema
            .table(&name)
            .ok_or_else(|| GenerationError::Generator {
                table: name.clone(),
                column: String::new(),
                message: "table is not part of the schema".to_string(),
            })?;
        let retain = schema.referenced_columns(&name);
        let mut generator = TableGenerator::new(
            definition,
            &parent_sets,
            settings.seed,
            rows,
            &settings.options,
            &retain,
        )?;
        while let Some(batch) = generator.next_batch(settings.batch_size, &stop)? {
            if batches.blocking_send(batch).is_err() {
                return Err(GenerationError::Cancelled { table: name });
            }
        }
        Ok(generator.finish())
    });

    let outcome = worker
        .await
        .map_err(|err| SeedError::Internal(format!("worker for '{table}' panicked: {err}")))??;
    info!(
        table = %table,
        rows_generated = outcome.report.rows_generated,
        retries = outcome.report.retries,
        duration_ms = outcome.report.duration_ms,
        "table generated"
    );
    Ok(outcome)
}

/// Write every table's batches in resolution order. Stops at the first
/// failure; the cause is left in `failure`.
async fn drain(
    streams: Vec<TableStream>,
    sink: &mut dyn SeedSink,
    recorder: &mut RunRecorder,
    stop: &StopSignal,
    failure: &FirstFailure,
) {
    for stream in streams {
        let TableStream {
            table,
            mut batches,
            done,
        } = stream;

        while let Some(batch) = batches.recv().await {
            match sink.write(&table, &batch).await {
                Ok(rows) => recorder.add_written(&table, rows),
                Err(error) => {
                    failure.record(error.into());
                    stop.stop();
                    return;
                }
            }
        }

        match done.await {
            Ok(Some(report)) => {
                recorder.apply_report(&report);
                info!(table = %table, rows = report.rows_generated, "table written");
            }
            _ => {
                stop.stop();
                return;
            }
        }
    }
}

struct RunRecorder {
    machine: RunStateMachine,
    run: SeedRun,
    timer: Instant,
}

impl RunRecorder {
    fn new(
        run_id: Uuid,
        seed: u64,
        seed_generated: bool,
        config: &SeedConfig,
        sink: &SinkConfig,
    ) -> Self {
        let destination = match sink {
            SinkConfig::DryRun => None,
            other => Some(other.describe()),
        };
        Self {
            machine: RunStateMachine::new(run_id.to_string()),
            run: SeedRun {
                run_id,
                schema: None,
                seed,
                seed_generated,
                sink: sink.kind(),
                destination,
                dry_run: config.dry_run,
                state: RunState::Idle,
                transitions: Vec::new(),
                tables: Vec::new(),
                started_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                elapsed_ms: 0,
                errors: Vec::new(),
            },
            timer: Instant::now(),
        }
    }

    fn advance(&mut self, next: RunState) -> Result<(), SeedError> {
        self.machine.advance(next)?;
        self.run.state = next;
        Ok(())
    }

    fn table_mut(&mut self, table: &str) -> Option<&mut TableRun> {
        self.run.tables.iter_mut().find(|entry| entry.table == table)
    }

    fn add_written(&mut self, table: &str, rows: u64) {
        if let Some(entry) = self.table_mut(table) {
            entry.rows_written += rows;
        }
    }

    fn apply_report(&mut self, report: &TableReport) {
        if let Some(entry) = self.table_mut(&report.table) {
            entry.retries = report.retries;
            entry.duration_ms = report.duration_ms;
        }
    }

    fn apply_summary(&mut self, summary: &SinkSummary) {
        for entry in &mut self.run.tables {
            entry.rows_written = summary.tables.get(&entry.table).copied().unwrap_or_default();
        }
        if summary.destination.is_some() {
            self.run.destination = summary.destination.clone();
        }
    }

    fn fail(&mut self, error: &SeedError) {
        if !self.machine.state().is_terminal() {
            if let Err(err) = self.advance(RunState::Failed) {
                warn!(error = %err, "could not record failed state");
            }
        }
        self.run.errors.push(RunErrorRecord::from(error));
    }

    fn finish(mut self) -> SeedRun {
        self.run.transitions = self.machine.history().to_vec();
        self.run.elapsed_ms = self.timer.elapsed().as_millis() as u64;
        self.run
    }
}
