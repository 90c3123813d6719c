//! Seeding runs: configuration, lifecycle and the concurrent pipeline that
//! connects generation to a sink.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod result;
pub mod state;

pub use config::SeedConfig;
pub use error::{ErrorKind, SeedError};
pub use orchestrator::{Orchestrator, PlannedTable, RunPlan};
pub use result::{RunErrorRecord, RunFailure, SeedRun, TableRun};
pub use state::{RunState, RunStateMachine};

pub use seedwright_generate::StopSignal;
