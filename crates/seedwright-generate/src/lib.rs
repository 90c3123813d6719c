//! Deterministic row generation for Seedwright.
//!
//! Tables are generated in dependency order. Each column draws from its own
//! seeded stream, so a run seed fully determines every value, and children
//! only ever reference key values their parents actually produced.

pub mod audit;
pub mod engine;
pub mod errors;
pub mod generators;
pub mod model;
pub mod record;
pub mod rng;
pub mod stop;
pub mod value;

pub use audit::{audit_dataset, ConstraintStats, IntegrityReport, IntegritySummary, Violation};
pub use engine::{GenerationEngine, TableGenerator, TableOutcome};
pub use errors::GenerationError;
pub use generators::{FieldGenerator, RowContext};
pub use model::{GeneratedDataset, GenerationOptions, GenerationReport, RowTargets, TableReport};
pub use record::{GeneratedRecord, ParentKeys, ParentSets, RecordSet};
pub use rng::random_run_seed;
pub use stop::StopSignal;
pub use value::{GeneratedValue, ValueBound};
