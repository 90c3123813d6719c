use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use seedwright_generate::{GenerationOptions, RowTargets};
use seedwright_sink::SinkConfig;

use crate::error::SeedError;

/// Everything one seeding run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Path of the JSON schema document.
    pub schema: PathBuf,
    /// Rows for tables without their own `rows` or an override.
    pub default_rows: u64,
    /// Per-table row overrides.
    pub table_rows: BTreeMap<String, u64>,
    /// Run seed; a random one is drawn and reported when absent.
    pub seed: Option<u64>,
    pub sink: SinkConfig,
    /// Generate and count rows without writing or connecting anywhere.
    pub dry_run: bool,
    /// Concurrent table workers; 0 uses the available parallelism.
    pub workers: usize,
    pub max_attempts_row: u32,
    /// Rows per generated batch handed to the sink.
    pub batch_size: usize,
    /// Batches buffered per table before its worker waits for the writer.
    pub channel_depth: usize,
    /// Stop the run after this many milliseconds.
    pub timeout_ms: Option<u64>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            schema: PathBuf::new(),
            default_rows: 100,
            table_rows: BTreeMap::new(),
            seed: None,
            sink: SinkConfig::default(),
            dry_run: false,
            workers: 0,
            max_attempts_row: GenerationOptions::default().max_attempts_row,
            batch_size: 500,
            channel_depth: 4,
            timeout_ms: None,
        }
    }
}

impl SeedConfig {
    pub fn new(schema: impl Into<PathBuf>) -> Self {
        Self {
            schema: schema.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), SeedError> {
        self.validate_pipeline()?;
        if !self.dry_run {
            self.sink.validate()?;
        }
        Ok(())
    }

    /// Checks everything except the sink.
    pub fn validate_pipeline(&self) -> Result<(), SeedError> {
        if self.schema.as_os_str().is_empty() {
            return Err(SeedError::Config("schema path is required".to_string()));
        }
        if self.batch_size == 0 {
            return Err(SeedError::Config("batch_size must be at least 1".to_string()));
        }
        if self.channel_depth == 0 {
            return Err(SeedError::Config(
                "channel_depth must be at least 1".to_string(),
            ));
        }
        if self.max_attempts_row == 0 {
            return Err(SeedError::Config(
                "max_attempts_row must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn row_targets(&self) -> RowTargets {
        RowTargets {
            default_rows: self.default_rows,
            overrides: self.table_rows.clone(),
        }
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            max_attempts_row: self.max_attempts_row,
        }
    }

    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(4)
    }

    /// Sink actually opened: a dry run never touches the configured one.
    pub fn effective_sink(&self) -> SinkConfig {
        if self.dry_run {
            SinkConfig::DryRun
        } else {
            self.sink.clone()
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedwright_sink::{ConnectionOptions, SinkKind};

    #[test]
    fn dry_run_replaces_the_configured_sink() {
        let mut config = SeedConfig::new("schemas/retail-orders.json");
        config.sink = SinkConfig::Connection(ConnectionOptions::new("postgres://localhost/shop"));
        config.dry_run = true;
        assert_eq!(config.effective_sink().kind(), SinkKind::DryRun);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let config = SeedConfig {
            batch_size: 0,
            ..SeedConfig::new("schema.json")
        };
        assert!(matches!(config.validate(), Err(SeedError::Config(_))));
    }
}
