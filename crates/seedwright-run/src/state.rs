use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SeedError;

/// Lifecycle of a seeding run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Loading,
    Resolving,
    Generating,
    /// Final flush or commit of the sink.
    Writing,
    Completed,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Resolving => "resolving",
            Self::Generating => "generating",
            Self::Writing => "writing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        match (self, next) {
            (Self::Idle, Self::Loading)
            | (Self::Loading, Self::Resolving)
            | (Self::Resolving, Self::Generating)
            | (Self::Generating, Self::Writing)
            | (Self::Writing, Self::Completed) => true,
            (current, Self::Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guards the run lifecycle; every accepted transition is logged and kept.
#[derive(Debug, Clone)]
pub struct RunStateMachine {
    run_id: String,
    state: RunState,
    history: Vec<RunState>,
}

impl RunStateMachine {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            state: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn advance(&mut self, next: RunState) -> Result<(), SeedError> {
        if !self.state.can_transition_to(next) {
            return Err(SeedError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        info!(run_id = %self.run_id, from = %self.state, to = %next, "run state changed");
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}
