use thiserror::Error;

use crate::types::GroupKind;

/// Coarse classification of a `SimError`, used by hosts to decide what to
/// keep on screen after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    State,
    Computation,
}

#[derive(Error, Debug)]
pub enum SimError {
    // ── Input ────────────────────────────────────────────────────────────────
    #[error("population is empty")]
    EmptyPopulation,

    #[error("malformed input at record {line}: {reason}")]
    MalformedInput { line: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── State ────────────────────────────────────────────────────────────────
    #[error("no population loaded")]
    NoPopulationLoaded,

    #[error("trial count must be at least 1, got {0}")]
    InvalidTrialCount(usize),

    #[error("summary was computed against baseline generation {actual}, current is {expected}")]
    StaleBaseline { expected: u64, actual: u64 },

    #[error("run cancelled after {completed} of {total} trials")]
    Cancelled { completed: usize, total: usize },

    #[error("run has already been aggregated; start a new one")]
    RunFinished,

    // ── Computation ──────────────────────────────────────────────────────────
    #[error("trial {trial} produced an invalid result: {reason}")]
    Computation { trial: usize, reason: String },

    #[error("baseline income for {group_kind} group '{group}' is zero")]
    ZeroBaselineIncome { group_kind: GroupKind, group: String },
}

impl SimError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SimError::EmptyPopulation
            | SimError::MalformedInput { .. }
            | SimError::Io(_)
            | SimError::Json(_) => ErrorCategory::Input,
            SimError::NoPopulationLoaded
            | SimError::InvalidTrialCount(_)
            | SimError::StaleBaseline { .. }
            | SimError::Cancelled { .. }
            | SimError::RunFinished => ErrorCategory::State,
            SimError::Computation { .. } | SimError::ZeroBaselineIncome { .. } => {
                ErrorCategory::Computation
            }
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;

/// Failures of the external insight collaborator. Always recoverable: callers
/// fall back to the offline summariser.
#[derive(Error, Debug)]
pub enum InsightError {
    #[error("insight service not configured")]
    Unavailable,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("service returned HTTP {0}")]
    Status(u16),

    #[error("service returned an error payload: {0}")]
    ErrorPayload(String),

    #[error("service returned no text")]
    EmptyResponse,
}
