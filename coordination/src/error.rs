//! Top-level error type for the coordination engine.

use crate::boundary::{CheckerError, FileBoundaryError};
use crate::catalog::CatalogError;
use crate::convergence::IllegalTransition;
use crate::learning::LearningError;

/// Failures that stop a run or prevent one from starting.
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error("checker failed on iteration {iteration}: {source}")]
    Checker {
        iteration: u32,
        #[source]
        source: CheckerError,
    },

    #[error("file boundary failed on iteration {iteration} for issue {issue_id}: {source}")]
    FileBoundary {
        iteration: u32,
        issue_id: String,
        #[source]
        source: FileBoundaryError,
    },

    #[error("wall-clock budget of {budget_secs}s exceeded during iteration {iteration}")]
    BudgetExceeded { iteration: u32, budget_secs: u64 },

    #[error("no fixer registered for agents: {}", .0.join(", "))]
    MissingFixers(Vec<String>),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Learning(#[from] LearningError),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

/// Result type alias for coordination operations.
pub type CoordinationResult<T> = Result<T, CoordinationError>;
