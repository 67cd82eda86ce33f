//! Iteration records and the workflow result.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::executor::{FixAttempt, FixOutcome};
use crate::issue::Issue;

use super::state::{LoopState, TransitionRecord};

/// How an iteration left its issue batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckStatus {
    /// Every issue in the batch had a fix applied.
    AllAddressed,
    /// Some issues carry over to the next check.
    Unresolved { remaining: usize },
}

/// One check→route→fix pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based, strictly increasing.
    pub iteration: u32,
    pub issues_in: usize,
    /// Issues with an applied fix.
    pub fixes_applied: usize,
    /// Issues left unresolved.
    pub fixes_failed: usize,
    pub duration_ms: u64,
    pub check_status: CheckStatus,
    pub outcomes: Vec<FixOutcome>,
}

impl IterationRecord {
    pub fn attempts(&self) -> impl Iterator<Item = &FixAttempt> {
        self.outcomes.iter().flat_map(|o| o.attempts.iter())
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Converged,
    Incomplete,
    NoProgress,
    MaxIterations,
    Error,
}

impl WorkflowStatus {
    /// Process exit code for this status.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Converged => 0,
            Self::NoProgress => 2,
            Self::MaxIterations => 3,
            Self::Error => 4,
            Self::Incomplete => 5,
        }
    }

    pub(crate) fn loop_state(self) -> LoopState {
        match self {
            Self::Converged => LoopState::Converged,
            Self::Incomplete => LoopState::Incomplete,
            Self::NoProgress => LoopState::NoProgress,
            Self::MaxIterations => LoopState::MaxIterations,
            Self::Error => LoopState::Error,
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::Incomplete => write!(f, "incomplete"),
            Self::NoProgress => write!(f, "no_progress"),
            Self::MaxIterations => write!(f, "max_iterations"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Where and why a run stopped with `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub message: String,
    pub iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
}

/// Everything a run produced, including partial results on error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub iterations: Vec<IterationRecord>,
    pub status: WorkflowStatus,
    pub total_duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorContext>,
    /// Issues still outstanding at termination.
    #[serde(default)]
    pub remaining_issues: Vec<Issue>,
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
}

impl WorkflowResult {
    pub fn total_applied(&self) -> usize {
        self.iterations.iter().map(|r| r.fixes_applied).sum()
    }

    pub fn attempts(&self) -> impl Iterator<Item = &FixAttempt> {
        self.iterations.iter().flat_map(IterationRecord::attempts)
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_distinct() {
        let statuses = [
            WorkflowStatus::Converged,
            WorkflowStatus::Incomplete,
            WorkflowStatus::NoProgress,
            WorkflowStatus::MaxIterations,
            WorkflowStatus::Error,
        ];
        let mut codes: Vec<i32> = statuses.iter().map(|s| s.exit_code()).collect();
        assert_eq!(codes[0], 0);
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), statuses.len());
    }

    #[test]
    fn test_check_status_serde() {
        let json = serde_json::to_value(CheckStatus::Unresolved { remaining: 3 }).unwrap();
        assert_eq!(json["status"], "unresolved");
        assert_eq!(json["remaining"], 3);
    }

    #[test]
    fn test_status_display_matches_serde() {
        let s = WorkflowStatus::MaxIterations;
        assert_eq!(serde_json::to_string(&s).unwrap(), format!("\"{s}\""));
    }
}
