//! Loop state machine with legal transition guards and an audit log.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Loop states. Every run starts at `Init` and ends in a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Init,
    Running,
    /// A check found zero issues.
    Converged,
    /// The caller cancelled the run.
    Incomplete,
    /// An iteration applied nothing while issues remained.
    NoProgress,
    /// The iteration budget ran out.
    MaxIterations,
    /// A collaborator failed or the wall-clock budget was exceeded.
    Error,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Init | Self::Running)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::Running => write!(f, "RUNNING"),
            Self::Converged => write!(f, "CONVERGED"),
            Self::Incomplete => write!(f, "INCOMPLETE"),
            Self::NoProgress => write!(f, "NO_PROGRESS"),
            Self::MaxIterations => write!(f, "MAX_ITERATIONS"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// ```text
/// Init    → Running | Incomplete | Error
/// Running → Converged | Incomplete | NoProgress | MaxIterations | Error
/// ```
fn is_legal_transition(from: LoopState, to: LoopState) -> bool {
    use LoopState::*;

    matches!(
        (from, to),
        (Init, Running)
            | (Init, Incomplete)
            | (Init, Error)
            | (Running, Converged)
            | (Running, Incomplete)
            | (Running, NoProgress)
            | (Running, MaxIterations)
            | (Running, Error)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: LoopState,
    pub to: LoopState,
    /// Iteration at the time of transition (0 before the first check).
    pub iteration: u32,
    /// Milliseconds since the machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Illegal loop transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: LoopState,
    pub to: LoopState,
}

/// Tracks the current loop state and every transition taken.
#[derive(Debug)]
pub struct LoopStateMachine {
    current: LoopState,
    iteration: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl LoopStateMachine {
    pub fn new() -> Self {
        Self {
            current: LoopState::Init,
            iteration: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> LoopState {
        self.current
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    pub fn advance(
        &mut self,
        to: LoopState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(
            from = %self.current,
            to = %to,
            iteration = self.iteration,
            "Loop transition"
        );
        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            iteration: self.iteration,
            elapsed_ms: u64::try_from(self.created_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn into_transitions(self) -> Vec<TransitionRecord> {
        self.transitions
    }
}

impl Default for LoopStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
