//! Convergence Loop — check → route → fix → recheck until terminal
//!
//! ```text
//! INIT ─► RUNNING ─┬─► CONVERGED       check returned no issues
//!                  ├─► MAX_ITERATIONS  last permitted iteration finished
//!                  ├─► NO_PROGRESS     an iteration applied nothing
//!                  ├─► INCOMPLETE      caller cancelled
//!                  └─► ERROR           checker/file boundary failed, or budget exceeded
//! ```
//!
//! The iteration budget is checked before the progress test, so a final
//! iteration that applies nothing still ends as `MAX_ITERATIONS`.

pub mod engine;
pub mod record;
pub mod state;

pub use engine::{run, Collaborators, ConvergenceLoop, LoopConfig};
pub use record::{CheckStatus, ErrorContext, IterationRecord, WorkflowResult, WorkflowStatus};
pub use state::{IllegalTransition, LoopState, LoopStateMachine, TransitionRecord};
