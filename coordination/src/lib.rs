//! Remedy Coordination Library
//!
//! Multi-agent routing and convergence engine for automated code
//! remediation. Analysis tools report issues; each issue is scored against
//! a catalog of agent skills, dispatched to one or more fixing agents, and
//! every proposed patch passes a validation gate before it touches a file.
//! The loop repeats until a check comes back clean or progress stops.
//!
//! # Components
//!
//! ```text
//! ConvergenceLoop ──► Checker::run_checks
//!       │
//!       ├──► SkillRouter::route ──► ConfidenceScorer × SkillCatalog
//!       │          ▲                      (adjusted by EffectivenessStore)
//!       │          │
//!       └──► FixExecutor::execute ──► Fixer::propose_fix
//!                  │                        │
//!                  │                  ValidationGate (PatchEngine, SyntaxCheck)
//!                  │                        │
//!                  └──► FileBoundary::write, EffectivenessStore::record
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let result = remedy_coordination::run(catalog, EngineConfig::default(), collaborators).await?;
//! std::process::exit(result.exit_code());
//! ```

pub mod boundary;
pub mod catalog;
pub mod config;
pub mod convergence;
pub mod error;
pub mod executor;
pub mod fakes;
pub mod issue;
pub mod learning;
pub mod patch;
pub mod router;
pub mod scoring;

pub use boundary::{
    CheckScope, Checker, CheckerError, FileBoundary, FileBoundaryError, FixProposal, Fixer,
    FixerError, FsFileBoundary, WriteOutcome,
};
pub use catalog::{Agent, CatalogError, Skill, SkillCatalog, SkillCategory};
pub use config::EngineConfig;
pub use convergence::{
    run, CheckStatus, Collaborators, ConvergenceLoop, ErrorContext, IterationRecord, LoopConfig,
    LoopState, TransitionRecord, WorkflowResult, WorkflowStatus,
};
pub use error::{CoordinationError, CoordinationResult};
pub use executor::{
    DelimiterBalance, ExecutorConfig, FixAttempt, FixExecutor, FixOutcome, FixerRegistry,
    SyntaxCheck, ValidationGate, ValidationResult,
};
pub use issue::{Issue, Severity};
pub use learning::{
    EffectivenessStore, InMemoryEffectivenessStore, JsonFileEffectivenessStore, LearningError,
    SkillEffectiveness,
};
pub use patch::{Hunk, Patch, PatchConfig, PatchEngine};
pub use router::{RouterConfig, RoutingDecision, SkillRouter, Strategy};
pub use scoring::{ConfidenceScorer, ScoringConfig};
