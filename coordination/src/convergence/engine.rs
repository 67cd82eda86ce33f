//! The convergence loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::boundary::{CheckScope, Checker, FileBoundary};
use crate::catalog::SkillCatalog;
use crate::config::EngineConfig;
use crate::error::{CoordinationError, CoordinationResult};
use crate::executor::{FixExecutor, FixOutcome, FixerRegistry, SyntaxCheck};
use crate::issue::{processing_order, Issue};
use crate::learning::EffectivenessStore;
use crate::router::SkillRouter;
use crate::scoring::ConfidenceScorer;

use super::record::{CheckStatus, ErrorContext, IterationRecord, WorkflowResult, WorkflowStatus};
use super::state::{LoopState, LoopStateMachine};

/// Iteration and time limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub max_iterations: u32,
    /// Overall wall-clock budget; exceeding it ends the run with `Error`.
    pub wall_clock_budget_secs: Option<u64>,
    /// Persist the learning store when the run ends.
    pub persist_learning: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            wall_clock_budget_secs: None,
            persist_learning: true,
        }
    }
}

impl LoopConfig {
    pub fn wall_clock_budget(&self) -> Option<Duration> {
        self.wall_clock_budget_secs.map(Duration::from_secs)
    }
}

/// External collaborators, constructed once per run by the caller.
#[derive(Clone)]
pub struct Collaborators {
    pub checker: Arc<dyn Checker>,
    pub fixers: FixerRegistry,
    pub files: Arc<dyn FileBoundary>,
    pub store: Arc<dyn EffectivenessStore>,
}

/// A fatal failure with the iteration and issue it happened on.
struct Failure {
    error: CoordinationError,
    iteration: u32,
    issue_id: Option<String>,
}

/// Iteration whose outcomes are still being collected.
struct OpenIteration {
    iteration: u32,
    started: Instant,
    issues: Vec<Issue>,
    outcomes: Vec<FixOutcome>,
}

/// Mutable progress shared with the driver so it survives budget expiry
/// and fatal errors.
#[derive(Default)]
struct Progress {
    iteration: u32,
    records: Vec<IterationRecord>,
    remaining: Vec<Issue>,
    open: Option<OpenIteration>,
}

impl Progress {
    fn open(&mut self, iteration: u32, started: Instant, issues: Vec<Issue>) {
        self.open = Some(OpenIteration {
            iteration,
            started,
            outcomes: Vec::with_capacity(issues.len()),
            issues,
        });
    }

    fn push_outcome(&mut self, outcome: FixOutcome) {
        if let Some(open) = self.open.as_mut() {
            open.outcomes.push(outcome);
        }
    }

    /// Record the open iteration, if any. Issues without an outcome count
    /// as unresolved. Returns `(applied, unresolved)`.
    fn close(&mut self) -> Option<(usize, usize)> {
        let open = self.open.take()?;
        let fixed = open.outcomes.iter().filter(|o| o.is_fixed()).count();
        let unresolved = open.issues.len() - fixed;
        self.remaining = open
            .issues
            .iter()
            .enumerate()
            .filter(|(i, _)| !open.outcomes.get(*i).is_some_and(|o| o.is_fixed()))
            .map(|(_, issue)| issue.clone())
            .collect();
        self.records.push(IterationRecord {
            iteration: open.iteration,
            issues_in: open.issues.len(),
            fixes_applied: fixed,
            fixes_failed: unresolved,
            duration_ms: millis(open.started),
            check_status: if unresolved == 0 {
                CheckStatus::AllAddressed
            } else {
                CheckStatus::Unresolved {
                    remaining: unresolved,
                }
            },
            outcomes: open.outcomes,
        });
        Some((fixed, unresolved))
    }

    /// Record an interrupted iteration if it completed any outcome;
    /// otherwise its issues all remain.
    fn close_interrupted(&mut self) {
        match self.open.take() {
            Some(open) if !open.outcomes.is_empty() => {
                self.open = Some(open);
                self.close();
            }
            Some(open) => self.remaining = open.issues,
            None => {}
        }
    }
}

enum Stop {
    Finished(Result<WorkflowStatus, Failure>),
    OutOfTime,
}

/// Drives check → route → fix → recheck until a terminal state.
pub struct ConvergenceLoop {
    router: SkillRouter,
    executor: FixExecutor,
    checker: Arc<dyn Checker>,
    store: Arc<dyn EffectivenessStore>,
    scope: CheckScope,
    config: LoopConfig,
    cancel: CancellationToken,
}

impl ConvergenceLoop {
    /// Wire the router and executor from one catalog and one learning store.
    ///
    /// Fails if the configuration is invalid or any catalog agent lacks a
    /// fixer.
    pub fn new(
        catalog: Arc<SkillCatalog>,
        config: EngineConfig,
        collaborators: Collaborators,
    ) -> CoordinationResult<Self> {
        config.validate()?;
        let missing = collaborators.fixers.missing(&catalog);
        if !missing.is_empty() {
            return Err(CoordinationError::MissingFixers(missing));
        }

        let router = SkillRouter::new(
            Arc::clone(&catalog),
            ConfidenceScorer::new(config.scoring.clone()),
            Arc::clone(&collaborators.store),
            config.routing(),
        );
        let executor = FixExecutor::new(
            &catalog,
            collaborators.fixers,
            collaborators.files,
            Arc::clone(&collaborators.store),
            config.executor,
        );

        Ok(Self {
            router,
            executor,
            checker: collaborators.checker,
            store: collaborators.store,
            scope: CheckScope::default(),
            config: config.convergence,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_scope(mut self, scope: CheckScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_syntax_check(mut self, syntax: Arc<dyn SyntaxCheck>) -> Self {
        self.executor = self.executor.with_syntax_check(syntax);
        self
    }

    pub fn router(&self) -> &SkillRouter {
        &self.router
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run to a terminal state. Never fails: fatal errors yield a partial
    /// result with status `Error` and an [`ErrorContext`].
    ///
    /// Cancellation is observed between issues, so an issue already being
    /// fixed finishes and is recorded. The wall-clock budget preempts; the
    /// interrupted iteration is recorded with the outcomes it completed.
    #[instrument(skip_all, fields(max_iterations = self.config.max_iterations))]
    pub async fn run(&self) -> WorkflowResult {
        let started = Instant::now();
        let mut machine = LoopStateMachine::new();
        let mut progress = Progress::default();

        if self.cancel.is_cancelled() {
            self.transition(&mut machine, LoopState::Incomplete, "cancelled before start");
            return self.finish(started, machine, progress, WorkflowStatus::Incomplete, None);
        }
        self.transition(&mut machine, LoopState::Running, "starting");

        let budget = self.config.wall_clock_budget();
        let stop = {
            let drive = self.drive(&mut progress);
            let out_of_time = async {
                match budget {
                    Some(b) => tokio::time::sleep(b).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                result = drive => Stop::Finished(result),
                _ = out_of_time => Stop::OutOfTime,
            }
        };

        progress.close_interrupted();
        machine.set_iteration(progress.iteration);
        let (status, error) = match stop {
            Stop::Finished(Ok(status)) => (status, None),
            Stop::Finished(Err(failure)) => (WorkflowStatus::Error, Some(failure)),
            Stop::OutOfTime => (
                WorkflowStatus::Error,
                Some(Failure {
                    error: CoordinationError::BudgetExceeded {
                        iteration: progress.iteration,
                        budget_secs: self.config.wall_clock_budget_secs.unwrap_or_default(),
                    },
                    iteration: progress.iteration,
                    issue_id: None,
                }),
            ),
        };

        let reason = match &error {
            Some(failure) => failure.error.to_string(),
            None => format!("{status} after {} iteration(s)", progress.records.len()),
        };
        self.transition(&mut machine, status.loop_state(), &reason);
        self.finish(started, machine, progress, status, error)
    }

    async fn drive(&self, progress: &mut Progress) -> Result<WorkflowStatus, Failure> {
        for iteration in 1..=self.config.max_iterations {
            progress.iteration = iteration;
            if self.cancel.is_cancelled() {
                return Ok(WorkflowStatus::Incomplete);
            }

            let iteration_started = Instant::now();
            let mut issues = self
                .checker
                .run_checks(&self.scope.for_iteration(iteration))
                .await
                .map_err(|source| Failure {
                    error: CoordinationError::Checker { iteration, source },
                    iteration,
                    issue_id: None,
                })?;

            if issues.is_empty() {
                progress.remaining.clear();
                info!(iteration, "No issues remain");
                return Ok(WorkflowStatus::Converged);
            }

            processing_order(&mut issues);
            info!(iteration, issues = issues.len(), "Processing issues");
            progress.open(iteration, iteration_started, issues.clone());

            for issue in &issues {
                if self.cancel.is_cancelled() {
                    break;
                }
                let decision = self.router.route(issue);
                info!(
                    iteration,
                    issue_id = %issue.id,
                    strategy = %decision.strategy,
                    reasoning = %decision.reasoning,
                    "Routing decision"
                );
                let outcome = self
                    .executor
                    .execute(issue, &decision)
                    .await
                    .map_err(|source| Failure {
                        error: CoordinationError::FileBoundary {
                            iteration,
                            issue_id: issue.id.clone(),
                            source,
                        },
                        iteration,
                        issue_id: Some(issue.id.clone()),
                    })?;
                progress.push_outcome(outcome);
            }

            let (fixed, unresolved) = progress.close().unwrap_or((0, issues.len()));
            info!(iteration, applied = fixed, unresolved, "Iteration complete");

            if self.cancel.is_cancelled() {
                return Ok(WorkflowStatus::Incomplete);
            }
            if iteration == self.config.max_iterations {
                return Ok(WorkflowStatus::MaxIterations);
            }
            if fixed == 0 {
                warn!(iteration, unresolved, "No fix applied; stopping");
                return Ok(WorkflowStatus::NoProgress);
            }
        }
        Ok(WorkflowStatus::MaxIterations)
    }

    fn transition(&self, machine: &mut LoopStateMachine, to: LoopState, reason: &str) {
        if let Err(e) = machine.advance(to, Some(reason)) {
            warn!(error = %e, "Ignoring illegal loop transition");
        }
    }

    fn finish(
        &self,
        started: Instant,
        machine: LoopStateMachine,
        progress: Progress,
        status: WorkflowStatus,
        failure: Option<Failure>,
    ) -> WorkflowResult {
        if self.config.persist_learning {
            if let Err(e) = self.store.persist() {
                warn!(error = %e, "Failed to persist skill effectiveness");
            }
        }

        let error = failure.map(|f| ErrorContext {
            message: f.error.to_string(),
            iteration: f.iteration,
            issue_id: f.issue_id,
        });
        match &error {
            Some(ctx) => warn!(
                status = %status,
                iteration = ctx.iteration,
                error = %ctx.message,
                "Run finished"
            ),
            None => info!(
                status = %status,
                iterations = progress.records.len(),
                "Run finished"
            ),
        }

        WorkflowResult {
            iterations: progress.records,
            status,
            total_duration_ms: millis(started),
            error,
            remaining_issues: progress.remaining,
            transitions: machine.into_transitions(),
        }
    }
}

fn millis(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Build a loop and run it once.
pub async fn run(
    catalog: Arc<SkillCatalog>,
    config: EngineConfig,
    collaborators: Collaborators,
) -> CoordinationResult<WorkflowResult> {
    Ok(ConvergenceLoop::new(catalog, config, collaborators)?.run().await)
}
