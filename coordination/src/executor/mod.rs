//! Fix Executor — carries out a routing decision
//!
//! ```text
//!                 read snapshot (fingerprinted)
//!                            │
//!     ┌──────────────────────┼─────────────────────────┐
//!  single / sequential / fallback                   parallel
//!  agents in order, each on the snapshot,       JoinSet fan-out (≤ max_parallel_agents),
//!  stop at the first applied attempt            collect all, then try passing attempts
//!                                               by confidence desc, agent order
//!     └──────────────────────┬─────────────────────────┘
//!                            │
//!        per-file lock ─► re-read ─► fingerprint changed? revalidate : reuse
//!                            │
//!                     FileBoundary::write
//! ```
//!
//! Every agent call runs under a timeout and through the validation gate.
//! Nothing that failed the gate ever reaches the file boundary. Only file
//! boundary errors escape; everything else is recorded on the attempt.

pub mod attempt;
pub mod locks;
pub mod validation;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::boundary::{FileBoundary, FileBoundaryError, Fixer, WriteOutcome};
use crate::catalog::SkillCatalog;
use crate::issue::Issue;
use crate::learning::EffectivenessStore;
use crate::patch::PatchConfig;
use crate::router::{RoutingDecision, Strategy};

pub use attempt::{clamp_confidence, FixAttempt, FixOutcome, ValidationResult};
pub use locks::FileLocks;
pub use validation::{DelimiterBalance, GateVerdict, Rejection, SyntaxCheck, ValidationGate};

/// Executor limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Per-invocation agent timeout.
    pub agent_timeout_secs: u64,
    /// Maximum removed + added lines per patch.
    pub max_diff_lines: usize,
    /// Issue ids whose patches may exceed `max_diff_lines`.
    pub approved_high_risk: Vec<String>,
    /// Concurrent agent invocations for a parallel decision.
    pub max_parallel_agents: usize,
    pub patch: PatchConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            agent_timeout_secs: 300,
            max_diff_lines: 50,
            approved_high_risk: Vec::new(),
            max_parallel_agents: 3,
            patch: PatchConfig::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }
}

/// Agent id → fixer.
#[derive(Clone, Default)]
pub struct FixerRegistry {
    fixers: HashMap<String, Arc<dyn Fixer>>,
}

impl FixerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, agent_id: impl Into<String>, fixer: Arc<dyn Fixer>) -> Self {
        self.insert(agent_id, fixer);
        self
    }

    pub fn insert(&mut self, agent_id: impl Into<String>, fixer: Arc<dyn Fixer>) {
        self.fixers.insert(agent_id.into(), fixer);
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<dyn Fixer>> {
        self.fixers.get(agent_id).cloned()
    }

    /// Catalog agents with no registered fixer, in declaration order.
    pub fn missing(&self, catalog: &SkillCatalog) -> Vec<String> {
        catalog
            .agents()
            .iter()
            .filter(|a| !self.fixers.contains_key(&a.id))
            .map(|a| a.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fixers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixers.is_empty()
    }
}

/// An attempt plus the content it would produce if applied.
struct Candidate {
    index: usize,
    attempt: FixAttempt,
    patched: Option<String>,
}

/// One agent invocation, owning everything it needs so it can be spawned.
struct AgentJob {
    index: usize,
    agent_id: String,
    skill_id: Option<String>,
    fixer: Option<Arc<dyn Fixer>>,
    slot: Option<Arc<Semaphore>>,
    issue: Arc<Issue>,
    content: Arc<str>,
    gate: Arc<ValidationGate>,
    timeout: Duration,
}

impl AgentJob {
    async fn run(self) -> Candidate {
        let mut attempt = FixAttempt::new(&self.agent_id, &self.issue.id, self.skill_id.as_deref());
        let started = Instant::now();

        let patched = match self.fixer {
            None => {
                attempt.validation = ValidationResult::fail([Rejection::GenerationError(format!(
                    "no fixer registered for agent {}",
                    self.agent_id
                ))]);
                None
            }
            Some(fixer) => {
                let _slot = match self.slot {
                    Some(slot) => slot.acquire_owned().await.ok(),
                    None => None,
                };
                let call = fixer.propose_fix(&self.issue, &self.content);
                match tokio::time::timeout(self.timeout, call).await {
                    Err(_) => {
                        attempt.validation = ValidationResult::fail([Rejection::Timeout]);
                        None
                    }
                    Ok(Err(e)) => {
                        attempt.validation =
                            ValidationResult::fail([Rejection::GenerationError(e.to_string())]);
                        None
                    }
                    Ok(Ok(proposal)) => {
                        attempt.confidence = clamp_confidence(proposal.confidence);
                        let verdict = self.gate.check(&self.issue, &self.content, &proposal.patch);
                        attempt.patch = Some(proposal.patch);
                        if verdict.passed() {
                            attempt.validation = ValidationResult::pass();
                            verdict.patched
                        } else {
                            attempt.validation = ValidationResult::fail(verdict.rejections);
                            None
                        }
                    }
                }
            }
        };

        attempt.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(
            agent = %attempt.agent_id,
            passed = attempt.validation.passed,
            reasons = ?attempt.validation.reasons,
            duration_ms = attempt.duration_ms,
            "Agent attempt finished"
        );

        Candidate {
            index: self.index,
            attempt,
            patched,
        }
    }
}

/// Invokes agents, validates their patches and applies the winner.
pub struct FixExecutor {
    fixers: FixerRegistry,
    files: Arc<dyn FileBoundary>,
    store: Arc<dyn EffectivenessStore>,
    gate: Arc<ValidationGate>,
    locks: FileLocks,
    agent_slots: HashMap<String, Arc<Semaphore>>,
    parallel: Arc<Semaphore>,
    config: ExecutorConfig,
}

impl FixExecutor {
    pub fn new(
        catalog: &SkillCatalog,
        fixers: FixerRegistry,
        files: Arc<dyn FileBoundary>,
        store: Arc<dyn EffectivenessStore>,
        config: ExecutorConfig,
    ) -> Self {
        let gate = ValidationGate::new(config.max_diff_lines, config.patch.clone())
            .with_approved_high_risk(config.approved_high_risk.iter().cloned());
        let agent_slots = catalog
            .agents()
            .iter()
            .map(|a| (a.id.clone(), Arc::new(Semaphore::new(a.max_concurrency.max(1)))))
            .collect();
        Self {
            fixers,
            files,
            store,
            gate: Arc::new(gate),
            locks: FileLocks::new(),
            agent_slots,
            parallel: Arc::new(Semaphore::new(config.max_parallel_agents.max(1))),
            config,
        }
    }

    /// Replace the default delimiter-balance syntax check.
    pub fn with_syntax_check(mut self, syntax: Arc<dyn SyntaxCheck>) -> Self {
        let gate = (*self.gate).clone().with_syntax_check(syntax);
        self.gate = Arc::new(gate);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Carry out `decision` for `issue`.
    ///
    /// Returns an error only when the file boundary fails; agent and
    /// validation failures are recorded on the returned attempts.
    #[instrument(skip_all, fields(issue_id = %issue.id, strategy = %decision.strategy))]
    pub async fn execute(
        &self,
        issue: &Issue,
        decision: &RoutingDecision,
    ) -> Result<FixOutcome, FileBoundaryError> {
        let snapshot: Arc<str> = Arc::from(self.files.read(&issue.file).await?);
        let fingerprint = blake3::hash(snapshot.as_bytes());
        let shared_issue = Arc::new(issue.clone());

        let mut candidates = match decision.strategy {
            Strategy::Parallel => {
                let mut candidates = self.run_parallel(decision, &shared_issue, &snapshot).await;
                let mut order: Vec<usize> = (0..candidates.len())
                    .filter(|&i| candidates[i].patched.is_some())
                    .collect();
                order.sort_by(|&a, &b| {
                    candidates[b]
                        .attempt
                        .confidence
                        .total_cmp(&candidates[a].attempt.confidence)
                        .then_with(|| candidates[a].index.cmp(&candidates[b].index))
                });
                for i in order {
                    if self.try_apply(issue, fingerprint, &mut candidates[i]).await? {
                        break;
                    }
                }
                candidates
            }
            Strategy::Single | Strategy::Sequential | Strategy::Fallback => {
                let mut candidates = Vec::with_capacity(decision.selected_agent_ids.len());
                for index in 0..decision.selected_agent_ids.len() {
                    let mut candidate = self
                        .job(index, decision, &shared_issue, &snapshot)
                        .run()
                        .await;
                    let applied = self.try_apply(issue, fingerprint, &mut candidate).await?;
                    candidates.push(candidate);
                    if applied {
                        break;
                    }
                }
                candidates
            }
        };

        // Final verdicts: stale and write-rejected attempts count as failures.
        candidates.sort_by_key(|c| c.index);
        for candidate in &candidates {
            if let Some(skill_id) = candidate.attempt.skill_id.as_deref() {
                self.store.record(skill_id, candidate.attempt.validation.passed);
            }
        }

        let attempts: Vec<FixAttempt> = candidates.into_iter().map(|c| c.attempt).collect();
        let applied_agent = attempts.iter().find(|a| a.applied).map(|a| a.agent_id.clone());
        match &applied_agent {
            Some(agent) => info!(agent = %agent, attempts = attempts.len(), "Fix applied"),
            None => warn!(attempts = attempts.len(), "No attempt applied; issue carries over"),
        }

        Ok(FixOutcome {
            issue_id: issue.id.clone(),
            strategy: decision.strategy,
            reasoning: decision.reasoning.clone(),
            attempts,
            applied_agent,
        })
    }

    fn job(
        &self,
        index: usize,
        decision: &RoutingDecision,
        issue: &Arc<Issue>,
        snapshot: &Arc<str>,
    ) -> AgentJob {
        let agent_id = decision.selected_agent_ids[index].clone();
        AgentJob {
            index,
            skill_id: decision.skill_for(index).map(str::to_string),
            fixer: self.fixers.get(&agent_id),
            slot: self.agent_slots.get(&agent_id).cloned(),
            agent_id,
            issue: Arc::clone(issue),
            content: Arc::clone(snapshot),
            gate: Arc::clone(&self.gate),
            timeout: self.config.agent_timeout(),
        }
    }

    /// Invoke every selected agent concurrently and wait for all of them.
    async fn run_parallel(
        &self,
        decision: &RoutingDecision,
        issue: &Arc<Issue>,
        snapshot: &Arc<str>,
    ) -> Vec<Candidate> {
        let mut join_set: JoinSet<Candidate> = JoinSet::new();
        for index in 0..decision.selected_agent_ids.len() {
            let job = self.job(index, decision, issue, snapshot);
            let sem = Arc::clone(&self.parallel);
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                job.run().await
            });
        }

        let mut candidates = Vec::with_capacity(decision.selected_agent_ids.len());
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => warn!(error = %e, "Agent task panicked"),
            }
        }
        candidates.sort_by_key(|c| c.index);
        candidates
    }

    /// Apply a passing candidate under the file's lock.
    ///
    /// If the file changed since the snapshot, the patch is re-validated
    /// against the current content and discarded as stale on failure.
    async fn try_apply(
        &self,
        issue: &Issue,
        snapshot: blake3::Hash,
        candidate: &mut Candidate,
    ) -> Result<bool, FileBoundaryError> {
        let Some(patched) = candidate.patched.take() else {
            return Ok(false);
        };

        let _guard = self.locks.acquire(&issue.file).await;
        let current = self.files.read(&issue.file).await?;

        let content = if blake3::hash(current.as_bytes()) == snapshot {
            patched
        } else {
            let revalidated = candidate
                .attempt
                .patch
                .as_ref()
                .map(|patch| self.gate.check(issue, &current, patch));
            match revalidated {
                Some(verdict) if verdict.passed() => match verdict.patched {
                    Some(content) => content,
                    None => return Ok(self.discard_stale(candidate)),
                },
                _ => return Ok(self.discard_stale(candidate)),
            }
        };

        match self.files.write(&issue.file, &content).await? {
            WriteOutcome::Written => {
                candidate.attempt.applied = true;
                Ok(true)
            }
            WriteOutcome::Rejected { reason } => {
                warn!(agent = %candidate.attempt.agent_id, %reason, "Write rejected");
                candidate.attempt.validation.reject(Rejection::WriteRejected(reason));
                Ok(false)
            }
        }
    }

    fn discard_stale(&self, candidate: &mut Candidate) -> bool {
        warn!(
            agent = %candidate.attempt.agent_id,
            "Discarding attempt generated against stale content"
        );
        candidate.attempt.validation.reject(Rejection::Stale);
        false
    }
}
