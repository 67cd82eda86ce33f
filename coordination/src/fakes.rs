//! In-memory collaborators (testing and dry runs)
//!
//! Provides `InMemoryFiles`, `ScriptedChecker`, `PatternChecker` and
//! `ScriptedFixer`, which satisfy the boundary traits without touching the
//! filesystem, spawning processes or calling agents.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::boundary::{
    CheckScope, Checker, CheckerError, FileBoundary, FileBoundaryError, FixProposal, Fixer,
    FixerError, WriteOutcome,
};
use crate::issue::{Issue, Severity};
use crate::patch::Patch;

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// InMemoryFiles
// ---------------------------------------------------------------------------

type Mutation = Box<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Default)]
struct FilesState {
    contents: HashMap<PathBuf, String>,
    reads: HashMap<PathBuf, usize>,
    writes: Vec<(PathBuf, String)>,
    read_only: HashSet<PathBuf>,
    mutations: HashMap<PathBuf, (usize, Mutation)>,
    fail_reads: bool,
}

/// File boundary backed by a `HashMap<path, content>` that records writes.
#[derive(Default)]
pub struct InMemoryFiles {
    state: Mutex<FilesState>,
}

impl InMemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        guard(&self.state).contents.insert(path.into(), content.into());
        self
    }

    /// Writes to `path` are rejected.
    pub fn read_only(self, path: impl Into<PathBuf>) -> Self {
        guard(&self.state).read_only.insert(path.into());
        self
    }

    /// Every subsequent read fails with an I/O error.
    pub fn fail_reads(&self) {
        guard(&self.state).fail_reads = true;
    }

    /// Rewrite `path` with `f` right after its `nth` read, simulating a
    /// concurrent edit between snapshot and apply.
    pub fn mutate_after_reads<F>(&self, path: impl Into<PathBuf>, nth: usize, f: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        guard(&self.state)
            .mutations
            .insert(path.into(), (nth, Box::new(f)));
    }

    pub fn content(&self, path: impl AsRef<Path>) -> Option<String> {
        guard(&self.state).contents.get(path.as_ref()).cloned()
    }

    pub fn write_count(&self) -> usize {
        guard(&self.state).writes.len()
    }

    pub fn writes(&self) -> Vec<(PathBuf, String)> {
        guard(&self.state).writes.clone()
    }
}

#[async_trait]
impl FileBoundary for InMemoryFiles {
    async fn read(&self, path: &Path) -> Result<String, FileBoundaryError> {
        let mut state = guard(&self.state);
        if state.fail_reads {
            return Err(FileBoundaryError::Read {
                path: path.to_path_buf(),
                source: std::io::Error::other("injected read failure"),
            });
        }
        let content = state.contents.get(path).cloned().ok_or_else(|| FileBoundaryError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;

        let count = {
            let c = state.reads.entry(path.to_path_buf()).or_insert(0);
            *c += 1;
            *c
        };
        let mutated = match state.mutations.get(path) {
            Some((nth, f)) if *nth == count => Some(f(&content)),
            _ => None,
        };
        if let Some(next) = mutated {
            state.contents.insert(path.to_path_buf(), next);
        }
        Ok(content)
    }

    async fn write(&self, path: &Path, content: &str) -> Result<WriteOutcome, FileBoundaryError> {
        let mut state = guard(&self.state);
        if state.read_only.contains(path) {
            return Ok(WriteOutcome::Rejected {
                reason: format!("{} is read-only", path.display()),
            });
        }
        if !state.contents.contains_key(path) {
            return Ok(WriteOutcome::Rejected {
                reason: format!("{} does not exist", path.display()),
            });
        }
        state.contents.insert(path.to_path_buf(), content.to_string());
        state.writes.push((path.to_path_buf(), content.to_string()));
        Ok(WriteOutcome::Written)
    }
}

// ---------------------------------------------------------------------------
// ScriptedChecker
// ---------------------------------------------------------------------------

/// Checker replaying a fixed list of rounds. The last round repeats once
/// the script runs out.
#[derive(Default)]
pub struct ScriptedChecker {
    rounds: Vec<Vec<Issue>>,
    fail_on_call: Option<usize>,
    calls: Mutex<usize>,
}

impl ScriptedChecker {
    pub fn new(rounds: Vec<Vec<Issue>>) -> Self {
        Self {
            rounds,
            fail_on_call: None,
            calls: Mutex::new(0),
        }
    }

    /// Every call returns the same issues.
    pub fn repeating(issues: Vec<Issue>) -> Self {
        Self::new(vec![issues])
    }

    /// Fail on the `n`th call (1-based).
    pub fn fail_on_call(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    pub fn calls(&self) -> usize {
        *guard(&self.calls)
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    async fn run_checks(&self, _scope: &CheckScope) -> Result<Vec<Issue>, CheckerError> {
        let call = {
            let mut calls = guard(&self.calls);
            *calls += 1;
            *calls
        };
        if self.fail_on_call == Some(call) {
            return Err(CheckerError::Execution(format!("scripted failure on call {call}")));
        }
        let round = self
            .rounds
            .get(call - 1)
            .or_else(|| self.rounds.last())
            .cloned()
            .unwrap_or_default();
        Ok(round)
    }
}

// ---------------------------------------------------------------------------
// PatternChecker
// ---------------------------------------------------------------------------

/// Reports an issue whenever `pattern` matches the file's current content.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub issue_id: String,
    pub file: PathBuf,
    pub pattern: Regex,
    pub description: String,
    pub severity: Severity,
    pub category: String,
}

/// Checker that scans [`InMemoryFiles`] with regex rules, so fixes that
/// remove the pattern make the issue disappear on the next check.
pub struct PatternChecker {
    files: Arc<InMemoryFiles>,
    rules: Vec<PatternRule>,
}

impl PatternChecker {
    pub fn new(files: Arc<InMemoryFiles>, rules: Vec<PatternRule>) -> Self {
        Self { files, rules }
    }
}

#[async_trait]
impl Checker for PatternChecker {
    async fn run_checks(&self, _scope: &CheckScope) -> Result<Vec<Issue>, CheckerError> {
        let mut issues = Vec::new();
        for rule in &self.rules {
            let Some(content) = self.files.content(&rule.file) else {
                continue;
            };
            if let Some(m) = rule.pattern.find(&content) {
                let line = content[..m.start()].matches('\n').count() + 1;
                issues.push(
                    Issue::new(
                        rule.issue_id.clone(),
                        rule.description.clone(),
                        rule.file.clone(),
                        rule.severity,
                        rule.category.clone(),
                    )
                    .with_line(u32::try_from(line).unwrap_or(u32::MAX))
                    .with_signature(rule.pattern.as_str()),
                );
            }
        }
        Ok(issues)
    }
}

// ---------------------------------------------------------------------------
// ScriptedFixer
// ---------------------------------------------------------------------------

/// Fixer replaying scripted replies. The last reply repeats once the
/// script runs out.
pub struct ScriptedFixer {
    replies: Vec<Result<FixProposal, FixerError>>,
    fail_after: Option<usize>,
    delay: Option<Duration>,
    cancel_on_call: Option<CancellationToken>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedFixer {
    pub fn sequence(replies: Vec<Result<FixProposal, FixerError>>) -> Self {
        Self {
            replies,
            fail_after: None,
            delay: None,
            cancel_on_call: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn always(patch: Patch, confidence: f64) -> Self {
        Self::sequence(vec![Ok(FixProposal::new(patch, confidence))])
    }

    pub fn failing(err: FixerError) -> Self {
        Self::sequence(vec![Err(err)])
    }

    /// Decline every call after the first `n`.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Sleep before replying.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Cancel `token` as soon as a call starts, before any delay.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_call = Some(token);
        self
    }

    pub fn calls(&self) -> usize {
        guard(&self.seen).len()
    }

    /// File content passed to each call, in call order.
    pub fn seen_contents(&self) -> Vec<String> {
        guard(&self.seen).clone()
    }
}

#[async_trait]
impl Fixer for ScriptedFixer {
    async fn propose_fix(&self, _issue: &Issue, content: &str) -> Result<FixProposal, FixerError> {
        let call = {
            let mut seen = guard(&self.seen);
            seen.push(content.to_string());
            seen.len()
        };
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_after.is_some_and(|n| call > n) {
            return Err(FixerError::Declined(format!("script exhausted after {call} calls")));
        }
        self.replies
            .get(call - 1)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_else(|| Err(FixerError::Unavailable("empty script".into())))
    }
}
