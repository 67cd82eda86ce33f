//! End-to-end convergence scenarios with in-memory collaborators.
//!
//! Covers:
//! - Critical security issue fixed by a single specialist, then converged
//! - Parallel dispatch where one agent trips the diff-size guard
//! - Fallback to generalists when no skill matches
//! - Iteration budget exhausted with issues persisting
//! - Checker failure mid-run yielding a partial result
//! - No-progress detection, termination, cancellation and time budget

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use remedy_coordination::fakes::{
    InMemoryFiles, PatternChecker, PatternRule, ScriptedChecker, ScriptedFixer,
};
use remedy_coordination::{
    Agent, CheckStatus, Collaborators, ConvergenceLoop, CoordinationError, EffectivenessStore,
    EngineConfig, FixerError, FixerRegistry, Hunk, InMemoryEffectivenessStore, Issue,
    JsonFileEffectivenessStore, LoopState, Patch, Severity, Skill, SkillCatalog, SkillCategory,
    Strategy, WorkflowStatus,
};
use tokio_util::sync::CancellationToken;

const RUN_PY: &str = "import subprocess\n\ndef run(cmd):\n    return subprocess.call(cmd, shell=True)\n";
const UNSAFE: &str = "    return subprocess.call(cmd, shell=True)";
const APP_PY: &str = "def handler(req):\n    value = req.get('x')\n    return value.strip()\n# marker\n";

fn security_catalog() -> Arc<SkillCatalog> {
    Arc::new(
        SkillCatalog::new(
            vec![Skill::new("shell-injection", SkillCategory::Security, 0.95)
                .with_description("Replace shell=True subprocess calls")
                .with_tags(["subprocess", "shell", "security"])],
            vec![
                Agent::new("security-fixer", "Security Fixer").with_skills(["shell-injection"]),
                Agent::new("generalist", "Generalist"),
            ],
            vec!["generalist".into()],
        )
        .unwrap(),
    )
}

/// Full overlap on production code scores `0.8 + 0.2 × base`: 0.85 and 0.82.
fn correctness_catalog() -> Arc<SkillCatalog> {
    Arc::new(
        SkillCatalog::new(
            vec![
                Skill::new("null-guard", SkillCategory::Correctness, 0.25).with_tags(["null"]),
                Skill::new("deref-check", SkillCategory::Correctness, 0.1).with_tags(["deref"]),
            ],
            vec![
                Agent::new("agent-a", "Null Guard").with_skills(["null-guard"]),
                Agent::new("agent-b", "Deref Checker").with_skills(["deref-check"]),
                Agent::new("generalist", "Generalist"),
                Agent::new("generalist-2", "Backup Generalist"),
            ],
            vec!["generalist".into(), "generalist-2".into()],
        )
        .unwrap(),
    )
}

fn shlex_patch() -> Patch {
    Patch::single(Hunk::new([UNSAFE], ["    return subprocess.call(shlex.split(cmd))"]))
}

fn marker_patch() -> Patch {
    Patch::single(Hunk::new(["# marker"], ["# marker", "# touched"]))
}

fn declined() -> FixerError {
    FixerError::Declined("cannot fix".into())
}

fn collaborators(
    checker: Arc<dyn remedy_coordination::Checker>,
    fixers: FixerRegistry,
    files: Arc<InMemoryFiles>,
    store: Arc<dyn EffectivenessStore>,
) -> Collaborators {
    Collaborators {
        checker,
        fixers,
        files,
        store,
    }
}

fn fresh_store() -> Arc<InMemoryEffectivenessStore> {
    Arc::new(InMemoryEffectivenessStore::new())
}

fn persistent_issue(id: &str) -> Issue {
    Issue::new(id, "vague complaint", "app/app.py", Severity::Medium, "misc")
}

#[tokio::test]
async fn scenario_critical_security_issue_converges_after_one_iteration() {
    let files = Arc::new(InMemoryFiles::new().with_file("app/run.py", RUN_PY));
    let checker = PatternChecker::new(
        files.clone(),
        vec![PatternRule {
            issue_id: "B602".into(),
            file: "app/run.py".into(),
            pattern: Regex::new("shell=True").unwrap(),
            description: "uses shell=True".into(),
            severity: Severity::Critical,
            category: "security".into(),
        }],
    );
    let fixers = FixerRegistry::new()
        .with("security-fixer", Arc::new(ScriptedFixer::always(shlex_patch(), 0.9)))
        .with("generalist", Arc::new(ScriptedFixer::failing(declined())));
    let store = Arc::new(InMemoryEffectivenessStore::new());

    let engine = ConvergenceLoop::new(
        security_catalog(),
        EngineConfig::default(),
        collaborators(Arc::new(checker), fixers, files.clone(), store.clone()),
    )
    .unwrap();

    let issue = Issue::new("B602", "uses shell=True", "app/run.py", Severity::Critical, "security");
    let score = engine.router().score_skills(&issue)[0].adjusted;
    assert!(score >= 0.85, "score = {score}");

    let result = engine.run().await;

    assert_eq!(result.status, WorkflowStatus::Converged);
    assert_eq!(result.exit_code(), 0);
    assert_eq!(result.iterations.len(), 1);
    let record = &result.iterations[0];
    assert_eq!(record.iteration, 1);
    assert_eq!(record.fixes_applied, 1);
    assert_eq!(record.check_status, CheckStatus::AllAddressed);
    assert_eq!(record.outcomes[0].strategy, Strategy::Single);
    assert_eq!(record.outcomes[0].applied_agent.as_deref(), Some("security-fixer"));
    assert!(!files.content("app/run.py").unwrap().contains("shell=True"));
    assert!(result.remaining_issues.is_empty());

    let eff = store.get("shell-injection").unwrap();
    assert_eq!((eff.attempts, eff.successes), (1, 1));

    let states: Vec<(LoopState, LoopState)> =
        result.transitions.iter().map(|t| (t.from, t.to)).collect();
    assert_eq!(
        states,
        vec![(LoopState::Init, LoopState::Running), (LoopState::Running, LoopState::Converged)]
    );
}

#[tokio::test]
async fn scenario_parallel_dispatch_discards_oversized_patch() {
    let content = "def load(p):\n    return p.value\n";
    let files = Arc::new(InMemoryFiles::new().with_file("src/app.py", content));
    let issue = Issue::new(
        "E1",
        "possible null deref",
        "src/app.py",
        Severity::Medium,
        "correctness",
    );
    let checker = ScriptedChecker::new(vec![vec![issue], vec![]]);

    let good = Patch::single(Hunk::new(
        ["    return p.value"],
        ["    return p.value if p is not None else None"],
    ));
    let huge = Patch::single(Hunk {
        old_lines: vec!["    return p.value".into()],
        new_lines: (0..79).map(|i| format!("    check_{i}(p)")).collect(),
        description: Some("defensive rewrite".into()),
    });
    let fixers = FixerRegistry::new()
        .with("agent-a", Arc::new(ScriptedFixer::always(good, 0.8)))
        .with("agent-b", Arc::new(ScriptedFixer::always(huge, 0.9)))
        .with("generalist", Arc::new(ScriptedFixer::failing(declined())))
        .with("generalist-2", Arc::new(ScriptedFixer::failing(declined())));

    let result = ConvergenceLoop::new(
        correctness_catalog(),
        EngineConfig::default(),
        collaborators(Arc::new(checker), fixers, files.clone(), fresh_store()),
    )
    .unwrap()
    .run()
    .await;

    assert_eq!(result.status, WorkflowStatus::Converged);
    let outcome = &result.iterations[0].outcomes[0];
    assert_eq!(outcome.strategy, Strategy::Parallel);
    assert!(outcome.reasoning.contains("agent-a=0.85"), "{}", outcome.reasoning);
    assert!(outcome.reasoning.contains("agent-b=0.82"), "{}", outcome.reasoning);
    assert_eq!(outcome.applied_agent.as_deref(), Some("agent-a"));

    let b = outcome.attempts.iter().find(|a| a.agent_id == "agent-b").unwrap();
    assert!(!b.applied);
    assert_eq!(b.validation.reasons, vec!["diff_too_large: 80 > 50"]);
    assert_eq!(files.write_count(), 1);
    assert!(files.content("src/app.py").unwrap().contains("is not None"));
}

#[tokio::test]
async fn scenario_no_tag_overlap_falls_back_to_generalists() {
    let files = Arc::new(InMemoryFiles::new().with_file("app/app.py", APP_PY));
    let issue = Issue::new("W1", "line too long", "app/app.py", Severity::Low, "style");
    let checker = ScriptedChecker::new(vec![vec![issue.clone()], vec![]]);
    let second = Arc::new(ScriptedFixer::always(marker_patch(), 0.6));
    let fixers = FixerRegistry::new()
        .with("agent-a", Arc::new(ScriptedFixer::failing(declined())))
        .with("agent-b", Arc::new(ScriptedFixer::failing(declined())))
        .with("generalist", Arc::new(ScriptedFixer::failing(declined())))
        .with("generalist-2", second.clone());

    let engine = ConvergenceLoop::new(
        correctness_catalog(),
        EngineConfig::default(),
        collaborators(Arc::new(checker), fixers, files, fresh_store()),
    )
    .unwrap();

    let decision = engine.router().route(&issue);
    assert_eq!(decision.strategy, Strategy::Fallback);
    assert_eq!(decision.selected_agent_ids, vec!["generalist", "generalist-2"]);
    assert_eq!(decision.confidence_scores, vec![0.5, 0.5]);

    let result = engine.run().await;
    assert_eq!(result.status, WorkflowStatus::Converged);
    let outcome = &result.iterations[0].outcomes[0];
    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(outcome.applied_agent.as_deref(), Some("generalist-2"));
    assert_eq!(second.calls(), 1);
}

#[tokio::test]
async fn scenario_persistent_issues_hit_max_iterations() {
    let files = Arc::new(InMemoryFiles::new().with_file("app/app.py", APP_PY));
    let issues = vec![persistent_issue("P1"), persistent_issue("P2"), persistent_issue("P3")];
    let checker = ScriptedChecker::repeating(issues);
    // 3 issues × 9 iterations succeed; iteration 10 applies nothing.
    let fixers = FixerRegistry::new()
        .with("agent-a", Arc::new(ScriptedFixer::failing(declined())))
        .with("agent-b", Arc::new(ScriptedFixer::failing(declined())))
        .with("generalist", Arc::new(ScriptedFixer::always(marker_patch(), 0.6).failing_after(27)))
        .with("generalist-2", Arc::new(ScriptedFixer::failing(declined())));

    let result = ConvergenceLoop::new(
        correctness_catalog(),
        EngineConfig::default(),
        collaborators(Arc::new(checker), fixers, files, fresh_store()),
    )
    .unwrap()
    .run()
    .await;

    assert_eq!(result.status, WorkflowStatus::MaxIterations);
    assert_eq!(result.exit_code(), 3);
    assert_eq!(result.iterations.len(), 10);
    let numbers: Vec<u32> = result.iterations.iter().map(|r| r.iteration).collect();
    assert_eq!(numbers, (1..=10).collect::<Vec<_>>());
    assert!(result.iterations[..9].iter().all(|r| r.fixes_applied == 3));
    assert_eq!(result.iterations[9].fixes_applied, 0);
    assert_eq!(result.iterations[9].check_status, CheckStatus::Unresolved { remaining: 3 });
    assert_eq!(result.remaining_issues.len(), 3);
}

#[tokio::test]
async fn scenario_checker_failure_keeps_partial_records() {
    let files = Arc::new(InMemoryFiles::new().with_file("app/app.py", APP_PY));
    let checker = ScriptedChecker::repeating(vec![persistent_issue("P1")]).fail_on_call(4);
    let fixers = FixerRegistry::new()
        .with("agent-a", Arc::new(ScriptedFixer::failing(declined())))
        .with("agent-b", Arc::new(ScriptedFixer::failing(declined())))
        .with("generalist", Arc::new(ScriptedFixer::always(marker_patch(), 0.6)))
        .with("generalist-2", Arc::new(ScriptedFixer::failing(declined())));

    let result = ConvergenceLoop::new(
        correctness_catalog(),
        EngineConfig::default(),
        collaborators(Arc::new(checker), fixers, files, fresh_store()),
    )
    .unwrap()
    .run()
    .await;

    assert_eq!(result.status, WorkflowStatus::Error);
    assert_eq!(result.exit_code(), 4);
    assert_eq!(result.iterations.len(), 3);
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.iteration, 4);
    assert!(error.message.contains("checker failed on iteration 4"), "{}", error.message);
    assert_eq!(result.transitions.last().unwrap().to, LoopState::Error);
}

#[tokio::test]
async fn zero_applied_fixes_stop_with_no_progress() {
    let files = Arc::new(InMemoryFiles::new().with_file("app/app.py", APP_PY));
    let checker = ScriptedChecker::repeating(vec![persistent_issue("P1"), persistent_issue("P2")]);
    let fixers = FixerRegistry::new()
        .with("agent-a", Arc::new(ScriptedFixer::failing(declined())))
        .with("agent-b", Arc::new(ScriptedFixer::failing(declined())))
        .with("generalist", Arc::new(ScriptedFixer::failing(declined())))
        .with("generalist-2", Arc::new(ScriptedFixer::failing(declined())));

    let result = ConvergenceLoop::new(
        correctness_catalog(),
        EngineConfig::default(),
        collaborators(Arc::new(checker), fixers, files.clone(), fresh_store()),
    )
    .unwrap()
    .run()
    .await;

    assert_eq!(result.status, WorkflowStatus::NoProgress);
    assert_eq!(result.exit_code(), 2);
    assert_eq!(result.iterations.len(), 1);
    assert_eq!(result.iterations[0].fixes_failed, 2);
    assert_eq!(files.write_count(), 0);
    assert!(result.attempts().all(|a| !a.applied));
}

#[tokio::test]
async fn shrinking_issue_stream_converges_within_budget() {
    let files = Arc::new(InMemoryFiles::new().with_file("app/app.py", APP_PY));
    let rounds = vec![
        vec![persistent_issue("P1"), persistent_issue("P2"), persistent_issue("P3")],
        vec![persistent_issue("P2"), persistent_issue("P3")],
        vec![persistent_issue("P3")],
        vec![],
    ];
    let fixers = FixerRegistry::new()
        .with("agent-a", Arc::new(ScriptedFixer::failing(declined())))
        .with("agent-b", Arc::new(ScriptedFixer::failing(declined())))
        .with("generalist", Arc::new(ScriptedFixer::always(marker_patch(), 0.6)))
        .with("generalist-2", Arc::new(ScriptedFixer::failing(declined())));

    let mut config = EngineConfig::default();
    config.convergence.max_iterations = 5;
    let result = ConvergenceLoop::new(
        correctness_catalog(),
        config,
        collaborators(Arc::new(ScriptedChecker::new(rounds)), fixers, files, fresh_store()),
    )
    .unwrap()
    .run()
    .await;

    assert_eq!(result.status, WorkflowStatus::Converged);
    assert_eq!(result.iterations.len(), 3);
    assert_eq!(result.total_applied(), 6);
}

#[tokio::test]
async fn issues_processed_by_severity_then_detection_order() {
    let files = Arc::new(InMemoryFiles::new().with_file("app/app.py", APP_PY));
    let base = chrono::Utc::now();
    let low = persistent_issue("low").with_detected_at(base);
    let mut high_late =
        persistent_issue("high-late").with_detected_at(base + chrono::Duration::seconds(2));
    high_late.severity = Severity::High;
    let mut high_early =
        persistent_issue("high-early").with_detected_at(base + chrono::Duration::seconds(1));
    high_early.severity = Severity::High;

    let checker = ScriptedChecker::new(vec![vec![low, high_late, high_early], vec![]]);
    let fixers = FixerRegistry::new()
        .with("agent-a", Arc::new(ScriptedFixer::failing(declined())))
        .with("agent-b", Arc::new(ScriptedFixer::failing(declined())))
        .with("generalist", Arc::new(ScriptedFixer::always(marker_patch(), 0.6)))
        .with("generalist-2", Arc::new(ScriptedFixer::failing(declined())));

    let result = ConvergenceLoop::new(
        correctness_catalog(),
        EngineConfig::default(),
        collaborators(Arc::new(checker), fixers, files, fresh_store()),
    )
    .unwrap()
    .run()
    .await;

    let order: Vec<&str> = result.iterations[0]
        .outcomes
        .iter()
        .map(|o| o.issue_id.as_str())
        .collect();
    assert_eq!(order, vec!["high-early", "high-late", "low"]);
}

#[tokio::test]
async fn file_boundary_failure_reports_issue_context() {
    let files = Arc::new(InMemoryFiles::new().with_file("app/app.py", APP_PY));
    files.fail_reads();
    let checker = ScriptedChecker::repeating(vec![persistent_issue("P1")]);
    let fixers = FixerRegistry::new()
        .with("agent-a", Arc::new(ScriptedFixer::failing(declined())))
        .with("agent-b", Arc::new(ScriptedFixer::failing(declined())))
        .with("generalist", Arc::new(ScriptedFixer::always(marker_patch(), 0.6)))
        .with("generalist-2", Arc::new(ScriptedFixer::failing(declined())));

    let result = ConvergenceLoop::new(
        correctness_catalog(),
        EngineConfig::default(),
        collaborators(Arc::new(checker), fixers, files, fresh_store()),
    )
    .unwrap()
    .run()
    .await;

    assert_eq!(result.status, WorkflowStatus::Error);
    let error = result.error.unwrap();
    assert_eq!(error.iteration, 1);
    assert_eq!(error.issue_id.as_deref(), Some("P1"));
    assert!(result.iterations.is_empty());
}

#[tokio::test]
async fn cancelled_run_is_incomplete() {
    let files = Arc::new(InMemoryFiles::new().with_file("app/app.py", APP_PY));
    let checker = Arc::new(ScriptedChecker::repeating(vec![persistent_issue("P1")]));
    let fixers = FixerRegistry::new()
        .with("agent-a", Arc::new(ScriptedFixer::failing(declined())))
        .with("agent-b", Arc::new(ScriptedFixer::failing(declined())))
        .with("generalist", Arc::new(ScriptedFixer::always(marker_patch(), 0.6)))
        .with("generalist-2", Arc::new(ScriptedFixer::failing(declined())));

    let token = CancellationToken::new();
    token.cancel();
    let result = ConvergenceLoop::new(
        correctness_catalog(),
        EngineConfig::default(),
        collaborators(checker.clone(), fixers, files, fresh_store()),
    )
    .unwrap()
    .with_cancellation(token)
    .run()
    .await;

    assert_eq!(result.status, WorkflowStatus::Incomplete);
    assert_eq!(result.exit_code(), 5);
    assert!(result.iterations.is_empty());
    assert_eq!(checker.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn wall_clock_budget_exceeded_is_error() {
    let files = Arc::new(InMemoryFiles::new().with_file("app/app.py", APP_PY));
    let checker = ScriptedChecker::repeating(vec![persistent_issue("P1")]);
    let slow = ScriptedFixer::always(marker_patch(), 0.6).with_delay(Duration::from_secs(120));
    let fixers = FixerRegistry::new()
        .with("agent-a", Arc::new(ScriptedFixer::failing(declined())))
        .with("agent-b", Arc::new(ScriptedFixer::failing(declined())))
        .with("generalist", Arc::new(slow))
        .with("generalist-2", Arc::new(ScriptedFixer::failing(declined())));

    let mut config = EngineConfig::default();
    config.convergence.wall_clock_budget_secs = Some(60);
    let result = ConvergenceLoop::new(
        correctness_catalog(),
        config,
        collaborators(Arc::new(checker), fixers, files, fresh_store()),
    )
    .unwrap()
    .run()
    .await;

    assert_eq!(result.status, WorkflowStatus::Error);
    assert!(result.error.unwrap().message.contains("wall-clock budget"));
}

/// The critical shell issue sorts first; the vague one falls back to the
/// generalist.
fn two_file_issues() -> Vec<Issue> {
    vec![
        persistent_issue("P1"),
        Issue::new("B602", "uses shell=True", "app/run.py", Severity::Critical, "security"),
    ]
}

fn two_files() -> Arc<InMemoryFiles> {
    Arc::new(
        InMemoryFiles::new()
            .with_file("app/run.py", RUN_PY)
            .with_file("app/app.py", APP_PY),
    )
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_iteration_records_applied_fix() {
    let files = two_files();
    let checker = Arc::new(ScriptedChecker::repeating(two_file_issues()));
    let token = CancellationToken::new();
    let specialist = ScriptedFixer::always(shlex_patch(), 0.9)
        .cancelling(token.clone())
        .with_delay(Duration::from_secs(5));
    let generalist = Arc::new(ScriptedFixer::always(marker_patch(), 0.6));
    let fixers = FixerRegistry::new()
        .with("security-fixer", Arc::new(specialist))
        .with("generalist", generalist.clone());

    let result = ConvergenceLoop::new(
        security_catalog(),
        EngineConfig::default(),
        collaborators(checker.clone(), fixers, files.clone(), fresh_store()),
    )
    .unwrap()
    .with_cancellation(token)
    .run()
    .await;

    assert_eq!(result.status, WorkflowStatus::Incomplete);
    assert_eq!(result.exit_code(), 5);
    assert_eq!(checker.calls(), 1);
    assert_eq!(generalist.calls(), 0);
    assert!(files.content("app/run.py").unwrap().contains("shlex.split(cmd)"));

    assert_eq!(result.iterations.len(), 1);
    let record = &result.iterations[0];
    assert_eq!(record.issues_in, 2);
    assert_eq!(record.fixes_applied, 1);
    assert_eq!(record.check_status, CheckStatus::Unresolved { remaining: 1 });
    assert_eq!(record.outcomes.len(), 1);
    assert_eq!(record.outcomes[0].applied_agent.as_deref(), Some("security-fixer"));
    let remaining: Vec<&str> = result.remaining_issues.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(remaining, vec!["P1"]);
}

#[tokio::test(start_paused = true)]
async fn budget_expiry_mid_iteration_records_completed_outcomes() {
    let files = two_files();
    let checker = ScriptedChecker::repeating(two_file_issues());
    let slow = ScriptedFixer::always(marker_patch(), 0.6).with_delay(Duration::from_secs(120));
    let fixers = FixerRegistry::new()
        .with("security-fixer", Arc::new(ScriptedFixer::always(shlex_patch(), 0.9)))
        .with("generalist", Arc::new(slow));

    let mut config = EngineConfig::default();
    config.convergence.wall_clock_budget_secs = Some(60);
    let result = ConvergenceLoop::new(
        security_catalog(),
        config,
        collaborators(Arc::new(checker), fixers, files.clone(), fresh_store()),
    )
    .unwrap()
    .run()
    .await;

    assert_eq!(result.status, WorkflowStatus::Error);
    assert!(files.content("app/run.py").unwrap().contains("shlex.split(cmd)"));
    assert_eq!(result.iterations.len(), 1);
    assert_eq!(result.iterations[0].fixes_applied, 1);
    assert_eq!(result.iterations[0].outcomes[0].issue_id, "B602");
    let remaining: Vec<&str> = result.remaining_issues.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(remaining, vec!["P1"]);
}

#[test]
fn parallel_pick_respects_max_parallel_agents() {
    let catalog = Arc::new(
        SkillCatalog::new(
            ["a", "b", "c"]
                .iter()
                .map(|id| {
                    Skill::new(format!("null-{id}"), SkillCategory::Correctness, 0.25)
                        .with_tags(["null"])
                })
                .collect(),
            vec![
                Agent::new("a", "A").with_skills(["null-a"]),
                Agent::new("b", "B").with_skills(["null-b"]),
                Agent::new("c", "C").with_skills(["null-c"]),
                Agent::new("generalist", "Generalist"),
            ],
            vec!["generalist".into()],
        )
        .unwrap(),
    );
    let fixers = ["a", "b", "c", "generalist"].iter().fold(FixerRegistry::new(), |registry, id| {
        registry.with(*id, Arc::new(ScriptedFixer::failing(declined())))
    });
    let mut config = EngineConfig::default();
    config.executor.max_parallel_agents = 2;

    let engine = ConvergenceLoop::new(
        catalog,
        config,
        collaborators(
            Arc::new(ScriptedChecker::default()),
            fixers,
            Arc::new(InMemoryFiles::new()),
            Arc::new(InMemoryEffectivenessStore::new()),
        ),
    )
    .unwrap();

    let issue = Issue::new(
        "N1",
        "possible null value",
        "app/app.py",
        Severity::Medium,
        "correctness",
    );
    let decision = engine.router().route(&issue);
    assert_eq!(decision.strategy, Strategy::Parallel);
    assert_eq!(decision.selected_agent_ids, vec!["a", "b"]);
}

#[tokio::test]
async fn missing_fixer_rejected_at_construction() {
    let files = Arc::new(InMemoryFiles::new());
    let fixers = FixerRegistry::new().with("agent-a", Arc::new(ScriptedFixer::failing(declined())));
    let err = ConvergenceLoop::new(
        correctness_catalog(),
        EngineConfig::default(),
        collaborators(Arc::new(ScriptedChecker::default()), fixers, files, fresh_store()),
    )
    .err()
    .unwrap();
    assert!(matches!(err, CoordinationError::MissingFixers(ref agents) if agents.len() == 3));
}

#[tokio::test]
async fn identical_inputs_give_identical_decisions() {
    let mut runs = Vec::new();
    for _ in 0..3 {
        let content = "def load(p):\n    return p.value\n";
        let files = Arc::new(InMemoryFiles::new().with_file("src/app.py", content));
        let issue = Issue::new(
        "E1",
        "possible null deref",
        "src/app.py",
        Severity::Medium,
        "correctness",
    );
        let checker = ScriptedChecker::new(vec![vec![issue], vec![]]);
        let fixers = FixerRegistry::new()
            .with("agent-a", Arc::new(ScriptedFixer::failing(declined())))
            .with("agent-b", Arc::new(ScriptedFixer::failing(declined())))
            .with("generalist", Arc::new(ScriptedFixer::failing(declined())))
            .with("generalist-2", Arc::new(ScriptedFixer::failing(declined())));
        let result = ConvergenceLoop::new(
            correctness_catalog(),
            EngineConfig::default(),
            collaborators(Arc::new(checker), fixers, files, fresh_store()),
        )
        .unwrap()
        .run()
        .await;
        let outcome = &result.iterations[0].outcomes[0];
        let agents: Vec<String> = outcome.attempts.iter().map(|a| a.agent_id.clone()).collect();
        runs.push((result.status, outcome.strategy, outcome.reasoning.clone(), agents));
    }
    assert!(runs.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn learning_state_persists_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("effectiveness.json");

    for _ in 0..2 {
        let files = Arc::new(InMemoryFiles::new().with_file("app/run.py", RUN_PY));
        let issue =
            Issue::new("B602", "uses shell=True", "app/run.py", Severity::Critical, "security");
        let checker = ScriptedChecker::new(vec![vec![issue], vec![]]);
        let fixers = FixerRegistry::new()
            .with("security-fixer", Arc::new(ScriptedFixer::always(shlex_patch(), 0.9)))
            .with("generalist", Arc::new(ScriptedFixer::failing(declined())));
        let store = Arc::new(JsonFileEffectivenessStore::load(&state).unwrap());
        let result = ConvergenceLoop::new(
            security_catalog(),
            EngineConfig::default(),
            collaborators(Arc::new(checker), fixers, files, store),
        )
        .unwrap()
        .run()
        .await;
        assert_eq!(result.status, WorkflowStatus::Converged);
    }

    let reloaded = JsonFileEffectivenessStore::load(Path::new(&state)).unwrap();
    let eff = reloaded.get("shell-injection").unwrap();
    assert_eq!((eff.attempts, eff.successes), (2, 2));
}
