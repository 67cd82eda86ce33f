//! Console rendering and JSON report output.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use remedy_coordination::{EffectivenessStore, RoutingDecision, SkillCatalog, WorkflowResult};

/// Human-readable run summary.
pub fn render_summary(result: &WorkflowResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "status: {} (exit {}) after {} iteration(s), {} ms",
        result.status,
        result.exit_code(),
        result.iterations.len(),
        result.total_duration_ms
    );

    for record in &result.iterations {
        let _ = writeln!(
            out,
            "  #{:<3} issues={:<4} applied={:<4} failed={:<4} {} ms",
            record.iteration,
            record.issues_in,
            record.fixes_applied,
            record.fixes_failed,
            record.duration_ms
        );
        for outcome in &record.outcomes {
            let applied = outcome.applied_agent.as_deref().unwrap_or("-");
            let _ = writeln!(
                out,
                "        {:<16} {:<10} applied_by={applied}  {}",
                outcome.issue_id,
                outcome.strategy.to_string(),
                outcome.reasoning
            );
            for attempt in outcome.attempts.iter().filter(|a| !a.validation.passed) {
                let _ = writeln!(
                    out,
                    "          {} rejected: {}",
                    attempt.agent_id,
                    attempt.validation.reasons.join("; ")
                );
            }
        }
    }

    if let Some(error) = &result.error {
        let issue = error
            .issue_id
            .as_deref()
            .map(|id| format!(" (issue {id})"))
            .unwrap_or_default();
        let _ = writeln!(out, "error on iteration {}{issue}: {}", error.iteration, error.message);
    }
    if !result.remaining_issues.is_empty() {
        let _ = writeln!(out, "remaining issues:");
        for issue in &result.remaining_issues {
            let _ = writeln!(
                out,
                "  {:<16} {:<8} {} {}",
                issue.id,
                issue.severity.to_string(),
                issue.location(),
                issue.description
            );
        }
    }
    out
}

/// One line per routing decision.
pub fn render_routes(decisions: &[RoutingDecision]) -> String {
    let mut out = String::new();
    for d in decisions {
        let agents: Vec<String> = d
            .selected_agent_ids
            .iter()
            .zip(&d.confidence_scores)
            .map(|(agent, score)| format!("{agent}={score:.2}"))
            .collect();
        let _ = writeln!(
            out,
            "{:<16} {:<10} [{}]  {}",
            d.issue_id,
            d.strategy.to_string(),
            agents.join(", "),
            d.reasoning
        );
    }
    out
}

/// Catalog listing with learned effectiveness.
pub fn render_skills(
    catalog: &SkillCatalog,
    store: &dyn EffectivenessStore,
    min_samples: u32,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<24} {:<18} {:<14} {:>5} {:>9} {:>7} {:>6}",
        "skill", "agent", "category", "base", "attempts", "rate", "adj"
    );
    for skill in catalog.skills() {
        let owner = catalog.owner_of(&skill.id).unwrap_or("-");
        let (attempts, rate, adjustment) = match store.get(&skill.id) {
            Some(eff) => (eff.attempts, eff.success_rate(), eff.adjustment(min_samples)),
            None => (0, 0.0, 1.0),
        };
        let _ = writeln!(
            out,
            "{:<24} {:<18} {:<14} {:>5.2} {:>9} {:>7.2} {:>6.2}",
            skill.id,
            owner,
            skill.category.as_str(),
            skill.base_confidence, attempts, rate, adjustment
        );
    }
    if !catalog.generalists().is_empty() {
        let _ = writeln!(out, "generalists: {}", catalog.generalists().join(", "));
    }
    out
}

/// Write the full result as pretty JSON.
pub fn write_json(path: &Path, result: &WorkflowResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result).context("Failed to serialize result")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write report {}", path.display()))
}
