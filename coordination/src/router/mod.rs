//! Skill Router — issue → agent(s) + dispatch strategy
//!
//! # Strategy selection
//!
//! ```text
//! score every skill ─► learning adjustment ─► keep ≥ min_confidence
//!                                                   │
//!                      none left ───────────────────┼──► fallback (generalists, 0.5 each)
//!                                                   │
//!                      group by owner (max score), stable sort desc
//!                                                   │
//!   top ≥ single_threshold ─────────────────────────┼──► single (top agent)
//!   ≥2 agents ≥ parallel_threshold ─────────────────┼──► parallel (top min(fanout, n))
//!   ≥2 qualifying agents ───────────────────────────┼──► sequential (top 2)
//!   otherwise ──────────────────────────────────────┴──► single (lone qualifier)
//! ```
//!
//! Routing is deterministic: equal scores are broken by catalog declaration
//! order, never by hash or clock.

pub mod decision;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::SkillCatalog;
use crate::issue::Issue;
use crate::learning::{EffectivenessStore, DEFAULT_MIN_SAMPLES};
use crate::scoring::ConfidenceScorer;

pub use decision::{AgentCandidate, RoutingDecision, SkillScore, Strategy};

/// Routing thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum adjusted skill score for an agent to qualify.
    pub min_confidence: f64,
    /// Top score at or above which a single agent is trusted alone.
    pub single_threshold: f64,
    /// Score at or above which agents are dispatched in parallel.
    pub parallel_threshold: f64,
    /// Maximum agents selected for a parallel decision.
    pub parallel_fanout: usize,
    /// Attempts a skill needs before its success rate adjusts its score.
    pub min_samples: u32,
    /// Confidence reported for each generalist in a fallback decision.
    pub fallback_confidence: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            single_threshold: 0.9,
            parallel_threshold: 0.8,
            parallel_fanout: 3,
            min_samples: DEFAULT_MIN_SAMPLES,
            fallback_confidence: 0.5,
        }
    }
}

/// Matches issues to agents using the catalog, scorer and learning store.
pub struct SkillRouter {
    catalog: Arc<SkillCatalog>,
    scorer: ConfidenceScorer,
    store: Arc<dyn EffectivenessStore>,
    config: RouterConfig,
}

impl SkillRouter {
    pub fn new(
        catalog: Arc<SkillCatalog>,
        scorer: ConfidenceScorer,
        store: Arc<dyn EffectivenessStore>,
        config: RouterConfig,
    ) -> Self {
        Self {
            catalog,
            scorer,
            store,
            config,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SkillCatalog {
        &self.catalog
    }

    /// Score `issue` against every skill, in catalog order.
    pub fn score_skills(&self, issue: &Issue) -> Vec<SkillScore> {
        self.catalog
            .skills()
            .iter()
            .filter_map(|skill| {
                let agent_id = self.catalog.owner_of(&skill.id)?;
                let raw = self.scorer.score(issue, skill);
                let adjustment = self
                    .store
                    .get(&skill.id)
                    .map_or(1.0, |eff| eff.adjustment(self.config.min_samples));
                Some(SkillScore {
                    skill_id: skill.id.clone(),
                    agent_id: agent_id.to_string(),
                    raw,
                    adjusted: (raw * adjustment).clamp(0.0, 1.0),
                })
            })
            .collect()
    }

    /// Qualifying agents ranked by their best adjusted skill score.
    ///
    /// Ties keep the first skill in catalog order per agent and the first
    /// declared agent across agents.
    pub fn candidates(&self, issue: &Issue) -> Vec<AgentCandidate> {
        let mut best: Vec<AgentCandidate> = Vec::new();
        for score in self.score_skills(issue) {
            if score.adjusted < self.config.min_confidence {
                continue;
            }
            match best.iter_mut().find(|c| c.agent_id == score.agent_id) {
                Some(existing) if score.adjusted > existing.score => {
                    existing.skill_id = score.skill_id;
                    existing.score = score.adjusted;
                }
                Some(_) => {}
                None => best.push(AgentCandidate {
                    agent_id: score.agent_id,
                    skill_id: score.skill_id,
                    score: score.adjusted,
                }),
            }
        }

        best.sort_by(|a, b| {
            b.score.total_cmp(&a.score).then_with(|| {
                self.catalog
                    .agent_rank(&a.agent_id)
                    .cmp(&self.catalog.agent_rank(&b.agent_id))
            })
        });
        best
    }

    /// Produce the routing decision for one issue.
    pub fn route(&self, issue: &Issue) -> RoutingDecision {
        let ranked = self.candidates(issue);
        let decision = match ranked.first() {
            None => self.fallback(issue),
            Some(top) if top.score >= self.config.single_threshold => {
                let reasoning = format!(
                    "single: {}={:.2} ≥ {:.2}",
                    top.agent_id, top.score, self.config.single_threshold
                );
                specialist(issue, &ranked[..1], Strategy::Single, reasoning)
            }
            Some(_) => self.choose_multi(issue, &ranked),
        };

        debug!(
            issue_id = %issue.id,
            strategy = %decision.strategy,
            agents = ?decision.selected_agent_ids,
            "Routed issue"
        );
        decision
    }

    fn choose_multi(&self, issue: &Issue, ranked: &[AgentCandidate]) -> RoutingDecision {
        let strong = ranked
            .iter()
            .take_while(|c| c.score >= self.config.parallel_threshold)
            .count();

        if strong >= 2 {
            let chosen = &ranked[..strong.min(self.config.parallel_fanout.max(1))];
            let reasoning = format!(
                "parallel: {} agents ≥ {:.2} ({})",
                strong,
                self.config.parallel_threshold,
                cite(chosen)
            );
            return specialist(issue, chosen, Strategy::Parallel, reasoning);
        }

        if ranked.len() >= 2 {
            let chosen = &ranked[..2];
            let reasoning = format!(
                "sequential: top {:.2} < {:.2}, {} qualifying ({})",
                chosen[0].score,
                self.config.single_threshold,
                ranked.len(),
                cite(chosen)
            );
            return specialist(issue, chosen, Strategy::Sequential, reasoning);
        }

        let reasoning = format!(
            "single: only qualifier {}={:.2} ≥ {:.2}",
            ranked[0].agent_id, ranked[0].score, self.config.min_confidence
        );
        specialist(issue, &ranked[..1], Strategy::Single, reasoning)
    }

    fn fallback(&self, issue: &Issue) -> RoutingDecision {
        let generalists = self.catalog.generalists().to_vec();
        let confidence = self.config.fallback_confidence.clamp(0.0, 1.0);
        RoutingDecision {
            issue_id: issue.id.clone(),
            confidence_scores: vec![confidence; generalists.len()],
            reasoning: format!(
                "no specialist match (none ≥ {:.2}); generalists: {}",
                self.config.min_confidence,
                generalists.join(", ")
            ),
            selected_agent_ids: generalists,
            selected_skill_ids: Vec::new(),
            strategy: Strategy::Fallback,
        }
    }
}

fn specialist(
    issue: &Issue,
    chosen: &[AgentCandidate],
    strategy: Strategy,
    reasoning: String,
) -> RoutingDecision {
    RoutingDecision {
        issue_id: issue.id.clone(),
        selected_agent_ids: chosen.iter().map(|c| c.agent_id.clone()).collect(),
        selected_skill_ids: chosen.iter().map(|c| c.skill_id.clone()).collect(),
        confidence_scores: chosen.iter().map(|c| c.score).collect(),
        strategy,
        reasoning,
    }
}

fn cite(chosen: &[AgentCandidate]) -> String {
    chosen
        .iter()
        .map(|c| format!("{}={:.2}", c.agent_id, c.score))
        .collect::<Vec<_>>()
        .join(", ")
}
