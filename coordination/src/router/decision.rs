//! Routing decision types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How the executor dispatches an issue to the selected agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One agent.
    Single,
    /// All selected agents concurrently against the same snapshot; the best
    /// passing attempt wins.
    Parallel,
    /// Agent 1, then agent 2 on the original content if agent 1 fails.
    Sequential,
    /// Generalists in listed order until one passes.
    Fallback,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Parallel => write!(f, "parallel"),
            Self::Sequential => write!(f, "sequential"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// The router's verdict for one issue in one iteration.
///
/// `selected_agent_ids` is never empty and `confidence_scores` lines up with
/// it. For specialist strategies `selected_skill_ids` lines up as well; a
/// fallback decision carries no skills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub issue_id: String,
    pub selected_agent_ids: Vec<String>,
    pub selected_skill_ids: Vec<String>,
    pub confidence_scores: Vec<f64>,
    pub strategy: Strategy,
    pub reasoning: String,
}

impl RoutingDecision {
    /// Skill that routed the agent at `index`, if any.
    pub fn skill_for(&self, index: usize) -> Option<&str> {
        self.selected_skill_ids.get(index).map(String::as_str)
    }

    /// Confidence for the agent at `index`.
    pub fn confidence_for(&self, index: usize) -> f64 {
        self.confidence_scores.get(index).copied().unwrap_or(0.0)
    }

    /// `(agent, skill, confidence)` triples in dispatch order.
    pub fn selections(&self) -> impl Iterator<Item = (&str, Option<&str>, f64)> + '_ {
        self.selected_agent_ids
            .iter()
            .enumerate()
            .map(|(i, agent)| (agent.as_str(), self.skill_for(i), self.confidence_for(i)))
    }

    pub fn is_fallback(&self) -> bool {
        self.strategy == Strategy::Fallback
    }
}

/// One skill's score for an issue, before and after the learning adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillScore {
    pub skill_id: String,
    pub agent_id: String,
    pub raw: f64,
    pub adjusted: f64,
}

/// An agent ranked by its best matching skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCandidate {
    pub agent_id: String,
    pub skill_id: String,
    pub score: f64,
}
