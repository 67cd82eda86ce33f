//! Fix attempt records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::patch::Patch;
use crate::router::Strategy;

use super::validation::Rejection;

/// Pass/fail with every reason the attempt was refused.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl ValidationResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reasons: Vec::new(),
        }
    }

    pub fn fail(rejections: impl IntoIterator<Item = Rejection>) -> Self {
        Self {
            passed: false,
            reasons: rejections.into_iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Demote to failed, adding `rejection`.
    pub fn reject(&mut self, rejection: Rejection) {
        self.passed = false;
        self.reasons.push(rejection.to_string());
    }
}

/// One agent's proposal for one issue and what became of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixAttempt {
    pub attempt_id: Uuid,
    pub agent_id: String,
    pub issue_id: String,
    /// Skill that routed this agent; `None` for generalists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
    /// `None` when the agent produced nothing (timeout, generation error).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Patch>,
    /// Agent-reported confidence, clamped to `[0, 1]`.
    pub confidence: f64,
    pub validation: ValidationResult,
    /// Set only after validation passed and the write landed.
    pub applied: bool,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl FixAttempt {
    pub(crate) fn new(agent_id: &str, issue_id: &str, skill_id: Option<&str>) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            issue_id: issue_id.to_string(),
            skill_id: skill_id.map(str::to_string),
            patch: None,
            confidence: 0.0,
            validation: ValidationResult::default(),
            applied: false,
            timestamp: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.validation.passed
    }
}

/// Clamp an agent-reported confidence into `[0, 1]`; non-finite becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Everything the executor did for one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixOutcome {
    pub issue_id: String,
    pub strategy: Strategy,
    pub reasoning: String,
    pub attempts: Vec<FixAttempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_agent: Option<String>,
}

impl FixOutcome {
    pub fn is_fixed(&self) -> bool {
        self.applied_agent.is_some()
    }

    pub fn applied_attempt(&self) -> Option<&FixAttempt> {
        self.attempts.iter().find(|a| a.applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(0.42), 0.42);
    }

    #[test]
    fn test_reject_demotes() {
        let mut v = ValidationResult::pass();
        v.reject(Rejection::Stale);
        assert!(!v.passed);
        assert_eq!(v.reasons, vec!["stale"]);
    }

    #[test]
    fn test_attempt_serializes_without_empty_fields() {
        let mut a = FixAttempt::new("sec", "B602", None);
        a.validation = ValidationResult::fail([Rejection::Timeout]);
        let json = serde_json::to_value(&a).unwrap();
        assert!(json.get("skill_id").is_none());
        assert!(json.get("patch").is_none());
        assert_eq!(json["validation"]["reasons"][0], "timeout");
    }
}
