//! Skill effectiveness — the learning feedback loop
//!
//! Every validated fix attempt credits or debits the skill that routed it.
//! Once a skill has enough samples, the router scales its score by
//! `0.5 + 0.5 × success_rate`, so unreliable skills lose priority without
//! any manual tuning.
//!
//! The store is the only mutable state shared between the router (reads)
//! and the executor (writes). It is injected, never global.

pub mod error;
pub mod store;

use serde::{Deserialize, Serialize};

pub use error::{LearningError, LearningResult};
pub use store::{InMemoryEffectivenessStore, JsonFileEffectivenessStore};

/// Minimum recorded attempts before the learning adjustment applies.
pub const DEFAULT_MIN_SAMPLES: u32 = 10;

/// Attempt/success counters for one skill.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SkillEffectiveness {
    pub skill_id: String,
    pub attempts: u32,
    pub successes: u32,
}

impl SkillEffectiveness {
    pub fn new(skill_id: impl Into<String>) -> Self {
        Self {
            skill_id: skill_id.into(),
            attempts: 0,
            successes: 0,
        }
    }

    /// Success ratio over all recorded attempts (0.0 when none).
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        f64::from(self.successes.min(self.attempts)) / f64::from(self.attempts)
    }

    /// Record one validated attempt.
    pub fn record(&mut self, success: bool) {
        self.attempts = self.attempts.saturating_add(1);
        if success {
            self.successes = self.successes.saturating_add(1);
        }
    }

    /// Score multiplier for routing.
    ///
    /// Returns 1.0 until `min_samples` attempts are recorded, then
    /// `0.5 + 0.5 × success_rate`.
    pub fn adjustment(&self, min_samples: u32) -> f64 {
        if self.attempts < min_samples {
            return 1.0;
        }
        0.5 + 0.5 * self.success_rate()
    }
}

/// Injectable store of per-skill effectiveness.
///
/// Implementations use interior mutability so a single `Arc<dyn
/// EffectivenessStore>` can be shared by the router and the executor.
pub trait EffectivenessStore: Send + Sync {
    /// Current counters for a skill, if any attempts were recorded.
    fn get(&self, skill_id: &str) -> Option<SkillEffectiveness>;

    /// Record one validated attempt and return the updated counters.
    fn record(&self, skill_id: &str, success: bool) -> SkillEffectiveness;

    /// All counters, ordered by skill id.
    fn snapshot(&self) -> Vec<SkillEffectiveness>;

    /// Persist to backing storage. No-op for in-memory stores.
    fn persist(&self) -> LearningResult<()> {
        Ok(())
    }
}
