//! Engine configuration: every weight, threshold and limit in one place.
//!
//! Deserializes from TOML with every field optional:
//!
//! ```toml
//! [scoring]
//! tag_weight = 0.5
//!
//! [router]
//! min_confidence = 0.7
//!
//! [executor]
//! max_diff_lines = 50
//!
//! [convergence]
//! max_iterations = 10
//! ```

use serde::{Deserialize, Serialize};

use crate::convergence::LoopConfig;
use crate::error::{CoordinationError, CoordinationResult};
use crate::executor::ExecutorConfig;
use crate::router::RouterConfig;
use crate::scoring::ScoringConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub router: RouterConfig,
    pub executor: ExecutorConfig,
    pub convergence: LoopConfig,
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> CoordinationResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| CoordinationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Router settings with the parallel pick capped at
    /// `executor.max_parallel_agents`.
    pub fn routing(&self) -> RouterConfig {
        let mut router = self.router.clone();
        router.parallel_fanout = router
            .parallel_fanout
            .min(self.executor.max_parallel_agents)
            .max(1);
        router
    }

    /// Reject values that would make scoring or termination meaningless.
    pub fn validate(&self) -> CoordinationResult<()> {
        let s = &self.scoring;
        for (name, value) in [
            ("scoring.tag_weight", s.tag_weight),
            ("scoring.context_weight", s.context_weight),
            ("scoring.base_weight", s.base_weight),
            ("scoring.test_mismatch_factor", s.test_mismatch_factor),
            ("scoring.critical_match_factor", s.critical_match_factor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CoordinationError::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        let r = &self.router;
        for (name, value) in [
            ("router.min_confidence", r.min_confidence),
            ("router.single_threshold", r.single_threshold),
            ("router.parallel_threshold", r.parallel_threshold),
            ("router.fallback_confidence", r.fallback_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoordinationError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if r.parallel_fanout == 0 {
            return Err(CoordinationError::Config(
                "router.parallel_fanout must be at least 1".into(),
            ));
        }

        if self.executor.max_parallel_agents == 0 {
            return Err(CoordinationError::Config(
                "executor.max_parallel_agents must be at least 1".into(),
            ));
        }
        if self.executor.agent_timeout_secs == 0 {
            return Err(CoordinationError::Config(
                "executor.agent_timeout_secs must be at least 1".into(),
            ));
        }

        if self.convergence.max_iterations == 0 {
            return Err(CoordinationError::Config(
                "convergence.max_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
