//! Confidence Scorer — pure issue-to-skill matching
//!
//! ```text
//! score = w_tags    × |tags ∩ tokens| / |tags|
//!       + w_context × modifier
//!       + w_base    × skill.base_confidence
//!
//! modifier = 1.0
//!          × 0.5 when test-scoped skill vs production file (or the reverse)
//!          × 1.2 when a critical issue's category matches the skill category
//! ```
//!
//! The result is clamped to `[0, 1]`. Scoring never fails: malformed or
//! unrelated input degrades toward zero.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::catalog::Skill;
use crate::issue::{Issue, Severity};

/// Weights and contextual modifiers for [`ConfidenceScorer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight of the tag-overlap ratio.
    pub tag_weight: f64,
    /// Weight of the contextual modifier.
    pub context_weight: f64,
    /// Weight of the skill's declared base confidence.
    pub base_weight: f64,
    /// Multiplier applied when a test-scoped skill meets production code or
    /// vice versa.
    pub test_mismatch_factor: f64,
    /// Multiplier applied when a critical issue's category matches the
    /// skill's category.
    pub critical_match_factor: f64,
    /// Score zero when the issue shares no tag with the skill.
    pub require_tag_overlap: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            tag_weight: 0.5,
            context_weight: 0.3,
            base_weight: 0.2,
            test_mismatch_factor: 0.5,
            critical_match_factor: 1.2,
            require_tag_overlap: true,
        }
    }
}

/// Breakdown of one score, kept for routing explanations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub tag_overlap: f64,
    pub context: f64,
    pub base: f64,
    pub total: f64,
}

/// Side-effect-free scorer.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    config: ScoringConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score `issue` against `skill`, in `[0, 1]`.
    pub fn score(&self, issue: &Issue, skill: &Skill) -> f64 {
        self.breakdown(issue, skill).total
    }

    /// Score with the per-component contributions.
    pub fn breakdown(&self, issue: &Issue, skill: &Skill) -> ScoreBreakdown {
        let tokens = issue_tokens(issue);
        let overlap = tag_overlap(&skill.tags, &tokens);

        if self.config.require_tag_overlap && overlap <= 0.0 {
            return ScoreBreakdown {
                tag_overlap: 0.0,
                context: 0.0,
                base: 0.0,
                total: 0.0,
            };
        }

        let mut context = 1.0;
        if skill.category.is_test_scoped() != issue.is_test_file() {
            context *= self.config.test_mismatch_factor;
        }
        if issue.severity == Severity::Critical && skill.category.matches_tag(&issue.category) {
            context *= self.config.critical_match_factor;
        }

        let tag_part = finite_or_zero(self.config.tag_weight * overlap);
        let context_part = finite_or_zero(self.config.context_weight * context);
        let base_part = finite_or_zero(self.config.base_weight * skill.base_confidence);
        let total = (tag_part + context_part + base_part).clamp(0.0, 1.0);

        ScoreBreakdown {
            tag_overlap: tag_part,
            context: context_part,
            base: base_part,
            total,
        }
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

/// Fraction of the skill's tags that appear among the issue tokens.
fn tag_overlap(tags: &BTreeSet<String>, tokens: &BTreeSet<String>) -> f64 {
    if tags.is_empty() {
        return 0.0;
    }
    let hits = tags.iter().filter(|t| tokens.contains(*t)).count();
    hits as f64 / tags.len() as f64
}

/// Lower-cased alphanumeric tokens from the description and category tag.
///
/// Snake-case identifiers are kept whole and also split into their parts, so
/// `shell_injection` matches the tags `shell_injection`, `shell` and
/// `injection`.
pub fn issue_tokens(issue: &Issue) -> BTreeSet<String> {
    let mut tokens = tokenize(&issue.description);
    tokens.extend(tokenize(&issue.category));
    tokens
}

fn tokenize(text: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for word in text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        if word.contains('_') {
            out.extend(
                word.split('_')
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            );
        }
        out.insert(word);
    }
    out
}
