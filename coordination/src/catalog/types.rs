//! Skill and agent definitions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Broad area a skill covers. Matched against an issue's category tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    Security,
    Correctness,
    Performance,
    Style,
    Typing,
    Complexity,
    Documentation,
    Testing,
    General,
}

impl SkillCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Correctness => "correctness",
            Self::Performance => "performance",
            Self::Style => "style",
            Self::Typing => "typing",
            Self::Complexity => "complexity",
            Self::Documentation => "documentation",
            Self::Testing => "testing",
            Self::General => "general",
        }
    }

    /// Case-insensitive match against an issue category tag.
    pub fn matches_tag(&self, tag: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(tag.trim())
    }

    /// Skills in this category only make sense on test code.
    pub fn is_test_scoped(&self) -> bool {
        matches!(self, Self::Testing)
    }
}

impl std::fmt::Display for SkillCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared, tag-scoped fixing capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub category: SkillCategory,
    #[serde(default)]
    pub description: String,
    /// Prior confidence in this skill, 0.0–1.0.
    pub base_confidence: f64,
    /// Lower-cased match tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Skill {
    pub fn new(id: impl Into<String>, category: SkillCategory, base_confidence: f64) -> Self {
        Self {
            id: id.into(),
            category,
            description: String::new(),
            base_confidence,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    /// Trim and lower-case the tags, dropping empty ones. Deserialized
    /// skills keep tags as written until this runs.
    pub fn normalized(mut self) -> Self {
        self.tags = normalize_tags(std::mem::take(&mut self.tags));
        self
    }
}

fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn default_max_concurrency() -> usize {
    1
}

/// One fixing persona: a named bundle of skills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// Ids of the skills this agent owns.
    #[serde(default)]
    pub skills: BTreeSet<String>,
    /// Maximum simultaneous invocations of this agent.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            skills: BTreeSet::new(),
            max_concurrency: default_max_concurrency(),
        }
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }
}
