//! The skill catalog: validated skills and agents with an explicit
//! agent ↔ skill ownership map, built once per run.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::types::{Agent, Skill};

/// Errors raised while assembling a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Duplicate skill id: {0}")]
    DuplicateSkill(String),

    #[error("Duplicate agent id: {0}")]
    DuplicateAgent(String),

    #[error("Agent {agent} references unknown skill {skill}")]
    UnknownSkill { agent: String, skill: String },

    #[error("Skill {skill} is owned by both {first} and {second}")]
    SharedSkill {
        skill: String,
        first: String,
        second: String,
    },

    #[error("Skill {0} is not owned by any agent")]
    OrphanSkill(String),

    #[error("Skill {skill} has base confidence {value} outside [0, 1]")]
    InvalidBaseConfidence { skill: String, value: f64 },

    #[error("Unknown generalist agent: {0}")]
    UnknownGeneralist(String),

    #[error("At least one generalist agent is required for fallback routing")]
    NoGeneralists,
}

/// Result type alias for catalog construction.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Immutable registry of skills and the agents that own them.
#[derive(Debug, Clone)]
pub struct SkillCatalog {
    skills: Vec<Skill>,
    agents: Vec<Agent>,
    generalists: Vec<String>,
    skill_index: HashMap<String, usize>,
    agent_index: HashMap<String, usize>,
    owner_of: HashMap<String, String>,
}

impl SkillCatalog {
    /// Build and validate a catalog. Skill tags are normalized here, so
    /// deserialized skills match issue tokens regardless of case.
    ///
    /// Every skill must be owned by exactly one agent, every generalist must
    /// be a declared agent, and at least one generalist is required so that
    /// fallback routing always has somewhere to go.
    pub fn new(
        skills: Vec<Skill>,
        agents: Vec<Agent>,
        generalists: Vec<String>,
    ) -> CatalogResult<Self> {
        let skills: Vec<Skill> = skills.into_iter().map(Skill::normalized).collect();
        let mut skill_index = HashMap::with_capacity(skills.len());
        for (i, skill) in skills.iter().enumerate() {
            if !(0.0..=1.0).contains(&skill.base_confidence) {
                return Err(CatalogError::InvalidBaseConfidence {
                    skill: skill.id.clone(),
                    value: skill.base_confidence,
                });
            }
            if skill_index.insert(skill.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateSkill(skill.id.clone()));
            }
        }

        let mut agent_index = HashMap::with_capacity(agents.len());
        let mut owner_of: HashMap<String, String> = HashMap::new();
        for (i, agent) in agents.iter().enumerate() {
            if agent_index.insert(agent.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateAgent(agent.id.clone()));
            }
            for skill_id in &agent.skills {
                if !skill_index.contains_key(skill_id) {
                    return Err(CatalogError::UnknownSkill {
                        agent: agent.id.clone(),
                        skill: skill_id.clone(),
                    });
                }
                if let Some(first) = owner_of.insert(skill_id.clone(), agent.id.clone()) {
                    return Err(CatalogError::SharedSkill {
                        skill: skill_id.clone(),
                        first,
                        second: agent.id.clone(),
                    });
                }
            }
        }

        if let Some(orphan) = skills.iter().find(|s| !owner_of.contains_key(&s.id)) {
            return Err(CatalogError::OrphanSkill(orphan.id.clone()));
        }

        if generalists.is_empty() {
            return Err(CatalogError::NoGeneralists);
        }
        let mut seen = HashSet::new();
        let mut ordered_generalists = Vec::with_capacity(generalists.len());
        for id in generalists {
            if !agent_index.contains_key(&id) {
                return Err(CatalogError::UnknownGeneralist(id));
            }
            if seen.insert(id.clone()) {
                ordered_generalists.push(id);
            }
        }

        Ok(Self {
            skills,
            agents,
            generalists: ordered_generalists,
            skill_index,
            agent_index,
            owner_of,
        })
    }

    /// All skills in declaration order.
    pub fn skills(&self) -> &[Skill] {
        &self.skills
    }

    /// All agents in declaration order.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Generalist agent ids in fallback order.
    pub fn generalists(&self) -> &[String] {
        &self.generalists
    }

    pub fn skill(&self, id: &str) -> Option<&Skill> {
        self.skill_index.get(id).map(|&i| &self.skills[i])
    }

    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agent_index.get(id).map(|&i| &self.agents[i])
    }

    /// Agent that owns a skill.
    pub fn owner_of(&self, skill_id: &str) -> Option<&str> {
        self.owner_of.get(skill_id).map(String::as_str)
    }

    /// Skill ids owned by an agent.
    pub fn skills_of(&self, agent_id: &str) -> Option<&BTreeSet<String>> {
        self.agent(agent_id).map(|a| &a.skills)
    }

    /// Declaration position of an agent, used as the deterministic tie-break.
    pub fn agent_rank(&self, agent_id: &str) -> usize {
        self.agent_index.get(agent_id).copied().unwrap_or(usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::SkillCategory;

    fn skills() -> Vec<Skill> {
        vec![
            Skill::new("shell", SkillCategory::Security, 0.95).with_tags(["shell", "subprocess"]),
            Skill::new("imports", SkillCategory::Style, 0.8).with_tags(["import", "unused"]),
        ]
    }

    fn agents() -> Vec<Agent> {
        vec![
            Agent::new("sec", "Security").with_skills(["shell"]),
            Agent::new("lint", "Linter").with_skills(["imports"]),
            Agent::new("general", "Generalist"),
        ]
    }

    #[test]
    fn test_bidirectional_map() {
        let catalog = SkillCatalog::new(skills(), agents(), vec!["general".into()]).unwrap();
        assert_eq!(catalog.owner_of("shell"), Some("sec"));
        assert_eq!(catalog.owner_of("imports"), Some("lint"));
        assert!(catalog.skills_of("sec").unwrap().contains("shell"));
        assert!(catalog.skills_of("general").unwrap().is_empty());
        assert_eq!(catalog.agent_rank("lint"), 1);
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_tags_normalized_on_build() {
        let mut raw = skills();
        raw[0].tags = ["Shell".to_string(), " SUBPROCESS ".to_string()].into();
        let catalog = SkillCatalog::new(raw, agents(), vec!["general".into()]).unwrap();
        let tags: Vec<&str> = catalog
            .skill("shell")
            .unwrap()
            .tags
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(tags, vec!["shell", "subprocess"]);
    }

    #[test]
    fn test_unknown_skill_rejected() {
        let mut agents = agents();
        agents[0].skills.insert("missing".into());
        let err = SkillCatalog::new(skills(), agents, vec!["general".into()]).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownSkill { .. }));
    }

    #[test]
    fn test_shared_skill_rejected() {
        let mut agents = agents();
        agents[1].skills.insert("shell".into());
        let err = SkillCatalog::new(skills(), agents, vec!["general".into()]).unwrap_err();
        assert!(matches!(err, CatalogError::SharedSkill { .. }));
    }

    #[test]
    fn test_orphan_skill_rejected() {
        let mut skills = skills();
        skills.push(Skill::new("orphan", SkillCategory::General, 0.5));
        let err = SkillCatalog::new(skills, agents(), vec!["general".into()]).unwrap_err();
        assert!(matches!(err, CatalogError::OrphanSkill(id) if id == "orphan"));
    }

    #[test]
    fn test_generalists_required_and_known() {
        let err = SkillCatalog::new(skills(), agents(), vec![]).unwrap_err();
        assert!(matches!(err, CatalogError::NoGeneralists));

        let err = SkillCatalog::new(skills(), agents(), vec!["ghost".into()]).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownGeneralist(_)));
    }

    #[test]
    fn test_invalid_base_confidence() {
        let mut skills = skills();
        skills[0].base_confidence = 1.4;
        let err = SkillCatalog::new(skills, agents(), vec!["general".into()]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidBaseConfidence { .. }));
    }

    #[test]
    fn test_duplicate_generalists_collapsed() {
        let catalog = SkillCatalog::new(
            skills(),
            agents(),
            vec!["general".into(), "lint".into(), "general".into()],
        )
        .unwrap();
        assert_eq!(catalog.generalists(), &["general".to_string(), "lint".to_string()]);
    }
}
