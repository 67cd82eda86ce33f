//! Run configuration: one TOML file plus `REMEDY_*` environment overrides.
//!
//! ```toml
//! root = "."
//! state_path = ".remedy/effectiveness.json"
//! generalists = ["generalist"]
//!
//! [checker]
//! command = "ruff-json --output-format json"
//!
//! [engine.convergence]
//! max_iterations = 10
//!
//! [[skills]]
//! id = "shell-injection"
//! category = "security"
//! base_confidence = 0.95
//! tags = ["subprocess", "shell", "security"]
//!
//! [[agents]]
//! id = "security-fixer"
//! name = "Security Fixer"
//! skills = ["shell-injection"]
//! command = "python agents/security.py"
//!
//! [[agents]]
//! id = "generalist"
//! name = "Generalist"
//! url = "http://localhost:8080/fix"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use remedy_coordination::{Agent, EngineConfig, FixerRegistry, Skill, SkillCatalog};
use serde::Deserialize;

use crate::adapters::{CommandChecker, CommandFixer, HttpFixer};

/// Log line format for the subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => bail!("unknown log format '{other}' (expected text or json)"),
        }
    }
}

/// Analysis command run once per iteration.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckerSettings {
    pub command: String,
    #[serde(default = "default_checker_timeout")]
    pub timeout_secs: u64,
}

fn default_checker_timeout() -> u64 {
    600
}

/// An agent and the transport used to reach it. Exactly one of `command`
/// and `url` must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Process agent: reads a JSON request on stdin, writes a reply on stdout.
    #[serde(default)]
    pub command: Option<String>,
    /// HTTP agent: receives the same request as a JSON POST.
    #[serde(default)]
    pub url: Option<String>,
    /// Bearer token for HTTP agents.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Where an agent's fixes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Command(String),
    Http { url: String, api_key: Option<String> },
}

impl AgentSettings {
    pub fn endpoint(&self) -> Result<Endpoint> {
        match (&self.command, &self.url) {
            (Some(command), None) => Ok(Endpoint::Command(command.clone())),
            (None, Some(url)) => Ok(Endpoint::Http {
                url: url.clone(),
                api_key: self.api_key.clone(),
            }),
            (Some(_), Some(_)) => bail!("agent '{}' sets both command and url", self.id),
            (None, None) => bail!("agent '{}' needs a command or a url", self.id),
        }
    }

    fn to_agent(&self) -> Agent {
        let agent = Agent::new(&self.id, self.name.clone().unwrap_or_else(|| self.id.clone()))
            .with_skills(self.skills.iter().cloned());
        match self.max_concurrency {
            Some(max) => agent.with_max_concurrency(max),
            None => agent,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_backup() -> bool {
    true
}

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct SwarmConfig {
    /// Project root; relative issue paths resolve against it.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Learning store file. `None` keeps effectiveness in memory.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    /// Keep a `.remedy.bak` copy of each file's original content.
    #[serde(default = "default_backup")]
    pub backup: bool,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub engine: EngineConfig,
    pub checker: CheckerSettings,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub agents: Vec<AgentSettings>,
    #[serde(default)]
    pub generalists: Vec<String>,
}

impl SwarmConfig {
    /// Read `path`, apply `REMEDY_*` overrides from the process environment
    /// and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config = Self::from_toml_str(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without overrides or validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse TOML")
    }

    /// Apply `REMEDY_MAX_ITERATIONS`, `REMEDY_STATE_PATH` and
    /// `REMEDY_LOG_FORMAT` as returned by `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("REMEDY_MAX_ITERATIONS") {
            self.engine.convergence.max_iterations = raw
                .trim()
                .parse()
                .with_context(|| format!("REMEDY_MAX_ITERATIONS is not a number: '{raw}'"))?;
        }
        if let Some(raw) = lookup("REMEDY_STATE_PATH") {
            self.state_path = (!raw.trim().is_empty()).then(|| PathBuf::from(raw));
        }
        if let Some(raw) = lookup("REMEDY_LOG_FORMAT") {
            self.log_format = raw.parse()?;
        }
        Ok(())
    }

    /// Engine ranges, catalog integrity and agent endpoints.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.catalog()?;
        for agent in &self.agents {
            agent.endpoint()?;
        }
        if shlex::split(&self.checker.command).map_or(true, |argv| argv.is_empty()) {
            bail!("checker.command is empty or has unbalanced quotes");
        }
        Ok(())
    }

    pub fn catalog(&self) -> Result<SkillCatalog> {
        let agents = self.agents.iter().map(AgentSettings::to_agent).collect();
        SkillCatalog::new(self.skills.clone(), agents, self.generalists.clone())
            .context("Invalid skill catalog")
    }

    pub fn checker(&self) -> Result<CommandChecker> {
        Ok(CommandChecker::new(&self.checker.command)?
            .with_timeout(Duration::from_secs(self.checker.timeout_secs)))
    }

    /// One fixer per configured agent. Process agents run in `root`.
    pub fn fixers(&self) -> Result<FixerRegistry> {
        let mut registry = FixerRegistry::new();
        for agent in &self.agents {
            match agent.endpoint()? {
                Endpoint::Command(command) => {
                    let fixer = CommandFixer::new(&agent.id, &command, &self.root)
                        .with_context(|| format!("Invalid command for agent '{}'", agent.id))?;
                    registry.insert(&agent.id, Arc::new(fixer));
                }
                Endpoint::Http { url, api_key } => {
                    let fixer = HttpFixer::new(&agent.id, url).with_api_key(api_key);
                    registry.insert(&agent.id, Arc::new(fixer));
                }
            }
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_coordination::{ConfidenceScorer, Issue, Severity};

    const MINIMAL: &str = r#"
        generalists = ["fixer"]

        [checker]
        command = "cat issues.json"

        [[skills]]
        id = "null-guard"
        category = "correctness"
        base_confidence = 0.6
        tags = ["null"]

        [[agents]]
        id = "fixer"
        skills = ["null-guard"]
        command = "python fix.py"
    "#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = SwarmConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.root, PathBuf::from("."));
        assert!(config.backup);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.catalog().unwrap().owner_of("null-guard"), Some("fixer"));
    }

    #[test]
    fn test_mixed_case_tags_still_match() {
        let config = SwarmConfig::from_toml_str(
            r#"
            generalists = ["generalist"]

            [checker]
            command = "cat issues.json"

            [[skills]]
            id = "shell-injection"
            category = "security"
            base_confidence = 0.95
            tags = ["Subprocess", "Shell", "Security"]

            [[agents]]
            id = "security-fixer"
            skills = ["shell-injection"]
            command = "python fix.py"

            [[agents]]
            id = "generalist"
            command = "python general.py"
            "#,
        )
        .unwrap();
        let catalog = config.catalog().unwrap();
        let skill = catalog.skill("shell-injection").unwrap();
        let issue = Issue::new(
            "B602",
            "uses shell=True via subprocess",
            "run.py",
            Severity::Critical,
            "security",
        );

        let score = ConfidenceScorer::new(config.engine.scoring.clone()).score(&issue, skill);
        assert!(score > 0.9, "score = {score}");
    }

    #[test]
    fn test_overrides() {
        let mut config = SwarmConfig::from_toml_str(MINIMAL).unwrap();
        config
            .apply_overrides(|key| match key {
                "REMEDY_MAX_ITERATIONS" => Some("3".into()),
                "REMEDY_STATE_PATH" => Some("/tmp/eff.json".into()),
                "REMEDY_LOG_FORMAT" => Some("JSON".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.engine.convergence.max_iterations, 3);
        assert_eq!(config.state_path, Some(PathBuf::from("/tmp/eff.json")));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_bad_override_rejected() {
        let mut config = SwarmConfig::from_toml_str(MINIMAL).unwrap();
        let err = config
            .apply_overrides(|key| (key == "REMEDY_MAX_ITERATIONS").then(|| "ten".into()))
            .unwrap_err();
        assert!(err.to_string().contains("REMEDY_MAX_ITERATIONS"));
    }

    #[test]
    fn test_agent_endpoint_required() {
        let agent = AgentSettings {
            id: "a".into(),
            name: None,
            skills: vec![],
            max_concurrency: None,
            command: None,
            url: None,
            api_key: None,
        };
        assert!(agent.endpoint().is_err());

        let both = AgentSettings {
            command: Some("x".into()),
            url: Some("http://x".into()),
            ..agent
        };
        assert!(both.endpoint().is_err());
    }
}
