//! Wiring a [`SwarmConfig`] into the coordination engine.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use remedy_coordination::{
    CheckScope, Collaborators, ConfidenceScorer, ConvergenceLoop, EffectivenessStore,
    FsFileBoundary, InMemoryEffectivenessStore, Issue, JsonFileEffectivenessStore,
    RoutingDecision, SkillRouter, WorkflowResult,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::SwarmConfig;

/// Learning store named by `state_path`, or an in-memory one.
pub fn open_store(config: &SwarmConfig) -> Result<Arc<dyn EffectivenessStore>> {
    match &config.state_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let store = JsonFileEffectivenessStore::load(path)
                .with_context(|| format!("Failed to load learning state {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryEffectivenessStore::new())),
    }
}

/// Build the loop with process and HTTP collaborators rooted at
/// `config.root`.
pub fn build_loop(config: &SwarmConfig, cancel: CancellationToken) -> Result<ConvergenceLoop> {
    let catalog = Arc::new(config.catalog()?);
    let collaborators = Collaborators {
        checker: Arc::new(config.checker()?),
        fixers: config.fixers()?,
        files: Arc::new(FsFileBoundary::new(&config.root).with_backup(config.backup)),
        store: open_store(config)?,
    };

    let engine = ConvergenceLoop::new(catalog, config.engine.clone(), collaborators)
        .context("Failed to build convergence loop")?
        .with_scope(CheckScope::new(&config.root))
        .with_cancellation(cancel);
    Ok(engine)
}

/// Run the loop to a terminal state.
pub async fn run(config: &SwarmConfig, cancel: CancellationToken) -> Result<WorkflowResult> {
    let engine = build_loop(config, cancel)?;
    info!(
        root = %config.root.display(),
        agents = config.agents.len(),
        skills = config.skills.len(),
        "Remedy run starting"
    );
    Ok(engine.run().await)
}

/// Routing decisions for issues read from a JSON file, without fixing.
pub fn route_file(config: &SwarmConfig, issues_path: &Path) -> Result<Vec<RoutingDecision>> {
    let text = std::fs::read_to_string(issues_path)
        .with_context(|| format!("Failed to read {}", issues_path.display()))?;
    let issues: Vec<Issue> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of issues", issues_path.display()))?;
    route_issues(config, issues)
}

pub fn route_issues(config: &SwarmConfig, mut issues: Vec<Issue>) -> Result<Vec<RoutingDecision>> {
    let router = SkillRouter::new(
        Arc::new(config.catalog()?),
        ConfidenceScorer::new(config.engine.scoring.clone()),
        open_store(config)?,
        config.engine.routing(),
    );
    remedy_coordination::issue::processing_order(&mut issues);
    Ok(issues.iter().map(|issue| router.route(issue)).collect())
}
