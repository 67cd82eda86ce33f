//! Analysis-tool boundary.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::issue::Issue;

/// What the checker should look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckScope {
    /// Project root.
    pub root: PathBuf,
    /// Restrict the check to these paths; empty means the whole project.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    /// 1-based iteration requesting the check.
    pub iteration: u32,
}

impl CheckScope {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            paths: Vec::new(),
            iteration: 0,
        }
    }

    pub fn with_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.paths = paths;
        self
    }

    pub fn for_iteration(&self, iteration: u32) -> Self {
        Self {
            iteration,
            ..self.clone()
        }
    }
}

/// Failure to produce an issue list. Always fatal to the loop.
#[derive(Debug, thiserror::Error)]
pub enum CheckerError {
    #[error("checker failed to run: {0}")]
    Execution(String),

    #[error("checker output could not be parsed: {0}")]
    Parse(String),

    #[error("checker I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs analysis tools and reports the outstanding issues.
#[async_trait]
pub trait Checker: Send + Sync {
    async fn run_checks(&self, scope: &CheckScope) -> Result<Vec<Issue>, CheckerError>;
}
