//! Agent boundary: how an agent turns an issue into a candidate patch is
//! opaque to the core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::issue::Issue;
use crate::patch::Patch;

/// A candidate patch and the agent's own confidence in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixProposal {
    pub patch: Patch,
    pub confidence: f64,
}

impl FixProposal {
    pub fn new(patch: Patch, confidence: f64) -> Self {
        Self { patch, confidence }
    }
}

/// Generation failures. Recorded as a failed attempt, never fatal.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FixerError {
    #[error("agent unavailable: {0}")]
    Unavailable(String),

    #[error("agent returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("agent transport error: {0}")]
    Transport(String),

    #[error("agent declined: {0}")]
    Declined(String),
}

/// One agent's patch generator.
#[async_trait]
pub trait Fixer: Send + Sync {
    async fn propose_fix(&self, issue: &Issue, content: &str) -> Result<FixProposal, FixerError>;
}
