//! Fixers that reach agents over a child process or HTTP.
//!
//! Request, written to stdin or POSTed as the body:
//!
//! ```json
//! {"agent_id": "security-fixer", "issue": {...}, "content": "<file text>"}
//! ```
//!
//! Reply, on stdout or as the response body:
//!
//! ```json
//! {"patch": {"hunks": [{"old_lines": [...], "new_lines": [...]}]}, "confidence": 0.9}
//! {"declined": "reason"}
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use remedy_coordination::{FixProposal, Fixer, FixerError, Issue};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{split_command, tail};

#[derive(Debug, Serialize)]
pub struct FixRequest<'a> {
    pub agent_id: &'a str,
    pub issue: &'a Issue,
    pub content: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FixReply {
    Proposal(FixProposal),
    Declined { declined: String },
}

/// Decode an agent reply.
pub fn parse_reply(body: &[u8]) -> Result<FixProposal, FixerError> {
    let reply: FixReply = serde_json::from_slice(body)
        .map_err(|e| FixerError::InvalidResponse(format!("{e}: {}", tail(body, 200))))?;
    match reply {
        FixReply::Proposal(proposal) => Ok(proposal),
        FixReply::Declined { declined } => Err(FixerError::Declined(declined)),
    }
}

// ---------------------------------------------------------------------------
// CommandFixer
// ---------------------------------------------------------------------------

/// Runs one process per request in the project root. The process is killed
/// if the executor's timeout drops the call.
#[derive(Debug)]
pub struct CommandFixer {
    agent_id: String,
    argv: Vec<String>,
    working_dir: PathBuf,
}

impl CommandFixer {
    pub fn new(agent_id: &str, command: &str, working_dir: &Path) -> Result<Self, FixerError> {
        let argv = split_command(command).ok_or_else(|| {
            FixerError::Unavailable(format!("unusable agent command: {command:?}"))
        })?;
        Ok(Self {
            agent_id: agent_id.to_string(),
            argv,
            working_dir: working_dir.to_path_buf(),
        })
    }
}

#[async_trait]
impl Fixer for CommandFixer {
    async fn propose_fix(&self, issue: &Issue, content: &str) -> Result<FixProposal, FixerError> {
        let request = serde_json::to_vec(&FixRequest {
            agent_id: &self.agent_id,
            issue,
            content,
        })
        .map_err(|e| FixerError::Transport(e.to_string()))?;

        let mut child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FixerError::Unavailable(format!("{}: {e}", self.argv[0])))?;

        if let Some(mut stdin) = child.stdin.take() {
            // An agent that exits without reading stdin still gets its reply read.
            match stdin.write_all(&request).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(FixerError::Transport(e.to_string())),
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| FixerError::Transport(e.to_string()))?;
        debug!(agent = %self.agent_id, status = %output.status, "Agent process finished");

        if !output.status.success() {
            return Err(FixerError::Unavailable(format!(
                "{} exited with {}: {}",
                self.argv[0],
                output.status,
                tail(&output.stderr, 500)
            )));
        }
        parse_reply(&output.stdout)
    }
}

// ---------------------------------------------------------------------------
// HttpFixer
// ---------------------------------------------------------------------------

/// POSTs each request to an agent endpoint.
#[derive(Debug, Clone)]
pub struct HttpFixer {
    agent_id: String,
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpFixer {
    pub fn new(agent_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            url: url.into(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Fixer for HttpFixer {
    async fn propose_fix(&self, issue: &Issue, content: &str) -> Result<FixProposal, FixerError> {
        let mut request = self.client.post(&self.url).json(&FixRequest {
            agent_id: &self.agent_id,
            issue,
            content,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                FixerError::Unavailable(format!("{}: {e}", self.url))
            } else {
                FixerError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| FixerError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(FixerError::Unavailable(format!(
                "{} returned {status}: {}",
                self.url,
                tail(&body, 300)
            )));
        }
        parse_reply(&body)
    }
}
