//! Checker backed by an external analysis command.
//!
//! The command runs in the project root with `REMEDY_ITERATION` set and any
//! scoped paths appended to its arguments. It must print a JSON array of
//! issues on stdout. Linters commonly exit non-zero when they find issues,
//! so the exit status only matters when stdout is not valid JSON.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use remedy_coordination::{CheckScope, Checker, CheckerError, Issue};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{split_command, tail};

const DEFAULT_TIMEOUT_SECS: u64 = 600;

pub struct CommandChecker {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandChecker {
    pub fn new(command: &str) -> Result<Self, CheckerError> {
        let argv = split_command(command).ok_or_else(|| {
            CheckerError::Execution(format!("unusable checker command: {command:?}"))
        })?;
        Ok(Self {
            argv,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }
}

#[async_trait]
impl Checker for CommandChecker {
    async fn run_checks(&self, scope: &CheckScope) -> Result<Vec<Issue>, CheckerError> {
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..])
            .args(&scope.paths)
            .env("REMEDY_ITERATION", scope.iteration.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if !scope.root.as_os_str().is_empty() {
            cmd.current_dir(&scope.root);
        }

        debug!(program = %self.program(), iteration = scope.iteration, "Running checker");
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                CheckerError::Execution(format!(
                    "{} timed out after {}s",
                    self.program(),
                    self.timeout.as_secs()
                ))
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let trimmed = stdout.trim();
        if trimmed.is_empty() && output.status.success() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Vec<Issue>>(trimmed) {
            Ok(issues) => {
                if !output.status.success() {
                    debug!(
                        status = %output.status,
                        issues = issues.len(),
                        "Checker exited non-zero with valid output"
                    );
                }
                Ok(issues)
            }
            Err(e) if output.status.success() => Err(CheckerError::Parse(e.to_string())),
            Err(_) => {
                let stderr = tail(&output.stderr, 2000);
                warn!(status = %output.status, "Checker failed");
                Err(CheckerError::Execution(format!(
                    "{} exited with {}: {stderr}",
                    self.program(),
                    output.status
                )))
            }
        }
    }
}
