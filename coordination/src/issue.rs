//! Issues reported by analysis tools.
//!
//! Issues are produced by a [`Checker`](crate::boundary::Checker) and are
//! read-only to the rest of the engine.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a detected issue, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A detected defect with location, severity and category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Identifier assigned by the checker (stable across re-checks when possible).
    pub id: String,
    /// Human-readable description, tokenized for skill matching.
    pub description: String,
    /// File the issue was reported in, relative to the project root.
    pub file: PathBuf,
    /// Line number (1-based), if the tool reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub severity: Severity,
    /// Category tag from the tool (e.g. `"security"`, `"style"`).
    pub category: String,
    /// When the checker detected the issue.
    #[serde(default = "Utc::now")]
    pub detected_at: DateTime<Utc>,
    /// Pattern identifying the offending code (regex, or literal text if the
    /// pattern does not compile). A patch whose added lines match it
    /// reintroduces the issue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Issue {
    /// Create an issue detected now, with no line or signature.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        file: impl Into<PathBuf>,
        severity: Severity,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            file: file.into(),
            line: None,
            severity,
            category: category.into(),
            detected_at: Utc::now(),
            signature: None,
        }
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_detected_at(mut self, at: DateTime<Utc>) -> Self {
        self.detected_at = at;
        self
    }

    /// Whether the issue lives in test code rather than production code.
    pub fn is_test_file(&self) -> bool {
        is_test_path(&self.file)
    }

    /// Short location string for logs (`path:line`).
    pub fn location(&self) -> String {
        match self.line {
            Some(line) => format!("{}:{}", self.file.display(), line),
            None => self.file.display().to_string(),
        }
    }
}

/// Heuristic test-file detection shared by scoring and reporting.
///
/// Matches `tests/` or `test/` directories and `test_*` / `*_test.*` /
/// `*_tests.*` / `*.test.*` / `*.spec.*` file names.
pub fn is_test_path(path: &Path) -> bool {
    let in_test_dir = path.components().any(|c| {
        let part = c.as_os_str().to_string_lossy().to_ascii_lowercase();
        part == "tests" || part == "test" || part == "__tests__"
    });
    if in_test_dir {
        return true;
    }

    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_ascii_lowercase()) else {
        return false;
    };
    let stem = name.split('.').next().unwrap_or_default();
    name.starts_with("test_")
        || stem.ends_with("_test")
        || stem.ends_with("_tests")
        || name.contains(".test.")
        || name.contains(".spec.")
}

/// Order issues for processing: severity descending, then detection order.
///
/// The sort is stable, so issues with equal severity and timestamp keep the
/// order the checker reported them in.
pub fn processing_order(issues: &mut [Issue]) {
    issues.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.detected_at.cmp(&b.detected_at))
    });
}
