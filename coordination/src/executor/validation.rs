//! Validation gate — every patch passes here before it may be applied.
//!
//! ```text
//! apply hunks (well-formed?) ─► diff-size guard ─► syntax check ─► signature check
//! ```
//!
//! A malformed patch stops the gate immediately; the remaining checks all
//! run so the attempt records every reason it failed.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;

use crate::issue::Issue;
use crate::patch::{Patch, PatchConfig, PatchEngine};

/// Why an attempt was not applied. Rendered into `FixAttempt` reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Timeout,
    GenerationError(String),
    MalformedPatch(String),
    DiffTooLarge { changed: usize, limit: usize },
    SyntaxError(String),
    ReintroducesSignature(String),
    Stale,
    WriteRejected(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::GenerationError(e) => write!(f, "generation_error: {e}"),
            Self::MalformedPatch(e) => write!(f, "malformed_patch: {e}"),
            Self::DiffTooLarge { changed, limit } => {
                write!(f, "diff_too_large: {changed} > {limit}")
            }
            Self::SyntaxError(e) => write!(f, "syntax_error: {e}"),
            Self::ReintroducesSignature(sig) => write!(f, "reintroduces_signature: {sig}"),
            Self::Stale => write!(f, "stale"),
            Self::WriteRejected(e) => write!(f, "write_rejected: {e}"),
        }
    }
}

/// Pluggable syntax check over whole-file content.
pub trait SyntaxCheck: Send + Sync {
    fn check(&self, path: &Path, content: &str) -> Result<(), String>;
}

/// Checks `()`, `[]` and `{}` balance outside string literals and comments.
///
/// Recognises `"…"` and single-line `'…'` literals, Rust lifetimes, `//`
/// and `#` line comments, and `/* … */` block comments.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimiterBalance;

impl SyntaxCheck for DelimiterBalance {
    fn check(&self, _path: &Path, content: &str) -> Result<(), String> {
        let mut stack: Vec<(char, usize)> = Vec::new();
        let mut in_block_comment = false;

        for (lineno, line) in content.lines().enumerate() {
            let lineno = lineno + 1;
            let chars: Vec<char> = line.chars().collect();
            let mut i = 0;
            while i < chars.len() {
                let c = chars[i];
                let next = chars.get(i + 1).copied();

                if in_block_comment {
                    if c == '*' && next == Some('/') {
                        in_block_comment = false;
                        i += 1;
                    }
                    i += 1;
                    continue;
                }

                match c {
                    '/' if next == Some('/') => break,
                    '#' => break,
                    '/' if next == Some('*') => {
                        in_block_comment = true;
                        i += 1;
                    }
                    '"' => i = skip_literal(&chars, i, '"').unwrap_or(chars.len()),
                    '\'' if !is_lifetime(&chars, i) => {
                        if let Some(end) = skip_literal(&chars, i, '\'') {
                            i = end;
                        }
                    }
                    '(' | '[' | '{' => stack.push((c, lineno)),
                    ')' | ']' | '}' => {
                        let want = match c {
                            ')' => '(',
                            ']' => '[',
                            _ => '{',
                        };
                        match stack.pop() {
                            Some((open, _)) if open == want => {}
                            Some((open, at)) => {
                                return Err(format!(
                                    "line {lineno}: '{c}' closes '{open}' opened on line {at}"
                                ));
                            }
                            None => return Err(format!("line {lineno}: unmatched '{c}'")),
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
        }

        match stack.pop() {
            Some((open, at)) => Err(format!("line {at}: '{open}' is never closed")),
            None => Ok(()),
        }
    }
}

/// Whether the `'` at `i` opens a lifetime or loop label rather than a
/// quoted literal.
///
/// `'ident` with no closing quote later on the line is a lifetime. With one,
/// it is a literal unless it directly follows `&`, `<`, `+`, `break` or
/// `continue`.
fn is_lifetime(chars: &[char], i: usize) -> bool {
    let ident = chars[i + 1..]
        .iter()
        .take_while(|c| c.is_alphanumeric() || **c == '_')
        .count();
    if ident == 0 || chars.get(i + 1 + ident) == Some(&'\'') {
        return false;
    }
    if skip_literal(chars, i, '\'').is_none() {
        return true;
    }
    let before: String = chars[..i].iter().collect();
    let before = before.trim_end();
    before.ends_with(|c| matches!(c, '&' | '<' | '+'))
        || before.ends_with("break")
        || before.ends_with("continue")
}

/// Index of the closing `quote` for the literal opening at `start`, honouring
/// backslash escapes. `None` if the line ends first.
fn skip_literal(chars: &[char], start: usize, quote: char) -> Option<usize> {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Result of running a patch through the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GateVerdict {
    pub rejections: Vec<Rejection>,
    /// Patched content, present whenever the patch applied.
    pub patched: Option<String>,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.rejections.is_empty() && self.patched.is_some()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.rejections.iter().map(ToString::to_string).collect()
    }
}

/// The mandatory pre-apply gate.
#[derive(Clone)]
pub struct ValidationGate {
    engine: PatchEngine,
    max_diff_lines: usize,
    approved_high_risk: BTreeSet<String>,
    syntax: Arc<dyn SyntaxCheck>,
}

impl ValidationGate {
    pub fn new(max_diff_lines: usize, patch: PatchConfig) -> Self {
        Self {
            engine: PatchEngine::new(patch),
            max_diff_lines,
            approved_high_risk: BTreeSet::new(),
            syntax: Arc::new(DelimiterBalance),
        }
    }

    /// Issues whose patches may exceed the diff-size guard.
    pub fn with_approved_high_risk(mut self, issue_ids: impl IntoIterator<Item = String>) -> Self {
        self.approved_high_risk = issue_ids.into_iter().collect();
        self
    }

    pub fn with_syntax_check(mut self, syntax: Arc<dyn SyntaxCheck>) -> Self {
        self.syntax = syntax;
        self
    }

    /// Validate `patch` for `issue` against `content`.
    ///
    /// The syntax check only fails a patch that breaks content which passed
    /// the check before, so files the heuristic misreads are not blocked.
    pub fn check(&self, issue: &Issue, content: &str, patch: &Patch) -> GateVerdict {
        let patched = match self.engine.apply(content, patch) {
            Ok(applied) => applied.content,
            Err(e) => {
                return GateVerdict {
                    rejections: vec![Rejection::MalformedPatch(e.to_string())],
                    patched: None,
                };
            }
        };

        let mut rejections = Vec::new();

        let changed = patch.changed_lines();
        if changed > self.max_diff_lines && !self.approved_high_risk.contains(&issue.id) {
            rejections.push(Rejection::DiffTooLarge {
                changed,
                limit: self.max_diff_lines,
            });
        }

        if self.syntax.check(&issue.file, content).is_ok() {
            if let Err(e) = self.syntax.check(&issue.file, &patched) {
                rejections.push(Rejection::SyntaxError(e));
            }
        }

        if let Some(signature) = issue.signature.as_deref() {
            if reintroduces(signature, patch) {
                rejections.push(Rejection::ReintroducesSignature(signature.to_string()));
            }
        }

        GateVerdict {
            rejections,
            patched: Some(patched),
        }
    }
}

/// Whether any added line matches the issue signature. The signature is
/// tried as a regex first and as a literal if it doesn't compile.
fn reintroduces(signature: &str, patch: &Patch) -> bool {
    match Regex::new(signature) {
        Ok(re) => patch.added_lines().any(|l| re.is_match(l)),
        Err(_) => patch.added_lines().any(|l| l.contains(signature)),
    }
}
