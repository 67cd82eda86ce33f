//! Patches and the tolerant hunk matcher.
//!
//! Agents return patches as ordered hunks of `old_lines → new_lines`. Agents
//! often get whitespace slightly wrong, so each hunk is located with a
//! cascade of progressively looser matchers:
//!
//! ```text
//! exact → trimmed trailing → whitespace-normalized → fuzzy (≥ min_similarity)
//! ```
//!
//! A patch is well-formed when it has at least one hunk, every hunk has a
//! non-empty `old_lines`, and every hunk locates in the target content.

use serde::{Deserialize, Serialize};

/// Matcher tolerances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// Accept matches that differ only in trailing whitespace.
    pub trim_trailing: bool,
    /// Accept matches that differ only in whitespace runs.
    pub normalize_whitespace: bool,
    /// Minimum average line similarity (0.0–1.0) for a fuzzy match.
    /// Values above 1.0 disable fuzzy matching.
    pub min_similarity: f64,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            trim_trailing: true,
            normalize_whitespace: true,
            min_similarity: 0.85,
        }
    }
}

/// One replacement: find `old_lines`, substitute `new_lines`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub old_lines: Vec<String>,
    pub new_lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Hunk {
    pub fn new<O, N, S>(old_lines: O, new_lines: N) -> Self
    where
        O: IntoIterator<Item = S>,
        N: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            old_lines: old_lines.into_iter().map(Into::into).collect(),
            new_lines: new_lines.into_iter().map(Into::into).collect(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Removed and added lines once unchanged leading/trailing lines are
    /// stripped.
    pub fn changed_lines(&self) -> (usize, usize) {
        let old = &self.old_lines;
        let new = &self.new_lines;
        let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
        let max_suffix = old.len().min(new.len()) - prefix;
        let suffix = old
            .iter()
            .rev()
            .zip(new.iter().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();
        (
            old.len() - prefix - suffix,
            new.len() - prefix - suffix,
        )
    }

    /// Lines this hunk introduces, excluding unchanged context.
    pub fn added_lines(&self) -> &[String] {
        let (_, added) = self.changed_lines();
        let prefix = self
            .old_lines
            .iter()
            .zip(&self.new_lines)
            .take_while(|(a, b)| a == b)
            .count();
        &self.new_lines[prefix..prefix + added]
    }
}

/// An agent-proposed change to a single file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub hunks: Vec<Hunk>,
}

impl Patch {
    pub fn new(hunks: Vec<Hunk>) -> Self {
        Self { hunks }
    }

    /// Convenience for the common single-hunk patch.
    pub fn single(hunk: Hunk) -> Self {
        Self { hunks: vec![hunk] }
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Total removed + added lines across hunks.
    pub fn changed_lines(&self) -> usize {
        self.hunks
            .iter()
            .map(|h| {
                let (removed, added) = h.changed_lines();
                removed + added
            })
            .sum()
    }

    /// Every line the patch introduces.
    pub fn added_lines(&self) -> impl Iterator<Item = &str> {
        self.hunks
            .iter()
            .flat_map(|h| h.added_lines().iter().map(String::as_str))
    }
}

/// How a hunk was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    TrimmedTrailing,
    WhitespaceNormalized,
    Fuzzy,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::TrimmedTrailing => write!(f, "trimmed_trailing"),
            Self::WhitespaceNormalized => write!(f, "whitespace_normalized"),
            Self::Fuzzy => write!(f, "fuzzy"),
        }
    }
}

/// Where and how one hunk matched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HunkMatch {
    pub kind: MatchKind,
    /// 1-based line where the hunk matched.
    pub line: usize,
    pub similarity: f64,
}

/// Content after all hunks applied.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedPatch {
    pub content: String,
    pub matches: Vec<HunkMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("patch has no hunks")]
    Empty,

    #[error("hunk {index} has no old lines")]
    EmptyHunk { index: usize },

    #[error("hunk {index} does not match the target content")]
    NoMatch { index: usize },
}

/// Applies patches with the configured matching cascade.
#[derive(Debug, Clone, Default)]
pub struct PatchEngine {
    config: PatchConfig,
}

impl PatchEngine {
    pub fn new(config: PatchConfig) -> Self {
        Self { config }
    }

    /// Apply every hunk in order; hunk `n` sees the output of hunk `n - 1`.
    ///
    /// All-or-nothing: any hunk failing to locate fails the whole patch.
    /// A trailing newline on the input is preserved.
    pub fn apply(&self, content: &str, patch: &Patch) -> Result<AppliedPatch, PatchError> {
        if patch.is_empty() {
            return Err(PatchError::Empty);
        }

        let trailing_newline = content.ends_with('\n');
        let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
        let mut matches = Vec::with_capacity(patch.hunks.len());

        for (index, hunk) in patch.hunks.iter().enumerate() {
            if hunk.old_lines.is_empty() {
                return Err(PatchError::EmptyHunk { index });
            }
            let found = self
                .locate(&lines, &hunk.old_lines)
                .ok_or(PatchError::NoMatch { index })?;
            let at = found.line - 1;
            lines.splice(at..at + hunk.old_lines.len(), hunk.new_lines.iter().cloned());
            matches.push(found);
        }

        let mut patched = lines.join("\n");
        if trailing_newline && !patched.is_empty() {
            patched.push('\n');
        }
        Ok(AppliedPatch {
            content: patched,
            matches,
        })
    }

    /// Whether every hunk locates in `content`.
    pub fn is_well_formed(&self, content: &str, patch: &Patch) -> bool {
        self.apply(content, patch).is_ok()
    }

    fn locate(&self, lines: &[String], pattern: &[String]) -> Option<HunkMatch> {
        if pattern.len() > lines.len() {
            return None;
        }

        let exact = |a: &str, b: &str| a == b;
        if let Some(at) = find_window(lines, pattern, exact) {
            return Some(hit(MatchKind::Exact, at, 1.0));
        }

        if self.config.trim_trailing {
            let trimmed = |a: &str, b: &str| a.trim_end() == b.trim_end();
            if let Some(at) = find_window(lines, pattern, trimmed) {
                return Some(hit(MatchKind::TrimmedTrailing, at, 0.98));
            }
        }

        if self.config.normalize_whitespace {
            let normalized = |a: &str, b: &str| normalize_ws(a) == normalize_ws(b);
            if let Some(at) = find_window(lines, pattern, normalized) {
                return Some(hit(MatchKind::WhitespaceNormalized, at, 0.95));
            }
        }

        let (at, similarity) = (0..=lines.len() - pattern.len())
            .map(|i| (i, window_similarity(&lines[i..i + pattern.len()], pattern)))
            .fold(None, |best: Option<(usize, f64)>, (i, s)| match best {
                Some((_, b)) if b >= s => best,
                _ => Some((i, s)),
            })?;
        (similarity >= self.config.min_similarity).then(|| hit(MatchKind::Fuzzy, at, similarity))
    }
}

fn hit(kind: MatchKind, at: usize, similarity: f64) -> HunkMatch {
    HunkMatch {
        kind,
        line: at + 1,
        similarity,
    }
}

/// First window of `lines` where every line pairs with `pattern` under `eq`.
fn find_window(
    lines: &[String],
    pattern: &[String],
    eq: impl Fn(&str, &str) -> bool,
) -> Option<usize> {
    lines
        .windows(pattern.len())
        .position(|w| w.iter().zip(pattern).all(|(a, b)| eq(a, b)))
}

fn window_similarity(window: &[String], pattern: &[String]) -> f64 {
    if pattern.is_empty() {
        return 0.0;
    }
    let total: f64 = window
        .iter()
        .zip(pattern)
        .map(|(a, b)| line_similarity(a, b))
        .sum();
    total / pattern.len() as f64
}

/// Collapse whitespace runs to one space and trim.
fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sørensen–Dice similarity over character bigrams of the normalized lines.
fn line_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_ws(a);
    let b = normalize_ws(b);
    if a == b {
        return 1.0;
    }
    let grams = |s: &str| -> Vec<(char, char)> {
        let chars: Vec<char> = s.chars().collect();
        chars.windows(2).map(|w| (w[0], w[1])).collect()
    };
    let ga = grams(&a);
    let mut gb = grams(&b);
    if ga.is_empty() || gb.is_empty() {
        return 0.0;
    }
    let total = ga.len() + gb.len();
    let mut shared = 0usize;
    for g in &ga {
        if let Some(pos) = gb.iter().position(|x| x == g) {
            gb.swap_remove(pos);
            shared += 1;
        }
    }
    (2 * shared) as f64 / total as f64
}
