//! Errors from loading or persisting skill effectiveness.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LearningError {
    #[error("cannot read learning state {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write learning state {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Target left untouched; the temp file may remain beside it.
    #[error("cannot replace {path} with {tmp}: {source}")]
    Replace {
        path: PathBuf,
        tmp: PathBuf,
        source: std::io::Error,
    },

    /// A stored entry claims more successes than attempts.
    #[error("corrupt entry for skill '{skill_id}': {successes} successes > {attempts} attempts")]
    CorruptEntry {
        skill_id: String,
        attempts: u32,
        successes: u32,
    },

    #[error("learning state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type LearningResult<T> = Result<T, LearningError>;
