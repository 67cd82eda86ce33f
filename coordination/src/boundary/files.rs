//! File boundary: the single point through which the core reads and
//! mutates the project.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

/// Suffix of the backup kept beside each file on its first write.
pub const BACKUP_SUFFIX: &str = ".remedy.bak";

/// Outcome of a write the boundary was able to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The boundary refused the write. The attempt fails; the run continues.
    Rejected { reason: String },
}

/// Boundary failures. Always fatal to the loop.
#[derive(Debug, thiserror::Error)]
pub enum FileBoundaryError {
    #[error("path escapes project root: {}", .0.display())]
    OutsideRoot(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileBoundary: Send + Sync {
    async fn read(&self, path: &Path) -> Result<String, FileBoundaryError>;

    async fn write(&self, path: &Path, content: &str) -> Result<WriteOutcome, FileBoundaryError>;
}

/// Filesystem boundary rooted at a project directory.
///
/// Relative paths resolve against the root; paths that climb out of it are
/// refused. The first write to a file keeps a `<name>.remedy.bak` copy of
/// the original, and every write lands via a sibling temp file + rename.
#[derive(Debug, Clone)]
pub struct FsFileBoundary {
    root: PathBuf,
    backup: bool,
}

impl FsFileBoundary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            backup: true,
        }
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf, FileBoundaryError> {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(FileBoundaryError::OutsideRoot(path.to_path_buf()));
        }
        Ok(self.root.join(relative))
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

#[async_trait]
impl FileBoundary for FsFileBoundary {
    async fn read(&self, path: &Path) -> Result<String, FileBoundaryError> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|source| FileBoundaryError::Read { path: full, source })
    }

    async fn write(&self, path: &Path, content: &str) -> Result<WriteOutcome, FileBoundaryError> {
        let full = self.resolve(path)?;

        let metadata = match tokio::fs::metadata(&full).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(WriteOutcome::Rejected {
                    reason: format!("{} does not exist", path.display()),
                });
            }
            Err(source) => return Err(FileBoundaryError::Write { path: full, source }),
        };
        if metadata.permissions().readonly() {
            warn!(path = %full.display(), "Refusing write to read-only file");
            return Ok(WriteOutcome::Rejected {
                reason: format!("{} is read-only", path.display()),
            });
        }

        if self.backup {
            let backup = sibling(&full, BACKUP_SUFFIX);
            if !tokio::fs::try_exists(&backup).await.unwrap_or(false) {
                tokio::fs::copy(&full, &backup)
                    .await
                    .map_err(|source| FileBoundaryError::Write {
                        path: backup.clone(),
                        source,
                    })?;
                debug!(backup = %backup.display(), "Saved original");
            }
        }

        let tmp = sibling(&full, ".remedy.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|source| FileBoundaryError::Write {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &full)
            .await
            .map_err(|source| FileBoundaryError::Write {
                path: full.clone(),
                source,
            })?;

        debug!(path = %full.display(), bytes = content.len(), "Wrote file");
        Ok(WriteOutcome::Written)
    }
}
