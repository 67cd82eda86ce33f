//! Effectiveness store implementations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{LearningError, LearningResult};
use super::{EffectivenessStore, SkillEffectiveness};

/// In-process store. Counters live for the lifetime of the run.
#[derive(Debug, Default)]
pub struct InMemoryEffectivenessStore {
    entries: RwLock<BTreeMap<String, SkillEffectiveness>>,
}

impl InMemoryEffectivenessStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. from a previous run or a test fixture.
    pub fn with_entries(entries: impl IntoIterator<Item = SkillEffectiveness>) -> Self {
        let map = entries
            .into_iter()
            .map(|e| (e.skill_id.clone(), e))
            .collect();
        Self {
            entries: RwLock::new(map),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, SkillEffectiveness>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, SkillEffectiveness>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl EffectivenessStore for InMemoryEffectivenessStore {
    fn get(&self, skill_id: &str) -> Option<SkillEffectiveness> {
        self.read().get(skill_id).cloned()
    }

    fn record(&self, skill_id: &str, success: bool) -> SkillEffectiveness {
        let mut entries = self.write();
        let entry = entries
            .entry(skill_id.to_string())
            .or_insert_with(|| SkillEffectiveness::new(skill_id));
        entry.record(success);
        entry.clone()
    }

    fn snapshot(&self) -> Vec<SkillEffectiveness> {
        self.read().values().cloned().collect()
    }
}

/// On-disk shape: `{ "<skill id>": { "attempts": n, "successes": m } }`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct Counts {
    attempts: u32,
    successes: u32,
}

/// Store persisted as a JSON map keyed by skill id.
///
/// Loading a missing file yields an empty store. [`persist`] writes to a
/// sibling temp file and renames it over the target.
///
/// [`persist`]: EffectivenessStore::persist
#[derive(Debug)]
pub struct JsonFileEffectivenessStore {
    path: PathBuf,
    inner: InMemoryEffectivenessStore,
}

impl JsonFileEffectivenessStore {
    /// Load from `path`. Returns an empty store if the file doesn't exist.
    pub fn load(path: impl Into<PathBuf>) -> LearningResult<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                inner: InMemoryEffectivenessStore::new(),
            });
        }
        let data = std::fs::read_to_string(&path).map_err(|e| LearningError::FileRead {
            path: path.clone(),
            source: e,
        })?;
        let raw: BTreeMap<String, Counts> = serde_json::from_str(&data)?;
        let mut entries = Vec::with_capacity(raw.len());
        for (skill_id, c) in raw {
            if c.successes > c.attempts {
                return Err(LearningError::CorruptEntry {
                    skill_id,
                    attempts: c.attempts,
                    successes: c.successes,
                });
            }
            entries.push(SkillEffectiveness {
                skill_id,
                attempts: c.attempts,
                successes: c.successes,
            });
        }
        debug!(path = %path.display(), "Loaded skill effectiveness");
        Ok(Self {
            path,
            inner: InMemoryEffectivenessStore::with_entries(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EffectivenessStore for JsonFileEffectivenessStore {
    fn get(&self, skill_id: &str) -> Option<SkillEffectiveness> {
        self.inner.get(skill_id)
    }

    fn record(&self, skill_id: &str, success: bool) -> SkillEffectiveness {
        self.inner.record(skill_id, success)
    }

    fn snapshot(&self) -> Vec<SkillEffectiveness> {
        self.inner.snapshot()
    }

    fn persist(&self) -> LearningResult<()> {
        let raw: BTreeMap<String, Counts> = self
            .inner
            .snapshot()
            .into_iter()
            .map(|e| {
                (
                    e.skill_id,
                    Counts {
                        attempts: e.attempts,
                        successes: e.successes,
                    },
                )
            })
            .collect();
        let data = serde_json::to_string_pretty(&raw)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LearningError::FileWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data).map_err(|e| LearningError::FileWrite {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| LearningError::Replace {
            path: self.path.clone(),
            tmp: tmp.clone(),
            source: e,
        })?;
        debug!(path = %self.path.display(), skills = raw.len(), "Persisted skill effectiveness");
        Ok(())
    }
}
