//! Durable scheduler state
//!
//! The state file is a single pretty-printed JSON document. Saves go through
//! a sibling temp file that is synced and renamed over the target, so a crash
//! mid-write leaves the previous good state in place.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::SchedulerState;

/// Errors reading or writing the state file
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Owns the on-disk representation of [`SchedulerState`]
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state; a missing file yields an empty state
    pub fn load(&self) -> Result<SchedulerState, StoreError> {
        debug!(path = %self.path.display(), "StateStore::load: called");
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("StateStore::load: no state file, starting empty");
                return Ok(SchedulerState::default());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let mut state: SchedulerState = serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        // The map key is authoritative over a hand-edited modelId
        for (key, record) in state.targets.iter_mut() {
            if record.id != *key {
                warn!(key = %key, model_id = %record.id, "StateStore::load: modelId differs from key, using key");
                record.id = key.clone();
            }
        }
        debug!(targets = state.len(), "StateStore::load: loaded");
        Ok(state)
    }

    /// Atomically replace the state file
    pub fn save(&self, state: &SchedulerState) -> Result<(), StoreError> {
        debug!(path = %self.path.display(), targets = state.len(), "StateStore::save: called");
        let content = serde_json::to_string_pretty(state)?;
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let tmp_path = self.tmp_path();
        if let Err(source) = write_synced(&tmp_path, content.as_bytes()).and_then(|()| fs::rename(&tmp_path, &self.path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(write_err(source));
        }
        sync_parent(&self.path).map_err(write_err)?;
        Ok(())
    }

    /// Discard all persisted state
    ///
    /// Returns whether a state file existed.
    pub fn reset(&self) -> Result<bool, StoreError> {
        debug!(path = %self.path.display(), "StateStore::reset: called");
        // A leftover temp file from a crashed save is discarded too
        let _ = fs::remove_file(self.tmp_path());
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "State reset");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn write_synced(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content)?;
    file.write_all(b"\n")?;
    file.sync_all()
}

/// Flush the directory entry so the rename itself survives a crash
#[cfg(unix)]
fn sync_parent(path: &Path) -> std::io::Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => File::open(parent)?.sync_all(),
        None => File::open(".")?.sync_all(),
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
