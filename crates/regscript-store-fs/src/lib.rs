// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Filesystem-backed persistence for [`MemoryStore`] (JSON snapshot file).

use directories::ProjectDirs;
use regscript_store::{MemoryStore, Snapshot, StoreError};
use std::fs;
use std::path::{Path, PathBuf};

/// File name used inside the platform data directory.
pub const DEFAULT_FILE_NAME: &str = "store.json";

/// Loads and saves a whole key tree as one JSON document.
#[derive(Debug, Clone)]
pub struct FsStore {
    path: PathBuf,
}

impl FsStore {
    /// Use an explicit snapshot file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Use `store.json` under the platform data directory
    /// (e.g. `~/.local/share/regscript`).
    pub fn in_data_dir() -> Result<Self, StoreError> {
        let proj = ProjectDirs::from("dev", "regscript", "regscript")
            .ok_or_else(|| StoreError::Snapshot("could not resolve data dir".into()))?;
        Ok(Self::at(proj.data_dir().join(DEFAULT_FILE_NAME)))
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the tree. A missing or empty file yields an empty store.
    pub fn load(&self) -> Result<MemoryStore, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MemoryStore::new());
            }
            Err(err) => return Err(StoreError::Io(err)),
        };
        if bytes.is_empty() {
            return Ok(MemoryStore::new());
        }
        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|err| StoreError::Snapshot(err.to_string()))?;
        MemoryStore::from_snapshot(&snapshot)
    }

    /// Persist the tree, creating parent directories as needed.
    pub fn save(&self, store: &MemoryStore) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(&store.snapshot())
            .map_err(|err| StoreError::Snapshot(err.to_string()))?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
