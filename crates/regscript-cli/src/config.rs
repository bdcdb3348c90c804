// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `--config` file and store location.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regscript_core::{ExportOptions, ImportOptions};
use regscript_store_fs::FsStore;
use serde::{Deserialize, Serialize};

/// Settings read from a JSON file; command-line flags override them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `import` and `conflicts` settings.
    pub import: ImportOptions,
    /// `export`, `show` and `load` settings.
    pub export: ExportOptions,
}

impl Config {
    /// Load `path`, or defaults when no file was given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let bytes = fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Snapshot file from `--store` / `REGSCRIPT_STORE`, else the platform data dir.
pub fn store_location(explicit: Option<PathBuf>) -> Result<FsStore> {
    match explicit {
        Some(path) => Ok(FsStore::at(path)),
        None => FsStore::in_data_dir().context("resolving the default store location"),
    }
}
