// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Settings for one mounted filesystem instance.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Container;
use crate::error::{FsError, Result};

fn default_lock_timeout_ms() -> u64 {
    30_000
}

fn default_scratch_ttl_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_scratch_clean_interval_ms() -> u64 {
    60 * 60 * 1000
}

fn default_sync_interval_ms() -> u64 {
    5 * 60 * 1000
}

/// Which bundled storage backend to construct for an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendSettings {
    /// Local disk.
    #[default]
    Local,
    /// In-process object store; bytes live only as long as the process.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSystemSettings {
    pub name: String,
    /// Base path inside the coordination namespace.
    pub base_path: String,
    pub containers: Vec<Container>,
    /// Local staging directory for lock-scratch files.
    pub scratch_dir: PathBuf,
    #[serde(default = "default_scratch_ttl_ms")]
    pub scratch_ttl_ms: u64,
    #[serde(default = "default_scratch_clean_interval_ms")]
    pub scratch_clean_interval_ms: u64,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub encryption_key_ref: Option<String>,
    #[serde(default)]
    pub backend: BackendSettings,
}

impl FileSystemSettings {
    /// Settings with every tunable at its default.
    pub fn new(
        name: impl Into<String>,
        base_path: impl Into<String>,
        containers: Vec<Container>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            base_path: base_path.into(),
            containers,
            scratch_dir: scratch_dir.into(),
            scratch_ttl_ms: default_scratch_ttl_ms(),
            scratch_clean_interval_ms: default_scratch_clean_interval_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            sync_interval_ms: default_sync_interval_ms(),
            compressed: false,
            encryption_key_ref: None,
            backend: BackendSettings::default(),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn scratch_ttl(&self) -> Duration {
        Duration::from_millis(self.scratch_ttl_ms)
    }

    pub fn scratch_clean_interval(&self) -> Duration {
        Duration::from_millis(self.scratch_clean_interval_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(FsError::config("filesystem name must not be empty"));
        }
        if self.name.contains('/') {
            return Err(FsError::config(format!(
                "filesystem name must not contain '/': {}",
                self.name
            )));
        }
        if self.containers.is_empty() {
            return Err(FsError::config(format!(
                "filesystem {} has no containers",
                self.name
            )));
        }
        if self.scratch_dir.as_os_str().is_empty() {
            return Err(FsError::config(format!(
                "filesystem {} has no scratch directory",
                self.name
            )));
        }
        if self.lock_timeout_ms == 0 {
            return Err(FsError::config(format!(
                "filesystem {} has a zero lock timeout",
                self.name
            )));
        }
        Ok(())
    }
}
