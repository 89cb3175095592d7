// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Registry of named filesystem instances.
//!
//! An explicit object owned by the application context, constructed once
//! at startup; nothing here is process-global. The registry persists each
//! instance's settings into the coordination namespace, so a later
//! process (or another host) can bootstrap the same filesystem with
//! [`FileSystemRegistry::open`] and no local configuration.

use std::collections::HashMap;
use std::sync::Arc;

use coordns::{CoordClient, CreateMode};
use object_store::memory::InMemory;
use tokio::sync::Mutex;

use crate::backend::StorageBackend;
use crate::backend::local::LocalBackend;
use crate::backend::object::ObjectBackend;
use crate::config::{BackendSettings, FileSystemSettings};
use crate::error::{FsError, Result};
use crate::filesystem::FileSystem;
use crate::path_builder;
use crate::reaper::TempDirectoryReaper;
use crate::sync::SyncTask;

struct RegistryEntry {
    fs: Arc<FileSystem>,
    reaper: TempDirectoryReaper,
    sync: SyncTask,
}

pub struct FileSystemRegistry {
    coord: Arc<dyn CoordClient>,
    base_path: String,
    entries: Mutex<HashMap<String, RegistryEntry>>,
}

impl FileSystemRegistry {
    pub fn new(coord: Arc<dyn CoordClient>, base_path: &str) -> Self {
        let base = path_builder::normalize(base_path);
        Self {
            coord,
            base_path: format!("/{base}"),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn settings_node(&self, name: &str) -> String {
        format!("{}/settings/{}", self.base_path, name)
    }

    /// Register and mount a filesystem from explicit settings, persisting
    /// them for later [`FileSystemRegistry::open`] calls.
    pub async fn register(&self, settings: FileSystemSettings) -> Result<Arc<FileSystem>> {
        let backend = build_backend(&settings);
        self.register_with_backend(settings, backend).await
    }

    /// Same as [`FileSystemRegistry::register`] with a caller-supplied
    /// backend (custom media, fakes in tests).
    pub async fn register_with_backend(
        &self,
        settings: FileSystemSettings,
        backend: Arc<dyn StorageBackend>,
    ) -> Result<Arc<FileSystem>> {
        settings.validate()?;
        let node = self.settings_node(&settings.name);
        let payload = serde_json::to_vec(&settings)?;
        self.coord
            .ensure_path(&format!("{}/settings", self.base_path))
            .await?;
        if !self
            .coord
            .create(&node, &payload, CreateMode::Persistent)
            .await?
        {
            self.coord.write(&node, &payload).await?;
        }
        self.mount_entry(settings, backend).await
    }

    /// Bootstrap a filesystem from settings persisted by an earlier
    /// [`FileSystemRegistry::register`], possibly in another process.
    pub async fn open(&self, name: &str) -> Result<Arc<FileSystem>> {
        let node = self.settings_node(name);
        let payload = self.coord.read(&node).await?.ok_or_else(|| {
            FsError::config(format!("no persisted settings for filesystem {name}"))
        })?;
        let settings: FileSystemSettings = serde_json::from_slice(&payload)?;
        let backend = build_backend(&settings);
        self.mount_entry(settings, backend).await
    }

    async fn mount_entry(
        &self,
        settings: FileSystemSettings,
        backend: Arc<dyn StorageBackend>,
    ) -> Result<Arc<FileSystem>> {
        let name = settings.name.clone();
        {
            let entries = self.entries.lock().await;
            if entries.contains_key(&name) {
                return Err(FsError::config(format!(
                    "filesystem {name} is already registered"
                )));
            }
        }

        let reaper = TempDirectoryReaper::start(
            settings.scratch_dir.clone(),
            settings.scratch_ttl(),
            settings.scratch_clean_interval(),
        );
        let sync_interval = settings.sync_interval();
        let fs = match FileSystem::mount(settings, self.coord.clone(), backend).await {
            Ok(fs) => fs,
            Err(e) => {
                reaper.stop().await;
                return Err(e);
            }
        };
        let sync = SyncTask::start(format!("{name}-sync"), Arc::clone(&fs), sync_interval);

        let mut entries = self.entries.lock().await;
        entries.insert(
            name,
            RegistryEntry {
                fs: Arc::clone(&fs),
                reaper,
                sync,
            },
        );
        Ok(fs)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<FileSystem>> {
        self.entries.lock().await.get(name).map(|e| Arc::clone(&e.fs))
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop and join every instance's background tasks. Uploads already
    /// in flight are waited out by their own pool permits, not here.
    pub async fn shutdown(&self) {
        let drained: Vec<RegistryEntry> = {
            let mut entries = self.entries.lock().await;
            entries.drain().map(|(_, entry)| entry).collect()
        };
        for entry in drained {
            let name = entry.fs.name().to_string();
            entry.sync.stop().await;
            entry.reaper.stop().await;
            diagnostics::log_info!("filesystem {name} shut down", name: name.as_str());
        }
    }
}

fn build_backend(settings: &FileSystemSettings) -> Arc<dyn StorageBackend> {
    match settings.backend {
        BackendSettings::Local => Arc::new(LocalBackend::new()),
        BackendSettings::Memory => Arc::new(ObjectBackend::new(Arc::new(InMemory::new()))),
    }
}
