// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for the scenario tests: an in-process coordination
//! namespace, a shared in-memory object store, and helpers for mounting
//! additional filesystem instances against the same namespace (distinct
//! client sessions, as separate hosts would have).

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use coordns::MemoryCoord;
use millpond::backend::{BackendResponse, BackendWriter, BoxedReader, WriteTarget};
use millpond::{
    Container, FileInode, FileSystem, FileSystemSettings, FsError, MutationOp, MutationOutcome,
    MutationVisitor, ObjectBackend, PathInfo, StorageBackend,
};
use object_store::memory::InMemory;
use tempfile::TempDir;

pub struct Fixture {
    pub coord: MemoryCoord,
    pub object_store: Arc<InMemory>,
    pub fs: Arc<FileSystem>,
    pub scratch: TempDir,
}

pub fn settings(scratch: &TempDir) -> FileSystemSettings {
    let mut settings = FileSystemSettings::new(
        "main",
        "/mp",
        vec![
            Container {
                domain: "docs".to_string(),
                backend_root: "data/docs".to_string(),
                default: true,
            },
            Container {
                domain: "media".to_string(),
                backend_root: "data/media".to_string(),
                default: false,
            },
        ],
        scratch.path().join("scratch"),
    );
    settings.lock_timeout_ms = 2_000;
    settings
}

/// Mount one filesystem instance over a fresh namespace and object store.
pub async fn mount_memory() -> Fixture {
    let scratch = tempfile::tempdir().expect("tempdir");
    let coord = MemoryCoord::new();
    let object_store = Arc::new(InMemory::new());
    let backend = Arc::new(ObjectBackend::new(object_store.clone()));
    let fs = FileSystem::mount(settings(&scratch), Arc::new(coord.clone()), backend)
        .await
        .expect("mount");
    Fixture {
        coord,
        object_store,
        fs,
        scratch,
    }
}

/// A second instance sharing the fixture's namespace and object store but
/// carrying its own session (and therefore its own client id).
pub async fn second_instance(fixture: &Fixture) -> Arc<FileSystem> {
    let coord = fixture.coord.handle().await;
    let backend = Arc::new(ObjectBackend::new(fixture.object_store.clone()));
    FileSystem::mount(settings(&fixture.scratch), Arc::new(coord), backend)
        .await
        .expect("mount second instance")
}

/// Backend wrapper that fails uploads on demand; everything else passes
/// through to the in-memory object backend.
pub struct FlakyBackend {
    inner: ObjectBackend,
    fail_uploads: AtomicBool,
}

impl FlakyBackend {
    pub fn new(store: Arc<InMemory>) -> Self {
        Self {
            inner: ObjectBackend::new(store),
            fail_uploads: AtomicBool::new(false),
        }
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    fn kind(&self) -> &'static str {
        "flaky"
    }

    async fn exists(&self, path: &PathInfo) -> millpond::Result<bool> {
        self.inner.exists(path).await
    }

    async fn size(&self, path: &PathInfo) -> millpond::Result<u64> {
        self.inner.size(path).await
    }

    async fn reader(&self, inode: &FileInode) -> millpond::Result<BoxedReader> {
        self.inner.reader(inode).await
    }

    async fn writer(
        &self,
        inode: &FileInode,
        target: WriteTarget,
    ) -> millpond::Result<BackendWriter> {
        self.inner.writer(inode, target).await
    }

    async fn upload(
        &self,
        local: &std::path::Path,
        inode: &FileInode,
    ) -> millpond::Result<BackendResponse> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(FsError::BackendFailure("injected upload failure".into()));
        }
        self.inner.upload(local, inode).await
    }

    async fn download(&self, inode: &FileInode, dest: &std::path::Path) -> millpond::Result<u64> {
        self.inner.download(inode, dest).await
    }

    async fn delete(&self, path: &PathInfo, recursive: bool) -> millpond::Result<bool> {
        self.inner.delete(path, recursive).await
    }

    async fn do_copy(&self, source: &PathInfo, target: &PathInfo) -> millpond::Result<()> {
        self.inner.do_copy(source, target).await
    }

    async fn do_move(&self, source: &PathInfo, target: &PathInfo) -> millpond::Result<()> {
        self.inner.do_move(source, target).await
    }

    async fn ensure_root(&self, container: &Container) -> millpond::Result<()> {
        self.inner.ensure_root(container).await
    }
}

/// Visitor that records every notification it receives.
#[derive(Default)]
pub struct RecordingVisitor {
    pub events: std::sync::Mutex<Vec<(MutationOp, MutationOutcome, String)>>,
}

impl MutationVisitor for RecordingVisitor {
    fn visit(
        &self,
        op: MutationOp,
        outcome: MutationOutcome,
        inode: &millpond::Inode,
        _error: Option<&FsError>,
    ) -> millpond::visitor::VisitorResult {
        self.events
            .lock()
            .expect("visitor mutex")
            .push((op, outcome, inode.common().path.clone()));
        Ok(())
    }
}
