// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The filesystem orchestrator.
//!
//! Composes the inode store, the domain registry, and one storage backend
//! into the public filesystem surface: create/delete/move/copy/rename,
//! list/find, file locking, readers and writers, upload and download. The
//! orchestrator also owns the file lifecycle: a file that enters
//! `Updating` either reaches `Synced` (lock cleared, size recorded) or
//! `Error` (lock retained for retry); it never silently reverts to `New`.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use coordns::{CoordClient, LockManager};
use regex::Regex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::backend::{
    BackendResponse, BoxedReader, BoxedWriter, PathInfo, StorageBackend, WriteTarget,
};
use crate::config::FileSystemSettings;
use crate::domain::DomainRegistry;
use crate::error::{FsError, Result};
use crate::inode::{
    DirectoryInode, EncryptionDescriptor, FileInode, FileInodeLock, FileState, Inode, InodeKind,
};
use crate::path_builder::{self, PathBuilder};
use crate::store::{FileDefaults, InodeStore, release_quietly};
use crate::transform::{ByteTransform, IdentityTransform};
use crate::upload::UploadWorker;
use crate::visitor::{MutationOp, MutationOutcome, MutationVisitor};

const AVAILABILITY_POLL: Duration = Duration::from_millis(100);
const UPLOAD_SLOTS: usize = 4;

/// Extensions that classify a file inode as an archive.
const ARCHIVE_SUFFIXES: &[&str] = &[".zip", ".tar", ".tar.gz", ".tgz", ".jar"];

/// One mounted filesystem instance. Safe for concurrent use from any
/// number of tasks; cross-instance safety comes from the coordination
/// namespace locks, never from process-local state.
pub struct FileSystem {
    name: String,
    client_id: String,
    settings: FileSystemSettings,
    locks: LockManager,
    store: InodeStore,
    domains: DomainRegistry,
    backend: Arc<dyn StorageBackend>,
    transform: Arc<dyn ByteTransform>,
    visitors: Vec<Arc<dyn MutationVisitor>>,
    uploads: UploadWorker,
}

impl std::fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystem")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl FileSystem {
    pub async fn mount(
        settings: FileSystemSettings,
        coord: Arc<dyn CoordClient>,
        backend: Arc<dyn StorageBackend>,
    ) -> Result<Arc<Self>> {
        Self::mount_with(settings, coord, backend, Arc::new(IdentityTransform), Vec::new()).await
    }

    pub async fn mount_with(
        settings: FileSystemSettings,
        coord: Arc<dyn CoordClient>,
        backend: Arc<dyn StorageBackend>,
        transform: Arc<dyn ByteTransform>,
        visitors: Vec<Arc<dyn MutationVisitor>>,
    ) -> Result<Arc<Self>> {
        settings.validate()?;
        let paths = Arc::new(PathBuilder::new(&settings.base_path, &settings.name));
        coord.ensure_path(&paths.fs_root()).await?;

        let locks = LockManager::new(coord.clone(), settings.lock_timeout());
        let file_defaults = FileDefaults {
            compressed: settings.compressed,
            encryption: settings.encryption_key_ref.as_ref().map(|key_ref| {
                EncryptionDescriptor {
                    key_ref: key_ref.clone(),
                    algorithm: "aes-256-gcm".to_string(),
                }
            }),
        };
        let store = InodeStore::with_file_defaults(coord.clone(), locks.clone(), paths, file_defaults);
        let domains =
            DomainRegistry::bootstrap(&store, backend.as_ref(), &settings.containers).await?;
        tokio::fs::create_dir_all(&settings.scratch_dir).await?;

        let client_id = coord.session_id().to_string();
        diagnostics::log_info!(
            "mounted filesystem {name} as {client}",
            name: settings.name.as_str(),
            client: client_id.as_str()
        );

        Ok(Arc::new(Self {
            name: settings.name.clone(),
            client_id,
            settings,
            locks,
            store,
            domains,
            backend,
            transform,
            visitors,
            uploads: UploadWorker::new(UPLOAD_SLOTS),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity under which this instance takes file locks.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn settings(&self) -> &FileSystemSettings {
        &self.settings
    }

    pub fn store(&self) -> &InodeStore {
        &self.store
    }

    pub fn domains(&self) -> &DomainRegistry {
        &self.domains
    }

    pub(crate) fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    // ---- queries ------------------------------------------------------

    pub async fn get_inode(&self, domain: &str, path: &str) -> Result<Option<Inode>> {
        let root = self.domains.root(domain)?;
        self.store.get_inode(root, path).await
    }

    async fn require_inode(&self, domain: &str, path: &str) -> Result<Inode> {
        self.get_inode(domain, path)
            .await?
            .ok_or_else(|| FsError::not_found(format!("{domain}:{path}")))
    }

    async fn require_file(&self, domain: &str, path: &str) -> Result<FileInode> {
        self.require_inode(domain, path).await?.into_file()
    }

    /// Strict existence check: absent paths surface as `NotFound`, so
    /// callers wanting boolean-or-false semantics must catch it.
    pub async fn exists(&self, domain: &str, path: &str) -> Result<bool> {
        self.require_inode(domain, path).await.map(|_| true)
    }

    pub async fn is_directory(&self, domain: &str, path: &str) -> Result<bool> {
        Ok(self.require_inode(domain, path).await?.is_directory())
    }

    pub async fn is_file(&self, domain: &str, path: &str) -> Result<bool> {
        Ok(self.require_inode(domain, path).await?.is_file())
    }

    pub async fn is_archive(&self, domain: &str, path: &str) -> Result<bool> {
        let inode = self.require_inode(domain, path).await?;
        Ok(inode.is_file()
            && ARCHIVE_SUFFIXES
                .iter()
                .any(|suffix| inode.common().name.ends_with(suffix)))
    }

    pub async fn list(&self, domain: &str, path: &str, recursive: bool) -> Result<Vec<Inode>> {
        let dir = self.require_inode(domain, path).await?;
        self.store.list(&dir, recursive).await
    }

    pub async fn find(
        &self,
        domain: &str,
        path: &str,
        dir_pattern: Option<&str>,
        file_pattern: &str,
    ) -> Result<Vec<Inode>> {
        let file_re = Regex::new(file_pattern)
            .map_err(|e| FsError::config(format!("bad file pattern: {e}")))?;
        let dir_re = dir_pattern
            .map(Regex::new)
            .transpose()
            .map_err(|e| FsError::config(format!("bad directory pattern: {e}")))?;
        let dir = self.require_inode(domain, path).await?;
        self.store.find(&dir, dir_re.as_ref(), &file_re).await
    }

    // ---- structural mutation ------------------------------------------

    pub async fn create_directory(&self, domain: &str, path: &str) -> Result<DirectoryInode> {
        let container = self.domains.container(domain)?.clone();
        let root = self.domains.root(domain)?.clone();
        let fresh = self.store.get_inode(&root, path).await?.is_none();
        let created = self
            .store
            .create_inode(&root, &container, path, InodeKind::Directory)
            .await?;
        if fresh {
            self.notify(MutationOp::Create, MutationOutcome::Completed, &created, None);
        }
        created.into_directory()
    }

    pub async fn create_file(&self, domain: &str, path: &str) -> Result<FileInode> {
        let container = self.domains.container(domain)?.clone();
        let root = self.domains.root(domain)?.clone();
        let fresh = self.store.get_inode(&root, path).await?.is_none();
        let created = self
            .store
            .create_inode(&root, &container, path, InodeKind::File)
            .await?;
        if fresh {
            self.notify(MutationOp::Create, MutationOutcome::Completed, &created, None);
        }
        created.into_file()
    }

    /// Delete a path. Non-recursive delete of a directory that still has
    /// children fails; recursive delete takes the whole subtree, metadata
    /// and bytes. Domain roots cannot be deleted.
    pub async fn delete(&self, domain: &str, path: &str, recursive: bool) -> Result<()> {
        let inode = self.require_inode(domain, path).await?;
        if inode.common().parent_coord_path.is_none() {
            return Err(FsError::conflict(format!(
                "domain root {domain} cannot be deleted"
            )));
        }
        if inode.is_directory() && !recursive {
            let children = self.store.list(&inode, false).await?;
            if !children.is_empty() {
                return Err(FsError::conflict(format!(
                    "directory not empty: {}",
                    inode.common().path
                )));
            }
        }

        // Bytes first: a backend failure leaves the metadata intact.
        let info = PathInfo::from_inode(&inode)?;
        if let Err(e) = self.backend.delete(&info, recursive).await {
            self.notify(MutationOp::Delete, MutationOutcome::Error, &inode, Some(&e));
            return Err(e);
        }
        match self.store.delete_inode(&inode, recursive).await {
            Ok(()) => {
                self.notify(MutationOp::Delete, MutationOutcome::Completed, &inode, None);
                Ok(())
            }
            Err(e) => {
                self.notify(MutationOp::Delete, MutationOutcome::Error, &inode, Some(&e));
                Err(e)
            }
        }
    }

    /// Copy a file's bytes and metadata to a new path in the same domain.
    pub async fn copy(&self, domain: &str, source: &str, target: &str) -> Result<FileInode> {
        let source = self.require_file(domain, source).await?;
        let target = self.transfer(domain, &source, target, false).await?;
        Ok(target)
    }

    /// Move a file to a new path in the same domain: bytes move on the
    /// backend, then the source metadata is removed.
    pub async fn move_to(&self, domain: &str, source: &str, target: &str) -> Result<FileInode> {
        let source = self.require_file(domain, source).await?;
        let moved = self.transfer(domain, &source, target, true).await?;
        self.store
            .delete_inode(&Inode::File(source.clone()), true)
            .await?;
        self.notify(
            MutationOp::Delete,
            MutationOutcome::Completed,
            &Inode::File(source),
            None,
        );
        Ok(moved)
    }

    /// Rename within the parent directory: compute the sibling path, then
    /// move.
    pub async fn rename(&self, domain: &str, source: &str, new_name: &str) -> Result<FileInode> {
        let (parent, _) = path_builder::split_relative(source)
            .ok_or_else(|| FsError::conflict("cannot rename a domain root"))?;
        let target = path_builder::join_relative(&parent, new_name);
        self.move_to(domain, source, &target).await
    }

    /// Shared half of copy/move: resolve-or-create the target inode, let
    /// the backend transfer the bytes, and roll back the half-created
    /// target if the backend throws.
    async fn transfer(
        &self,
        domain: &str,
        source: &FileInode,
        target_path: &str,
        mv: bool,
    ) -> Result<FileInode> {
        let container = self.domains.container(domain)?.clone();
        let root = self.domains.root(domain)?.clone();
        let fresh = self.store.get_inode(&root, target_path).await?.is_none();
        let target = self
            .store
            .create_inode(&root, &container, target_path, InodeKind::File)
            .await?
            .into_file()?;

        let src_info = PathInfo::from_file(source)?;
        let dst_info = PathInfo::from_file(&target)?;
        let outcome = if mv {
            self.backend.do_move(&src_info, &dst_info).await
        } else {
            self.backend.do_copy(&src_info, &dst_info).await
        };

        match outcome {
            Err(e) => {
                if fresh {
                    if let Err(rollback) = self
                        .store
                        .delete_inode(&Inode::File(target.clone()), false)
                        .await
                    {
                        diagnostics::log_warn!(
                            "rollback of {path} failed: {error}",
                            path: target.common.path.as_str(),
                            error: rollback.to_string()
                        );
                    }
                }
                self.notify(
                    MutationOp::Create,
                    MutationOutcome::Error,
                    &Inode::File(target),
                    Some(&e),
                );
                Err(e)
            }
            Ok(()) => {
                let mut done = target;
                done.state = FileState::Synced;
                done.common.synced = true;
                done.synced_size = match self.backend.size(&dst_info).await {
                    Ok(size) => Some(size),
                    Err(_) => source.synced_size,
                };
                done.sync_ts = Some(Utc::now());
                let updated = self
                    .store
                    .update_inode_with_lock(&Inode::File(done))
                    .await?;
                self.notify(MutationOp::Create, MutationOutcome::Completed, &updated, None);
                updated.into_file()
            }
        }
    }

    // ---- file locking -------------------------------------------------

    /// Take (or re-take) the single-writer lock on a file. A lock record
    /// held by a different client is a conflict, whatever the file state.
    /// The first acquisition allocates the file's local scratch path.
    pub async fn file_lock(&self, file: &FileInode) -> Result<FileInode> {
        self.lock_file(file, false).await
    }

    /// Refresh this client's lock timestamp; conflict if the lock is held
    /// elsewhere or missing.
    pub async fn file_update_lock(&self, file: &FileInode) -> Result<FileInode> {
        let guard = self.locks.acquire(&file.common.coord_path).await?;
        let result = async {
            let mut stored = self.read_file_at(&file.common.coord_path).await?;
            match &mut stored.lock {
                Some(lock) if lock.client_id == self.client_id => {
                    lock.last_update_ts = Utc::now();
                }
                Some(lock) => {
                    return Err(FsError::LockConflict {
                        path: stored.common.path.clone(),
                        holder: lock.client_id.clone(),
                    });
                }
                None => {
                    return Err(FsError::LockConflict {
                        path: stored.common.path.clone(),
                        holder: "nobody".to_string(),
                    });
                }
            }
            self.store.update_inode(&Inode::File(stored)).await?.into_file()
        }
        .await;
        release_quietly(guard).await;
        result
    }

    /// Clear the lock; conflict if a different client holds it.
    pub async fn file_unlock(&self, file: &FileInode) -> Result<FileInode> {
        let guard = self.locks.acquire(&file.common.coord_path).await?;
        let result = async {
            let mut stored = self.read_file_at(&file.common.coord_path).await?;
            if let Some(lock) = &stored.lock {
                if lock.client_id != self.client_id {
                    return Err(FsError::LockConflict {
                        path: stored.common.path.clone(),
                        holder: lock.client_id.clone(),
                    });
                }
            }
            stored.lock = None;
            let updated = self.store.update_inode(&Inode::File(stored)).await?;
            self.notify(MutationOp::Update, MutationOutcome::Completed, &updated, None);
            updated.into_file()
        }
        .await;
        release_quietly(guard).await;
        result
    }

    /// A file counts as locked only when a lock record exists **and** the
    /// state marks a pending update; a leftover lock on a synced file
    /// reads as unlocked.
    pub async fn is_file_locked(&self, file: &FileInode) -> Result<bool> {
        let stored = self.read_file_at(&file.common.coord_path).await?;
        Ok(stored.lock.is_some() && stored.state.is_pending_update())
    }

    async fn lock_file(&self, file: &FileInode, mark_updating: bool) -> Result<FileInode> {
        let guard = self.locks.acquire(&file.common.coord_path).await?;
        let result = async {
            let mut stored = self.read_file_at(&file.common.coord_path).await?;
            if let Some(lock) = &stored.lock {
                if lock.client_id != self.client_id {
                    return Err(FsError::LockConflict {
                        path: stored.common.path.clone(),
                        holder: lock.client_id.clone(),
                    });
                }
            }
            let scratch = stored
                .lock
                .take()
                .filter(|l| l.client_id == self.client_id)
                .map(|l| l.local_scratch_path)
                .unwrap_or_else(|| self.alloc_scratch());
            stored.lock = Some(FileInodeLock {
                client_id: self.client_id.clone(),
                local_scratch_path: scratch,
                last_update_ts: Utc::now(),
            });
            if mark_updating && stored.state != FileState::Updating {
                stored.state = FileState::Updating;
            }
            let updated = self.store.update_inode(&Inode::File(stored)).await?;
            self.notify(MutationOp::Update, MutationOutcome::Completed, &updated, None);
            updated.into_file()
        }
        .await;
        release_quietly(guard).await;
        result
    }

    fn alloc_scratch(&self) -> PathBuf {
        self.settings
            .scratch_dir
            .join(format!("{}.scratch", uuid7::uuid7()))
    }

    // ---- readers and writers ------------------------------------------

    /// Open a read stream on an existing file. Never mutates state.
    pub async fn reader(&self, domain: &str, path: &str) -> Result<BoxedReader> {
        let file = self.require_file(domain, path).await?;
        let stream = self.backend.reader(&file).await?;
        Ok(self.transform.wrap_reader(stream, &file))
    }

    /// Open a writer. The file inode is created if absent, its lock taken,
    /// and its state moved to `Updating` until the backend confirms
    /// persistence through [`FileSystem::on_upload_success`].
    pub async fn writer(
        self: &Arc<Self>,
        domain: &str,
        path: &str,
        overwrite: bool,
    ) -> Result<FileWriter> {
        self.open_writer(domain, path, overwrite, None).await
    }

    /// Open a writer that stages into a caller-chosen scratch file.
    pub async fn writer_with_scratch(
        self: &Arc<Self>,
        domain: &str,
        path: &str,
        scratch: PathBuf,
    ) -> Result<FileWriter> {
        self.open_writer(domain, path, true, Some(scratch)).await
    }

    async fn open_writer(
        self: &Arc<Self>,
        domain: &str,
        path: &str,
        overwrite: bool,
        scratch: Option<PathBuf>,
    ) -> Result<FileWriter> {
        let file = self.create_file(domain, path).await?;
        if !overwrite && file.state == FileState::Synced {
            return Err(FsError::conflict(format!(
                "file already has synced content: {}",
                file.common.path
            )));
        }

        let locked = self.lock_file(&file, true).await?;
        let target = match scratch {
            Some(path) => WriteTarget::Scratch(path),
            None => WriteTarget::Direct { overwrite },
        };
        let backend_writer = match self.backend.writer(&locked, target).await {
            Ok(writer) => writer,
            Err(e) => {
                // Never leak the file lock on the error path.
                let _ = self.file_unlock(&locked).await;
                return Err(e);
            }
        };
        let stream = self.transform.wrap_writer(backend_writer.stream, &locked);
        Ok(FileWriter {
            fs: Arc::clone(self),
            inode: locked,
            inner: stream,
            staged: backend_writer.staged,
            bytes_written: 0,
            clear_lock: true,
        })
    }

    // ---- upload / download --------------------------------------------

    /// Queue an asynchronous push of a locally staged file. Returns
    /// immediately with the pending inode; poll with
    /// [`FileSystem::check_inode_available`] to learn completion.
    pub async fn upload(
        self: &Arc<Self>,
        local: PathBuf,
        inode: FileInode,
        clear_lock: bool,
    ) -> Result<FileInode> {
        let mut pending = self.read_file_at(&inode.common.coord_path).await?;
        if pending.state != FileState::Updating {
            pending.state = FileState::Updating;
            pending = self
                .store
                .update_inode_with_lock(&Inode::File(pending))
                .await?
                .into_file()?;
        }
        self.uploads
            .spawn(Arc::clone(self), local, pending.clone(), clear_lock);
        Ok(pending)
    }

    /// Fetch backend bytes into the file's scratch path (or a fresh one),
    /// bounded by the caller's timeout.
    pub async fn download(&self, inode: &FileInode, timeout: Duration) -> Result<PathBuf> {
        let dest = inode
            .lock
            .as_ref()
            .map(|l| l.local_scratch_path.clone())
            .unwrap_or_else(|| self.alloc_scratch());
        match tokio::time::timeout(timeout, self.backend.download(inode, &dest)).await {
            Err(_) => Err(FsError::Timeout(
                timeout,
                format!("download of {}", inode.common.path),
            )),
            Ok(result) => {
                result?;
                Ok(dest)
            }
        }
    }

    /// Poll the stored inode until it is available (`Synced`) or the
    /// timeout elapses. A stored error state surfaces immediately.
    pub async fn check_inode_available(
        &self,
        inode: &FileInode,
        timeout: Duration,
    ) -> Result<FileInode> {
        let deadline = Instant::now() + timeout;
        loop {
            let stored = self.read_file_at(&inode.common.coord_path).await?;
            match stored.state {
                FileState::Synced => return Ok(stored),
                FileState::Error => {
                    return Err(FsError::backend(
                        stored
                            .error
                            .unwrap_or_else(|| "upload failed".to_string()),
                    ));
                }
                FileState::New | FileState::Updating => {}
            }
            if Instant::now() >= deadline {
                return Err(FsError::Timeout(
                    timeout,
                    format!("availability of {}", inode.common.path),
                ));
            }
            tokio::time::sleep(AVAILABILITY_POLL).await;
        }
    }

    /// Backend confirmation callback: stamp the synced size and timestamp,
    /// then either finish the cycle (`Synced`, lock cleared) or keep the
    /// update window open (`Updating`, lock retained, size refreshed).
    pub async fn on_upload_success(
        &self,
        inode: &FileInode,
        response: &BackendResponse,
        clear_lock: bool,
    ) -> Result<FileInode> {
        let mut stored = self.read_file_at(&inode.common.coord_path).await?;
        stored.synced_size = Some(response.size);
        stored.sync_ts = response.remote_ts.or_else(|| Some(Utc::now()));
        stored.common.synced = true;
        if clear_lock {
            stored.state = FileState::Synced;
            stored.lock = None;
            stored.error = None;
        }
        let updated = self
            .store
            .update_inode_with_lock(&Inode::File(stored))
            .await?;
        self.notify(MutationOp::Update, MutationOutcome::Completed, &updated, None);
        updated.into_file()
    }

    /// Failure path of an asynchronous upload: record the error on the
    /// inode and keep the lock so a retry reuses the same scratch file.
    pub(crate) async fn record_upload_failure(&self, inode: &FileInode, error: &FsError) {
        match self.read_file_at(&inode.common.coord_path).await {
            Ok(mut stored) => {
                stored.state = FileState::Error;
                stored.error = Some(error.to_string());
                match self.store.update_inode_with_lock(&Inode::File(stored)).await {
                    Ok(updated) => {
                        self.notify(
                            MutationOp::Update,
                            MutationOutcome::Error,
                            &updated,
                            Some(error),
                        );
                    }
                    Err(e) => {
                        diagnostics::log_error!(
                            "could not record upload failure for {path}: {error}",
                            path: inode.common.path.as_str(),
                            error: e.to_string()
                        );
                    }
                }
            }
            Err(e) => {
                diagnostics::log_error!(
                    "could not re-read {path} after failed upload: {error}",
                    path: inode.common.path.as_str(),
                    error: e.to_string()
                );
            }
        }
    }

    // ---- background reconciliation ------------------------------------

    /// One reconciliation sweep: retry errored uploads this client still
    /// holds locks and scratch files for, and report foreign locks that
    /// look abandoned. Single failures are logged, never fatal.
    pub async fn resync_pending(self: &Arc<Self>) {
        let domains: Vec<String> = self.domains.domains().map(str::to_string).collect();
        for domain in domains {
            let Ok(root) = self.domains.root(&domain) else {
                continue;
            };
            let listing = match self
                .store
                .list(&Inode::Directory(root.clone()), true)
                .await
            {
                Ok(listing) => listing,
                Err(e) => {
                    diagnostics::log_warn!(
                        "sync sweep of {domain} failed: {error}",
                        domain: domain.as_str(),
                        error: e.to_string()
                    );
                    continue;
                }
            };
            for node in listing {
                let Inode::File(file) = node else { continue };
                let Some(lock) = file.lock.clone() else { continue };
                if file.state == FileState::Error && lock.client_id == self.client_id {
                    if lock.local_scratch_path.exists() {
                        diagnostics::log_info!(
                            "retrying errored upload: {path}",
                            path: file.common.path.as_str()
                        );
                        if let Err(e) = self
                            .upload(lock.local_scratch_path.clone(), file, true)
                            .await
                        {
                            diagnostics::log_warn!(
                                "retry submission failed: {error}",
                                error: e.to_string()
                            );
                        }
                    }
                } else if file.state.is_pending_update()
                    && lock.client_id != self.client_id
                {
                    let age = Utc::now() - lock.last_update_ts;
                    if age.num_milliseconds() > self.settings.scratch_ttl_ms as i64 {
                        diagnostics::log_warn!(
                            "stale foreign lock on {path} held by {holder}",
                            path: file.common.path.as_str(),
                            holder: lock.client_id.as_str()
                        );
                    }
                }
            }
        }
    }

    // ---- visitors -----------------------------------------------------

    fn notify(
        &self,
        op: MutationOp,
        outcome: MutationOutcome,
        inode: &Inode,
        error: Option<&FsError>,
    ) {
        for visitor in &self.visitors {
            if let Err(e) = visitor.visit(op, outcome, inode, error) {
                diagnostics::log_warn!(
                    "mutation visitor failed for {path}: {error}",
                    path: inode.common().path.as_str(),
                    error: e.to_string()
                );
            }
        }
    }

    async fn read_file_at(&self, coord_path: &str) -> Result<FileInode> {
        self.store
            .read_node(coord_path)
            .await?
            .ok_or_else(|| FsError::not_found(coord_path.to_string()))?
            .into_file()
    }
}

/// An open write session. Bytes stream through `AsyncWrite`; call
/// [`FileWriter::complete`] to finish. Until the backend confirms, the
/// inode stays in `Updating` with this client's lock held.
pub struct FileWriter {
    fs: Arc<FileSystem>,
    inode: FileInode,
    inner: BoxedWriter,
    staged: Option<PathBuf>,
    bytes_written: u64,
    clear_lock: bool,
}

impl std::fmt::Debug for FileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWriter")
            .field("inode", &self.inode)
            .field("staged", &self.staged)
            .field("bytes_written", &self.bytes_written)
            .field("clear_lock", &self.clear_lock)
            .finish_non_exhaustive()
    }
}

impl FileWriter {
    pub fn inode(&self) -> &FileInode {
        &self.inode
    }

    /// Keep the file lock after completion, leaving the update window
    /// open for a follow-up write to the same scratch file.
    pub fn retain_lock(&mut self) {
        self.clear_lock = false;
    }

    /// Flush and close the stream, then reconcile metadata. Direct writes
    /// confirm synchronously; staged writes queue an asynchronous upload
    /// and return the still-`Updating` inode for the caller to poll.
    pub async fn complete(mut self) -> Result<FileInode> {
        self.inner.shutdown().await?;
        match self.staged.take() {
            None => {
                let response = BackendResponse {
                    size: self.bytes_written,
                    remote_ts: Some(Utc::now()),
                    etag: None,
                };
                self.fs
                    .on_upload_success(&self.inode, &response, self.clear_lock)
                    .await
            }
            Some(staged) => {
                self.fs
                    .upload(staged, self.inode.clone(), self.clear_lock)
                    .await
            }
        }
    }
}

impl AsyncWrite for FileWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_write(cx, buf) {
            Poll::Ready(Ok(written)) => {
                this.bytes_written += written as u64;
                Poll::Ready(Ok(written))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.get_mut().inner.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.get_mut().inner.as_mut().poll_shutdown(cx)
    }
}
