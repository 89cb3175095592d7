// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Inode CRUD over the coordination namespace and the tree mutation
//! protocol that makes concurrent structural changes safe.
//!
//! The protocol locks the **parent** of whatever is being created or
//! deleted, one level at a time, released before descending. Locking the
//! parent rather than the new child means two concurrent creates of the
//! same child race safely (the loser observes the winner's node instead of
//! corrupting it), while siblings under different parents never contend.
//! Traversal is always root-to-leaf, so lock order is acyclic and hold
//! time is bounded to a single level.

use std::sync::Arc;

use chrono::Utc;
use coordns::{CoordClient, CoordError, CreateMode, LockManager};
use regex::Regex;

use crate::domain::Container;
use crate::error::{FsError, Result};
use crate::inode::{
    DirectoryInode, EncryptionDescriptor, FileInode, Inode, InodeKind, URI_PATH_KEY,
};
use crate::path_builder::{self, PathBuilder};

/// Flags stamped onto every newly created file inode, taken from the
/// mounted filesystem's settings.
#[derive(Debug, Clone, Default)]
pub struct FileDefaults {
    pub compressed: bool,
    pub encryption: Option<EncryptionDescriptor>,
}

pub struct InodeStore {
    coord: Arc<dyn CoordClient>,
    locks: LockManager,
    paths: Arc<PathBuilder>,
    file_defaults: FileDefaults,
}

impl InodeStore {
    pub fn new(coord: Arc<dyn CoordClient>, locks: LockManager, paths: Arc<PathBuilder>) -> Self {
        Self::with_file_defaults(coord, locks, paths, FileDefaults::default())
    }

    pub fn with_file_defaults(
        coord: Arc<dyn CoordClient>,
        locks: LockManager,
        paths: Arc<PathBuilder>,
        file_defaults: FileDefaults,
    ) -> Self {
        Self {
            coord,
            locks,
            paths,
            file_defaults,
        }
    }

    pub fn paths(&self) -> &PathBuilder {
        &self.paths
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Read and deserialize one node. A node whose payload has been
    /// cleared (pending removal) reads as absent.
    pub async fn read_node(&self, coord_path: &str) -> Result<Option<Inode>> {
        match self.coord.read(coord_path).await? {
            None => Ok(None),
            Some(payload) if payload.is_empty() => Ok(None),
            Some(payload) => Ok(Some(Inode::from_bytes(&payload)?)),
        }
    }

    /// Read-or-create the root directory inode of a domain, guarded by the
    /// filesystem-root lock so racing instances bootstrap idempotently.
    pub async fn ensure_domain_root(&self, container: &Container) -> Result<DirectoryInode> {
        let fs_root = self.paths.fs_root();
        self.coord.ensure_path(&fs_root).await?;

        let guard = self.locks.acquire(&fs_root).await?;
        let result = self.ensure_domain_root_locked(container).await;
        release_quietly(guard).await;
        result
    }

    async fn ensure_domain_root_locked(&self, container: &Container) -> Result<DirectoryInode> {
        let root_path = self.paths.domain_root(&container.domain);
        if let Some(existing) = self.read_node(&root_path).await? {
            return existing.into_directory();
        }
        let mut root = DirectoryInode::new(&container.domain, "", &container.domain, root_path.clone(), None);
        root.common.uri.insert(
            URI_PATH_KEY.to_string(),
            PathBuilder::backend_path(container, ""),
        );
        let payload = Inode::from(root.clone()).to_bytes()?;
        if !self.coord.create(&root_path, &payload, CreateMode::Persistent).await? {
            // Another instance won the race inside a different namespace
            // session; take its record.
            return self
                .read_node(&root_path)
                .await?
                .ok_or_else(|| FsError::not_found(root_path))?
                .into_directory();
        }
        diagnostics::log_debug!(
            "created domain root: {path}",
            path: root.common.coord_path.as_str()
        );
        Ok(root)
    }

    /// Walk a relative logical path from the domain root, creating every
    /// missing intermediate directory, and create (or return) the final
    /// inode of the requested kind. Idempotent: an existing inode of the
    /// matching kind is returned unchanged; a kind mismatch anywhere along
    /// the path is a structural conflict.
    pub async fn create_inode(
        &self,
        domain_root: &DirectoryInode,
        container: &Container,
        relative: &str,
        kind: InodeKind,
    ) -> Result<Inode> {
        let relative = path_builder::normalize(relative);
        if relative.is_empty() {
            return match kind {
                InodeKind::Directory => Ok(Inode::Directory(domain_root.clone())),
                InodeKind::File => Err(FsError::conflict(format!(
                    "domain root {} is a directory",
                    domain_root.common.domain
                ))),
            };
        }

        let segments: Vec<&str> = path_builder::segments(&relative).collect();
        let mut parent = domain_root.clone();
        let mut logical = String::new();

        for (idx, segment) in segments.iter().enumerate() {
            let last = idx + 1 == segments.len();
            logical = path_builder::join_relative(&logical, segment);
            let requested = if last { kind } else { InodeKind::Directory };

            // One lock per level, held only while this level is examined,
            // released before descending.
            let guard = self.locks.acquire(&parent.common.coord_path).await?;
            let outcome = self
                .check_or_create_child(&parent, container, segment, &logical, requested)
                .await;
            release_quietly(guard).await;
            let child = outcome?;

            if last {
                return Ok(child);
            }
            parent = child.into_directory()?;
        }
        // Segments were non-empty, so the loop always returns.
        Err(FsError::conflict(relative))
    }

    /// Under the parent's lock: return the existing child when its kind
    /// matches the request, create it when absent, conflict otherwise.
    async fn check_or_create_child(
        &self,
        parent: &DirectoryInode,
        container: &Container,
        name: &str,
        logical: &str,
        requested: InodeKind,
    ) -> Result<Inode> {
        let child_path = coordns::join(
            &parent.common.coord_path,
            &path_builder::encode_segment(name),
        );

        if let Some(existing) = self.read_node(&child_path).await? {
            return match (&existing, requested) {
                (Inode::Directory(_), InodeKind::Directory) => Ok(existing),
                (Inode::File(_), InodeKind::File) => Ok(existing),
                (Inode::Directory(_), InodeKind::File) => Err(FsError::conflict(format!(
                    "directory already exists at {logical}"
                ))),
                (Inode::File(_), InodeKind::Directory) => Err(FsError::conflict(format!(
                    "file already exists at {logical}"
                ))),
            };
        }

        let mut inode = match requested {
            InodeKind::Directory => Inode::Directory(DirectoryInode::new(
                &parent.common.domain,
                logical,
                name,
                child_path.clone(),
                Some(parent.common.coord_path.clone()),
            )),
            InodeKind::File => {
                let mut file = FileInode::new(
                    &parent.common.domain,
                    logical,
                    name,
                    child_path.clone(),
                    parent.common.coord_path.clone(),
                );
                file.compressed = self.file_defaults.compressed;
                file.encryption = self.file_defaults.encryption.clone();
                Inode::File(file)
            }
        };
        inode.common_mut().uri.insert(
            URI_PATH_KEY.to_string(),
            PathBuilder::backend_path(container, logical),
        );

        let payload = inode.to_bytes()?;
        if !self
            .coord
            .create(&child_path, &payload, CreateMode::Persistent)
            .await?
        {
            // The node appeared between our read and create; under the
            // parent lock this means a cleared-payload node was reused.
            self.coord.write(&child_path, &payload).await?;
        }
        diagnostics::log_debug!("created inode: {path}", path: child_path.as_str());
        Ok(inode)
    }

    /// Resolve a relative path to its inode, eagerly validating the parent
    /// chain (one read per ancestor) so callers always get a fully linked
    /// record. Absent is `Ok(None)`, not an error.
    pub async fn get_inode(
        &self,
        domain_root: &DirectoryInode,
        relative: &str,
    ) -> Result<Option<Inode>> {
        let relative = path_builder::normalize(relative);
        if relative.is_empty() {
            return Ok(Some(Inode::Directory(domain_root.clone())));
        }
        let coord_path = self.paths.coord_path(&domain_root.common.domain, &relative);
        let Some(inode) = self.read_node(&coord_path).await? else {
            return Ok(None);
        };

        let mut parent = inode.common().parent_coord_path.clone();
        while let Some(link) = parent {
            let node = self.read_node(&link).await?.ok_or_else(|| {
                FsError::conflict(format!("dangling parent link: {link}"))
            })?;
            parent = match node {
                Inode::Directory(d) => d.common.parent_coord_path,
                Inode::File(_) => {
                    return Err(FsError::conflict(format!("parent is a file: {link}")));
                }
            };
        }
        Ok(Some(inode))
    }

    /// Persist a modified inode using optimistic concurrency: the write is
    /// rejected with a staleness error when the stored copy carries a
    /// newer version than the caller's. On success the returned inode has
    /// the bumped version and fresh update timestamp.
    pub async fn update_inode(&self, inode: &Inode) -> Result<Inode> {
        let coord_path = inode.common().coord_path.clone();
        let stored = self
            .read_node(&coord_path)
            .await?
            .ok_or_else(|| FsError::not_found(coord_path.clone()))?;
        if stored.common().version > inode.common().version {
            return Err(FsError::StaleWrite {
                path: inode.common().path.clone(),
                stored: stored.common().version,
                proposed: inode.common().version,
            });
        }
        let mut next = inode.clone();
        {
            let common = next.common_mut();
            common.version = stored.common().version + 1;
            common.update_ts = Utc::now();
        }
        self.coord.write(&coord_path, &next.to_bytes()?).await?;
        Ok(next)
    }

    /// [`update_inode`] wrapped in the target's own lock, for callers that
    /// are not already inside a locked context.
    pub async fn update_inode_with_lock(&self, inode: &Inode) -> Result<Inode> {
        let guard = self.locks.acquire(&inode.common().coord_path).await?;
        let result = self.update_inode(inode).await;
        release_quietly(guard).await;
        result
    }

    /// Delete an inode under its parent's lock. Recursive removes the
    /// whole subtree. Non-recursive refuses a directory that still has
    /// non-lock children, otherwise clears the payload, removes leftover
    /// lock children, and removes the node itself.
    pub async fn delete_inode(&self, inode: &Inode, recursive: bool) -> Result<()> {
        let parent_path = inode
            .common()
            .parent_coord_path
            .clone()
            .ok_or_else(|| {
                FsError::conflict(format!(
                    "domain root {} cannot be deleted",
                    inode.common().domain
                ))
            })?;

        let guard = self.locks.acquire(&parent_path).await?;
        let result = self.delete_locked(inode, recursive).await;
        release_quietly(guard).await;
        result
    }

    async fn delete_locked(&self, inode: &Inode, recursive: bool) -> Result<()> {
        let coord_path = &inode.common().coord_path;
        if !self.coord.exists(coord_path).await? {
            return Err(FsError::not_found(coord_path.clone()));
        }

        if recursive {
            self.coord.delete(coord_path, true).await?;
            return Ok(());
        }

        let children = self.coord.children(coord_path).await?;
        let (lock_children, real_children): (Vec<_>, Vec<_>) = children
            .into_iter()
            .partition(|name| coordns::is_lock_node(name));
        if !real_children.is_empty() {
            return Err(FsError::conflict(format!(
                "directory not empty: {} ({} children)",
                inode.common().path,
                real_children.len()
            )));
        }

        // Clear the payload first so concurrent readers observe the node
        // as gone even before the namespace entry is removed.
        self.coord.write(coord_path, &[]).await?;
        for name in lock_children {
            let lock_path = coordns::join(coord_path, &name);
            if let Err(e) = self.coord.delete(&lock_path, false).await {
                diagnostics::log_warn!(
                    "failed to remove lock child {path}: {error}",
                    path: lock_path.as_str(),
                    error: e.to_string()
                );
            }
        }
        match self.coord.delete(coord_path, false).await {
            Ok(()) | Err(CoordError::NoNode(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Enumerate a directory. Files are always included; subdirectories
    /// are included one level deep when `recursive` is false and traversed
    /// (not included) when it is true. An empty result is a legitimate
    /// terminal state, not a fault.
    pub async fn list(&self, dir: &Inode, recursive: bool) -> Result<Vec<Inode>> {
        let start = dir.as_directory()?;
        let mut out = Vec::new();
        let mut stack = vec![start.common.coord_path.clone()];
        while let Some(dir_path) = stack.pop() {
            let children = match self.coord.children(&dir_path).await {
                Ok(children) => children,
                Err(CoordError::NoNode(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            for name in children {
                if coordns::is_lock_node(&name) {
                    continue;
                }
                let child_path = coordns::join(&dir_path, &name);
                let Some(node) = self.read_node(&child_path).await? else {
                    continue;
                };
                match node {
                    Inode::File(_) => out.push(node),
                    Inode::Directory(_) => {
                        if recursive {
                            stack.push(child_path);
                        } else {
                            out.push(node);
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Recursive listing filtered by regular expressions: `file_pattern`
    /// against the file name, and optionally `dir_pattern` against the
    /// file's parent directory path.
    pub async fn find(
        &self,
        dir: &Inode,
        dir_pattern: Option<&Regex>,
        file_pattern: &Regex,
    ) -> Result<Vec<Inode>> {
        let all = self.list(dir, true).await?;
        Ok(all
            .into_iter()
            .filter(|node| {
                let common = node.common();
                if !file_pattern.is_match(&common.name) {
                    return false;
                }
                match dir_pattern {
                    None => true,
                    Some(pattern) => {
                        let parent_dir = path_builder::split_relative(&common.path)
                            .map(|(dir, _)| dir)
                            .unwrap_or_default();
                        pattern.is_match(&parent_dir)
                    }
                }
            })
            .collect())
    }
}

/// Locks are released on every path, error or not; a failed release is
/// logged because session expiry will reclaim the node anyway.
pub(crate) async fn release_quietly(guard: coordns::LockGuard) {
    let path = guard.path().to_string();
    if let Err(e) = guard.release().await {
        diagnostics::log_warn!(
            "lock release failed for {path}: {error}",
            path: path.as_str(),
            error: e.to_string()
        );
    }
}
