// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The storage backend seam.
//!
//! The orchestrator depends on physical media only through this trait:
//! streams in and out, whole-object upload/download, existence/size
//! queries, and byte-level copy/move. Every backend-native failure is
//! wrapped into the single backend error kind so nothing upstream ever
//! branches on backend identity.

use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::domain::Container;
use crate::error::{FsError, Result};
use crate::inode::{FileInode, Inode, Timestamp};

pub mod local;
pub mod object;

pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;
pub type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// The backend-path handle reconstructed from an inode's `uri` metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    pub path: String,
}

impl PathInfo {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_inode(inode: &Inode) -> Result<Self> {
        inode
            .common()
            .backend_path()
            .map(Self::new)
            .ok_or_else(|| {
                FsError::backend(format!(
                    "inode {} carries no backend path",
                    inode.common().path
                ))
            })
    }

    pub fn from_file(file: &FileInode) -> Result<Self> {
        file.common.backend_path().map(Self::new).ok_or_else(|| {
            FsError::backend(format!(
                "inode {} carries no backend path",
                file.common.path
            ))
        })
    }
}

/// The backend's confirmation of a persisted object.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub size: u64,
    pub remote_ts: Option<Timestamp>,
    pub etag: Option<String>,
}

/// How a writer should be opened.
#[derive(Debug, Clone)]
pub enum WriteTarget {
    /// Write to the backend medium itself where the medium allows it;
    /// backends without in-place writes stage internally.
    Direct { overwrite: bool },
    /// Stage into the given local scratch file; persistence happens via a
    /// later [`StorageBackend::upload`].
    Scratch(PathBuf),
}

/// An open write stream plus where its bytes actually land. `staged` is
/// the local staging path when the bytes still need an upload to reach the
/// backend, `None` when the stream writes the medium directly.
pub struct BackendWriter {
    pub stream: BoxedWriter,
    pub staged: Option<PathBuf>,
}

impl std::fmt::Debug for BackendWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendWriter")
            .field("staged", &self.staged)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn exists(&self, path: &PathInfo) -> Result<bool>;

    async fn size(&self, path: &PathInfo) -> Result<u64>;

    async fn reader(&self, inode: &FileInode) -> Result<BoxedReader>;

    async fn writer(&self, inode: &FileInode, target: WriteTarget) -> Result<BackendWriter>;

    /// Push a locally staged file to the backend.
    async fn upload(&self, local: &Path, inode: &FileInode) -> Result<BackendResponse>;

    /// Fetch the backend object into `dest`; returns the byte count.
    async fn download(&self, inode: &FileInode, dest: &Path) -> Result<u64>;

    /// Remove an object or subtree. Returns whether anything was removed.
    async fn delete(&self, path: &PathInfo, recursive: bool) -> Result<bool>;

    async fn do_copy(&self, source: &PathInfo, target: &PathInfo) -> Result<()>;

    async fn do_move(&self, source: &PathInfo, target: &PathInfo) -> Result<()>;

    /// Make sure the physical root for a domain exists.
    async fn ensure_root(&self, container: &Container) -> Result<()>;
}
