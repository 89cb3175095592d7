// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Local-disk backend: the reference implementation.
//!
//! Backend paths are plain filesystem paths. Writes opened in direct mode
//! land on the medium as they stream, so persistence is confirmed
//! synchronously when the writer completes.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;

use crate::backend::{
    BackendResponse, BackendWriter, BoxedReader, PathInfo, StorageBackend, WriteTarget,
};
use crate::domain::Container;
use crate::error::{FsError, Result};
use crate::inode::FileInode;

pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }

    async fn prepare_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FsError::backend(format!("mkdir {}: {e}", parent.display())))?;
        }
        Ok(())
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn mtime_of(meta: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    meta.modified().ok().map(DateTime::<Utc>::from)
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn exists(&self, path: &PathInfo) -> Result<bool> {
        fs::try_exists(&path.path)
            .await
            .map_err(|e| FsError::backend(format!("stat {}: {e}", path.path)))
    }

    async fn size(&self, path: &PathInfo) -> Result<u64> {
        let meta = fs::metadata(&path.path)
            .await
            .map_err(|e| FsError::backend(format!("stat {}: {e}", path.path)))?;
        Ok(meta.len())
    }

    async fn reader(&self, inode: &FileInode) -> Result<BoxedReader> {
        let info = PathInfo::from_file(inode)?;
        let file = fs::File::open(&info.path)
            .await
            .map_err(|e| FsError::backend(format!("open {}: {e}", info.path)))?;
        Ok(Box::pin(file))
    }

    async fn writer(&self, inode: &FileInode, target: WriteTarget) -> Result<BackendWriter> {
        match target {
            WriteTarget::Direct { overwrite } => {
                let info = PathInfo::from_file(inode)?;
                let dest = Path::new(&info.path);
                if !overwrite && self.exists(&info).await? {
                    return Err(FsError::backend(format!(
                        "destination exists: {}",
                        info.path
                    )));
                }
                Self::prepare_parent(dest).await?;
                let file = fs::File::create(dest)
                    .await
                    .map_err(|e| FsError::backend(format!("create {}: {e}", info.path)))?;
                Ok(BackendWriter {
                    stream: Box::pin(file),
                    staged: None,
                })
            }
            WriteTarget::Scratch(scratch) => {
                Self::prepare_parent(&scratch).await?;
                let file = fs::File::create(&scratch)
                    .await
                    .map_err(|e| {
                        FsError::backend(format!("create {}: {e}", scratch.display()))
                    })?;
                Ok(BackendWriter {
                    stream: Box::pin(file),
                    staged: Some(scratch),
                })
            }
        }
    }

    async fn upload(&self, local: &Path, inode: &FileInode) -> Result<BackendResponse> {
        let info = PathInfo::from_file(inode)?;
        let dest = Path::new(&info.path);
        Self::prepare_parent(dest).await?;
        let size = fs::copy(local, dest)
            .await
            .map_err(|e| FsError::backend(format!("copy to {}: {e}", info.path)))?;
        let meta = fs::metadata(dest)
            .await
            .map_err(|e| FsError::backend(format!("stat {}: {e}", info.path)))?;
        Ok(BackendResponse {
            size,
            remote_ts: mtime_of(&meta),
            etag: None,
        })
    }

    async fn download(&self, inode: &FileInode, dest: &Path) -> Result<u64> {
        let info = PathInfo::from_file(inode)?;
        Self::prepare_parent(dest).await?;
        fs::copy(&info.path, dest)
            .await
            .map_err(|e| FsError::backend(format!("copy from {}: {e}", info.path)))
    }

    async fn delete(&self, path: &PathInfo, recursive: bool) -> Result<bool> {
        let target = Path::new(&path.path);
        let meta = match fs::metadata(target).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(FsError::backend(format!("stat {}: {e}", path.path))),
        };
        let outcome = if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(target).await
            } else {
                fs::remove_dir(target).await
            }
        } else {
            fs::remove_file(target).await
        };
        match outcome {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FsError::backend(format!("remove {}: {e}", path.path))),
        }
    }

    async fn do_copy(&self, source: &PathInfo, target: &PathInfo) -> Result<()> {
        Self::prepare_parent(Path::new(&target.path)).await?;
        fs::copy(&source.path, &target.path)
            .await
            .map_err(|e| {
                FsError::backend(format!("copy {} -> {}: {e}", source.path, target.path))
            })?;
        Ok(())
    }

    async fn do_move(&self, source: &PathInfo, target: &PathInfo) -> Result<()> {
        Self::prepare_parent(Path::new(&target.path)).await?;
        match fs::rename(&source.path, &target.path).await {
            Ok(()) => Ok(()),
            Err(_) => {
                // Cross-device rename: fall back to copy + remove.
                self.do_copy(source, target).await?;
                fs::remove_file(&source.path).await.map_err(|e| {
                    FsError::backend(format!("remove {}: {e}", source.path))
                })?;
                Ok(())
            }
        }
    }

    async fn ensure_root(&self, container: &Container) -> Result<()> {
        fs::create_dir_all(&container.backend_root)
            .await
            .map_err(|e| {
                FsError::backend(format!("mkdir {}: {e}", container.backend_root))
            })
    }
}
