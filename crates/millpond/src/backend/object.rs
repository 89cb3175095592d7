// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Object-storage backend over the `object_store` crate.
//!
//! Objects have no in-place writes, so every writer stages into a local
//! scratch file; the bytes reach the store through [`StorageBackend::upload`],
//! which is what the asynchronous upload worker drives. Copy and move map
//! onto the store's native copy/rename.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::{ObjectStore, path::Path as ObjectPath};
use tokio::fs;

use crate::backend::{
    BackendResponse, BackendWriter, BoxedReader, PathInfo, StorageBackend, WriteTarget,
};
use crate::domain::Container;
use crate::error::{FsError, Result};
use crate::inode::FileInode;

pub struct ObjectBackend {
    store: Arc<dyn ObjectStore>,
}

impl ObjectBackend {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn location(path: &PathInfo) -> ObjectPath {
        ObjectPath::from(path.path.trim_start_matches('/'))
    }

    fn stage_path(inode: &FileInode) -> PathBuf {
        match &inode.lock {
            Some(lock) => lock.local_scratch_path.clone(),
            None => std::env::temp_dir().join(format!("millpond-stage-{}", uuid7::uuid7())),
        }
    }
}

fn wrap(context: &str, err: object_store::Error) -> FsError {
    FsError::backend(format!("{context}: {err}"))
}

fn is_not_found(err: &object_store::Error) -> bool {
    matches!(err, object_store::Error::NotFound { .. })
}

#[async_trait]
impl StorageBackend for ObjectBackend {
    fn kind(&self) -> &'static str {
        "object"
    }

    async fn exists(&self, path: &PathInfo) -> Result<bool> {
        match self.store.head(&Self::location(path)).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(wrap("head", e)),
        }
    }

    async fn size(&self, path: &PathInfo) -> Result<u64> {
        let meta = self
            .store
            .head(&Self::location(path))
            .await
            .map_err(|e| wrap("head", e))?;
        Ok(meta.size)
    }

    async fn reader(&self, inode: &FileInode) -> Result<BoxedReader> {
        let info = PathInfo::from_file(inode)?;
        let result = self
            .store
            .get(&Self::location(&info))
            .await
            .map_err(|e| wrap("get", e))?;
        let stream = result
            .into_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        Ok(Box::pin(tokio_util::io::StreamReader::new(stream)))
    }

    async fn writer(&self, inode: &FileInode, target: WriteTarget) -> Result<BackendWriter> {
        let scratch = match target {
            WriteTarget::Scratch(path) => path,
            WriteTarget::Direct { overwrite } => {
                if !overwrite {
                    let info = PathInfo::from_file(inode)?;
                    if self.exists(&info).await? {
                        return Err(FsError::backend(format!(
                            "destination exists: {}",
                            info.path
                        )));
                    }
                }
                Self::stage_path(inode)
            }
        };
        if let Some(parent) = scratch.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FsError::backend(format!("mkdir {}: {e}", parent.display())))?;
        }
        let file = fs::File::create(&scratch)
            .await
            .map_err(|e| FsError::backend(format!("create {}: {e}", scratch.display())))?;
        Ok(BackendWriter {
            stream: Box::pin(file),
            staged: Some(scratch),
        })
    }

    async fn upload(&self, local: &Path, inode: &FileInode) -> Result<BackendResponse> {
        let info = PathInfo::from_file(inode)?;
        let location = Self::location(&info);
        let payload = fs::read(local)
            .await
            .map_err(|e| FsError::backend(format!("read {}: {e}", local.display())))?;
        let put = self
            .store
            .put(&location, Bytes::from(payload).into())
            .await
            .map_err(|e| wrap("put", e))?;
        let meta = self
            .store
            .head(&location)
            .await
            .map_err(|e| wrap("head", e))?;
        Ok(BackendResponse {
            size: meta.size,
            remote_ts: Some(meta.last_modified),
            etag: put.e_tag,
        })
    }

    async fn download(&self, inode: &FileInode, dest: &Path) -> Result<u64> {
        let info = PathInfo::from_file(inode)?;
        let bytes = self
            .store
            .get(&Self::location(&info))
            .await
            .map_err(|e| wrap("get", e))?
            .bytes()
            .await
            .map_err(|e| wrap("get body", e))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FsError::backend(format!("mkdir {}: {e}", parent.display())))?;
        }
        fs::write(dest, &bytes)
            .await
            .map_err(|e| FsError::backend(format!("write {}: {e}", dest.display())))?;
        Ok(bytes.len() as u64)
    }

    async fn delete(&self, path: &PathInfo, recursive: bool) -> Result<bool> {
        let location = Self::location(path);
        let mut removed = match self.store.delete(&location).await {
            Ok(()) => true,
            Err(e) if is_not_found(&e) => false,
            Err(e) => return Err(wrap("delete", e)),
        };
        if recursive {
            let mut listing = self.store.list(Some(&location));
            let mut descendants = Vec::new();
            while let Some(entry) = listing.next().await {
                descendants.push(entry.map_err(|e| wrap("list", e))?.location);
            }
            for descendant in descendants {
                match self.store.delete(&descendant).await {
                    Ok(()) => removed = true,
                    Err(e) if is_not_found(&e) => {}
                    Err(e) => return Err(wrap("delete", e)),
                }
            }
        }
        Ok(removed)
    }

    async fn do_copy(&self, source: &PathInfo, target: &PathInfo) -> Result<()> {
        self.store
            .copy(&Self::location(source), &Self::location(target))
            .await
            .map_err(|e| wrap("copy", e))
    }

    async fn do_move(&self, source: &PathInfo, target: &PathInfo) -> Result<()> {
        self.store
            .rename(&Self::location(source), &Self::location(target))
            .await
            .map_err(|e| wrap("rename", e))
    }

    async fn ensure_root(&self, container: &Container) -> Result<()> {
        let marker = PathInfo::new(format!(
            "{}/.domain",
            container.backend_root.trim_matches('/')
        ));
        if self.exists(&marker).await? {
            return Ok(());
        }
        self.store
            .put(&Self::location(&marker), Bytes::new().into())
            .await
            .map_err(|e| wrap("put", e))?;
        Ok(())
    }
}
