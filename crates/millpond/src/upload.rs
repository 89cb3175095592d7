// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Asynchronous uploads.
//!
//! A bounded pool of in-flight pushes from local scratch files to the
//! backend. One upload per inode at a time is enforced by the file lock,
//! not here. Success reconciles metadata through the filesystem's
//! completion callback; failure leaves the inode in the error state with
//! the lock retained, so a retry reuses the same scratch file instead of
//! re-staging it.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::filesystem::FileSystem;
use crate::inode::FileInode;

pub struct UploadWorker {
    permits: Arc<Semaphore>,
}

impl UploadWorker {
    pub fn new(slots: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(slots.max(1))),
        }
    }

    /// Queue one upload. Returns immediately; completion is observable
    /// only through the inode's state.
    pub fn spawn(
        &self,
        fs: Arc<FileSystem>,
        local: PathBuf,
        inode: FileInode,
        clear_lock: bool,
    ) -> JoinHandle<()> {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return, // pool shut down
            };
            let path = inode.common.path.clone();
            match fs.backend().upload(&local, &inode).await {
                Ok(response) => {
                    diagnostics::log_debug!(
                        "upload complete: {path} ({size} bytes)",
                        path: path.as_str(),
                        size: response.size
                    );
                    if let Err(e) = fs.on_upload_success(&inode, &response, clear_lock).await {
                        diagnostics::log_error!(
                            "upload metadata reconciliation failed for {path}: {error}",
                            path: path.as_str(),
                            error: e.to_string()
                        );
                    }
                }
                Err(e) => {
                    diagnostics::log_error!(
                        "upload failed for {path}: {error}",
                        path: path.as_str(),
                        error: e.to_string()
                    );
                    fs.record_upload_failure(&inode, &e).await;
                }
            }
        })
    }
}
