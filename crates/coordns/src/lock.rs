// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Path-scoped distributed mutual exclusion.
//!
//! A lock on a namespace path is an ephemeral child node under that path.
//! Whoever creates the node holds the lock; everyone else polls until the
//! node disappears or the acquire timeout elapses. Because the node is
//! ephemeral, a crashed holder's session expiry releases the lock without
//! operator intervention.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::client::{CoordClient, CreateMode};
use crate::error::{CoordError, Result};

/// Prefix for lock child nodes. Listings of inode children must skip these.
pub const LOCK_PREFIX: &str = ".lock-";

const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// True when a child node name is a lock node, not an inode.
pub fn is_lock_node(name: &str) -> bool {
    name.starts_with(LOCK_PREFIX)
}

/// Acquires [`LockGuard`]s on namespace paths with a bounded wait.
#[derive(Clone)]
pub struct LockManager {
    client: Arc<dyn CoordClient>,
    timeout: Duration,
}

impl LockManager {
    pub fn new(client: Arc<dyn CoordClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Acquire the default mutation lock for `path`.
    pub async fn acquire(&self, path: &str) -> Result<LockGuard> {
        self.acquire_named(path, "mutex").await
    }

    /// Acquire a named lock scoped to `path`. Distinct names on the same
    /// path are independent locks.
    pub async fn acquire_named(&self, path: &str, name: &str) -> Result<LockGuard> {
        let lock_path = crate::join(path, &format!("{LOCK_PREFIX}{name}"));
        let deadline = Instant::now() + self.timeout;
        loop {
            let created = self
                .client
                .create(
                    &lock_path,
                    self.client.session_id().as_bytes(),
                    CreateMode::Ephemeral,
                )
                .await?;
            if created {
                diagnostics::log_debug!("lock acquired: {lock_path}", lock_path: lock_path.as_str());
                return Ok(LockGuard {
                    client: self.client.clone(),
                    path: lock_path,
                    released: AtomicBool::new(false),
                });
            }
            if Instant::now() >= deadline {
                return Err(CoordError::LockTimeout {
                    path: path.to_string(),
                    timeout: self.timeout,
                });
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }
}

/// A held lock. Release explicitly with [`LockGuard::release`]; a dropped
/// guard schedules a best-effort release, and session expiry is the final
/// backstop. Never hold a guard across a lock acquisition on an ancestor
/// path: lock order is strictly root-to-leaf.
pub struct LockGuard {
    client: Arc<dyn CoordClient>,
    path: String,
    released: AtomicBool,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("path", &self.path)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl LockGuard {
    /// Namespace path of the lock node itself.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Release the lock now. Releasing twice is a no-op.
    pub async fn release(self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.client.delete(&self.path, false).await {
            Ok(()) | Err(CoordError::NoNode(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let client = self.client.clone();
        let path = std::mem::take(&mut self.path);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = client.delete(&path, false).await {
                    diagnostics::log_warn!(
                        "lock release on drop failed for {path}: {error}",
                        path: path.as_str(),
                        error: e.to_string()
                    );
                }
            });
        }
        // Without a runtime the session expiry reclaims the ephemeral node.
    }
}
