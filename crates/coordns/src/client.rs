// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::error::{CoordError, Result};

/// Lifetime of a created node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Survives the creating session.
    Persistent,
    /// Removed automatically when the creating session closes or expires.
    Ephemeral,
}

/// Access to the coordination namespace.
///
/// Paths are absolute, `/`-separated, with no trailing separator. Every
/// write of a node payload is atomic: readers observe either the previous
/// payload or the new one, never a mixture. A node may only be created when
/// its parent exists.
#[async_trait]
pub trait CoordClient: Send + Sync {
    /// Identity of this client's session. Ephemeral nodes are tied to it.
    fn session_id(&self) -> &str;

    /// Create a node. Returns `false` (without error) when the node already
    /// exists, which makes check-or-create loops race-safe.
    async fn create(&self, path: &str, payload: &[u8], mode: CreateMode) -> Result<bool>;

    /// Read a node payload. Absent nodes are `Ok(None)`, not an error.
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Overwrite an existing node's payload atomically.
    async fn write(&self, path: &str, payload: &[u8]) -> Result<()>;

    /// Delete a node. With `recursive` the whole subtree goes; without it a
    /// node that still has children is a [`CoordError::NotEmpty`].
    async fn delete(&self, path: &str, recursive: bool) -> Result<()>;

    /// Child node names (final segments only), sorted.
    async fn children(&self, path: &str) -> Result<Vec<String>>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// Close the session; the service drops this session's ephemeral nodes.
    async fn close(&self) -> Result<()>;

    /// Create every missing ancestor of `path` (and `path` itself) with an
    /// empty payload. Idempotent.
    async fn ensure_path(&self, path: &str) -> Result<()> {
        let mut prefix = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            prefix.push('/');
            prefix.push_str(segment);
            match self.create(&prefix, &[], CreateMode::Persistent).await {
                Ok(_) => {}
                Err(CoordError::NodeExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
