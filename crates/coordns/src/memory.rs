// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! In-process coordination namespace.
//!
//! A single tree shared by any number of client handles, each with its own
//! session. Per-node writes are atomic because the whole tree sits behind
//! one async mutex; ephemeral nodes are garbage-collected when their owning
//! session closes. This is the reference implementation used by tests and
//! by embedded single-host deployments.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use async_trait::async_trait;

use crate::client::{CoordClient, CreateMode};
use crate::error::{CoordError, Result};

#[derive(Debug, Clone)]
struct NodeEntry {
    payload: Vec<u8>,
    ephemeral_owner: Option<String>,
}

#[derive(Debug, Default)]
struct Tree {
    /// Normalized absolute path -> entry. The root `/` always exists.
    nodes: BTreeMap<String, NodeEntry>,
    sessions: HashSet<String>,
}

/// One handle onto the shared in-memory namespace.
#[derive(Clone)]
pub struct MemoryCoord {
    tree: Arc<Mutex<Tree>>,
    session_counter: Arc<AtomicU64>,
    session: String,
}

fn normalize(path: &str) -> String {
    if path == "/" || path.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() { "/".to_string() } else { out }
}

impl MemoryCoord {
    pub fn new() -> Self {
        let mut tree = Tree::default();
        tree.nodes.insert(
            "/".to_string(),
            NodeEntry {
                payload: Vec::new(),
                ephemeral_owner: None,
            },
        );
        let counter = Arc::new(AtomicU64::new(0));
        let session = format!("client-{:04x}", counter.fetch_add(1, Ordering::SeqCst));
        tree.sessions.insert(session.clone());
        Self {
            tree: Arc::new(Mutex::new(tree)),
            session_counter: counter,
            session,
        }
    }

    /// A new handle onto the same tree with its own session identity. This
    /// is how a second filesystem instance shares the namespace in-process.
    pub async fn handle(&self) -> Self {
        let session = format!(
            "client-{:04x}",
            self.session_counter.fetch_add(1, Ordering::SeqCst)
        );
        let mut tree = self.tree.lock().await;
        tree.sessions.insert(session.clone());
        Self {
            tree: self.tree.clone(),
            session_counter: self.session_counter.clone(),
            session,
        }
    }

    fn check_session(&self, tree: &Tree) -> Result<()> {
        if tree.sessions.contains(&self.session) {
            Ok(())
        } else {
            Err(CoordError::SessionClosed(self.session.clone()))
        }
    }
}

impl Default for MemoryCoord {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordClient for MemoryCoord {
    fn session_id(&self) -> &str {
        &self.session
    }

    async fn create(&self, path: &str, payload: &[u8], mode: CreateMode) -> Result<bool> {
        let path = normalize(path);
        let mut tree = self.tree.lock().await;
        self.check_session(&tree)?;
        if tree.nodes.contains_key(&path) {
            return Ok(false);
        }
        if let Some(parent) = crate::parent(&path) {
            if !tree.nodes.contains_key(parent) {
                return Err(CoordError::NoParent(path.clone()));
            }
        }
        let ephemeral_owner = match mode {
            CreateMode::Persistent => None,
            CreateMode::Ephemeral => Some(self.session.clone()),
        };
        tree.nodes.insert(
            path,
            NodeEntry {
                payload: payload.to_vec(),
                ephemeral_owner,
            },
        );
        Ok(true)
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = normalize(path);
        let tree = self.tree.lock().await;
        self.check_session(&tree)?;
        Ok(tree.nodes.get(&path).map(|e| e.payload.clone()))
    }

    async fn write(&self, path: &str, payload: &[u8]) -> Result<()> {
        let path = normalize(path);
        let mut tree = self.tree.lock().await;
        self.check_session(&tree)?;
        match tree.nodes.get_mut(&path) {
            Some(entry) => {
                entry.payload = payload.to_vec();
                Ok(())
            }
            None => Err(CoordError::NoNode(path)),
        }
    }

    async fn delete(&self, path: &str, recursive: bool) -> Result<()> {
        let path = normalize(path);
        let mut tree = self.tree.lock().await;
        self.check_session(&tree)?;
        if !tree.nodes.contains_key(&path) {
            return Err(CoordError::NoNode(path));
        }
        let prefix = format!("{path}/");
        if recursive {
            tree.nodes
                .retain(|k, _| k != &path && !k.starts_with(&prefix));
        } else {
            if tree.nodes.keys().any(|k| k.starts_with(&prefix)) {
                return Err(CoordError::NotEmpty(path));
            }
            tree.nodes.remove(&path);
        }
        Ok(())
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        let path = normalize(path);
        let tree = self.tree.lock().await;
        self.check_session(&tree)?;
        if !tree.nodes.contains_key(&path) {
            return Err(CoordError::NoNode(path));
        }
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        let mut out = Vec::new();
        for key in tree.nodes.keys() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if !rest.is_empty() && !rest.contains('/') {
                    out.push(rest.to_string());
                }
            }
        }
        Ok(out)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = normalize(path);
        let tree = self.tree.lock().await;
        self.check_session(&tree)?;
        Ok(tree.nodes.contains_key(&path))
    }

    async fn close(&self) -> Result<()> {
        let mut tree = self.tree.lock().await;
        tree.sessions.remove(&self.session);
        let session = self.session.clone();
        tree.nodes
            .retain(|_, e| e.ephemeral_owner.as_deref() != Some(session.as_str()));
        Ok(())
    }
}
