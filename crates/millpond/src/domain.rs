// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Domains and containers.
//!
//! A container binds a logical domain name to one physical backend root.
//! At startup every configured domain gets exactly one root directory
//! inode in the coordination namespace (created idempotently, so racing
//! instances are safe) and a verified root on the backend side. After
//! bootstrap the registry is read-only; an unknown domain is a
//! configuration error, never a lazy-create opportunity.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::backend::StorageBackend;
use crate::error::{FsError, Result};
use crate::inode::DirectoryInode;
use crate::store::InodeStore;

/// One logical domain bound to a physical backend root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub domain: String,
    /// Backend-specific root descriptor, e.g. a directory or bucket prefix.
    pub backend_root: String,
    /// At most one container may be the default.
    #[serde(default)]
    pub default: bool,
}

struct DomainEntry {
    container: Container,
    root: DirectoryInode,
}

/// The read-only domain map of one mounted filesystem.
pub struct DomainRegistry {
    entries: HashMap<String, DomainEntry>,
    default_domain: Option<String>,
}

impl DomainRegistry {
    /// Validate the container list, create-or-read each domain's root
    /// inode, and make sure the backend has a root for each domain.
    pub async fn bootstrap(
        store: &InodeStore,
        backend: &dyn StorageBackend,
        containers: &[Container],
    ) -> Result<Self> {
        if containers.is_empty() {
            return Err(FsError::config("no containers configured"));
        }
        let defaults: Vec<&str> = containers
            .iter()
            .filter(|c| c.default)
            .map(|c| c.domain.as_str())
            .collect();
        if defaults.len() > 1 {
            return Err(FsError::config(format!(
                "multiple default containers: {}",
                defaults.join(", ")
            )));
        }

        let mut entries = HashMap::new();
        for container in containers {
            if container.domain.is_empty() {
                return Err(FsError::config("container with empty domain name"));
            }
            if entries.contains_key(&container.domain) {
                return Err(FsError::config(format!(
                    "duplicate container domain: {}",
                    container.domain
                )));
            }
            let root = store.ensure_domain_root(container).await?;
            backend.ensure_root(container).await?;
            diagnostics::log_info!(
                "domain ready: {domain}",
                domain: container.domain.as_str()
            );
            entries.insert(
                container.domain.clone(),
                DomainEntry {
                    container: container.clone(),
                    root,
                },
            );
        }

        let default_domain = defaults
            .first()
            .map(|d| d.to_string())
            .or_else(|| (containers.len() == 1).then(|| containers[0].domain.clone()));

        Ok(Self {
            entries,
            default_domain,
        })
    }

    pub fn container(&self, domain: &str) -> Result<&Container> {
        self.entries
            .get(domain)
            .map(|e| &e.container)
            .ok_or_else(|| FsError::config(format!("unknown domain: {domain}")))
    }

    pub fn root(&self, domain: &str) -> Result<&DirectoryInode> {
        self.entries
            .get(domain)
            .map(|e| &e.root)
            .ok_or_else(|| FsError::config(format!("unknown domain: {domain}")))
    }

    pub fn default_domain(&self) -> Option<&str> {
        self.default_domain.as_deref()
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
