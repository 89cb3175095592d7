// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Namespace snapshot for embedded single-host use.
//!
//! The `mill` binary runs against the in-process coordination namespace,
//! so between invocations the metadata tree is saved to (and reloaded
//! from) a JSON snapshot next to the scratch directory. Ephemeral nodes
//! (lock children) are never persisted: a dead process's locks die with
//! its snapshot, which mirrors session expiry in a networked deployment.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use coordns::{CoordClient, CreateMode};

/// Load a previously saved namespace into a fresh coordination client.
pub async fn load_namespace(coord: &dyn CoordClient, file: &Path) -> Result<()> {
    let text = match std::fs::read_to_string(file) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", file.display())),
    };
    let nodes: BTreeMap<String, String> =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", file.display()))?;
    // BTreeMap ordering puts parents before children, so plain creates
    // in iteration order always find their parent present.
    for (path, payload) in &nodes {
        coord
            .create(path, payload.as_bytes(), CreateMode::Persistent)
            .await
            .with_context(|| format!("restoring node {path}"))?;
    }
    Ok(())
}

/// Walk the namespace and save every persistent node. Lock children are
/// skipped.
pub async fn save_namespace(coord: &dyn CoordClient, file: &Path) -> Result<()> {
    let mut nodes = BTreeMap::new();
    let mut stack = vec!["/".to_string()];
    while let Some(path) = stack.pop() {
        for name in coord.children(&path).await? {
            if coordns::is_lock_node(&name) {
                continue;
            }
            let child = coordns::join(&path, &name);
            if let Some(payload) = coord.read(&child).await? {
                nodes.insert(child.clone(), String::from_utf8_lossy(&payload).into_owned());
            }
            stack.push(child);
        }
    }
    if let Some(parent) = file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(&nodes).context("serializing namespace")?;
    std::fs::write(file, text).with_context(|| format!("writing {}", file.display()))?;
    Ok(())
}
