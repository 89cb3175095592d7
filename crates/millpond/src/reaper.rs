// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Scratch-directory reaper.
//!
//! A single background loop that deletes expired files under the scratch
//! root on a timer. It runs independently of any metadata lock; a file
//! that cannot be deleted is logged and skipped, never fatal to the
//! sweep.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct TempDirectoryReaper {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TempDirectoryReaper {
    pub fn start(root: PathBuf, max_age: Duration, interval: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => sweep(&root, max_age).await,
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            diagnostics::log_debug!("scratch reaper stopped");
        });
        Self { stop, handle }
    }

    /// Signal the loop and join it.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}

async fn sweep(root: &Path, max_age: Duration) {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) => {
            diagnostics::log_warn!(
                "scratch sweep cannot read {root}: {error}",
                root: root.display().to_string(),
                error: e.to_string()
            );
            return;
        }
    };
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                diagnostics::log_warn!("scratch sweep aborted: {error}", error: e.to_string());
                break;
            }
        };
        let path = entry.path();
        let expired = entry
            .metadata()
            .await
            .ok()
            .filter(|meta| meta.is_file())
            .and_then(|meta| meta.modified().ok())
            .and_then(|mtime| mtime.elapsed().ok())
            .is_some_and(|age| age >= max_age);
        if !expired {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                diagnostics::log_debug!(
                    "reaped scratch file: {path}",
                    path: path.display().to_string()
                );
            }
            Err(e) => {
                diagnostics::log_warn!(
                    "could not reap {path}: {error}",
                    path: path.display().to_string(),
                    error: e.to_string()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_files_are_reaped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stale = dir.path().join("stale.scratch");
        tokio::fs::write(&stale, b"x").await.expect("seed");

        let reaper = TempDirectoryReaper::start(
            dir.path().to_path_buf(),
            Duration::ZERO,
            Duration::from_millis(20),
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        reaper.stop().await;

        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn fresh_files_survive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fresh = dir.path().join("fresh.scratch");
        tokio::fs::write(&fresh, b"x").await.expect("seed");

        let reaper = TempDirectoryReaper::start(
            dir.path().to_path_buf(),
            Duration::from_secs(3600),
            Duration::from_millis(20),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        reaper.stop().await;

        assert!(fresh.exists());
    }
}
