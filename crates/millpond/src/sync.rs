// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Named background reconciliation task, one per mounted filesystem.
//!
//! Each cycle re-reads the files this client holds locks on, retries
//! uploads stuck in the error state, and reports foreign locks that look
//! abandoned. Same stop/join discipline as the scratch reaper.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::filesystem::FileSystem;

pub struct SyncTask {
    name: String,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SyncTask {
    pub fn start(name: impl Into<String>, fs: Arc<FileSystem>, interval: Duration) -> Self {
        let name = name.into();
        let task_name = name.clone();
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a freshly
            // mounted filesystem is not swept before it has any files.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => fs.resync_pending().await,
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            diagnostics::log_debug!("sync task {name} stopped", name: task_name.as_str());
        });
        Self { name, stop, handle }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the loop and join it.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}
