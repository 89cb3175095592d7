// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! File lifecycle scenarios: writer sessions, lock discipline across
//! client ids, optimistic staleness, upload failure and retry, and
//! copy/move semantics.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FlakyBackend, mount_memory, second_instance, settings};
use millpond::{FileState, FileSystem, FsError, Inode, LocalBackend};
use object_store::memory::InMemory;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn writer_session_reaches_synced_on_object_backend() {
    let fx = mount_memory().await;

    let mut writer = fx.fs.writer("docs", "reports/q1.pdf", true).await.expect("writer");
    // the update window opens as soon as the writer does
    assert_eq!(writer.inode().state, FileState::Updating);
    assert!(writer.inode().lock.is_some());

    writer.write_all(b"quarterly numbers").await.expect("write");
    let closed = writer.complete().await.expect("complete");
    // staged bytes confirm asynchronously
    assert_eq!(closed.state, FileState::Updating);

    let synced = fx
        .fs
        .check_inode_available(&closed, WAIT)
        .await
        .expect("available");
    assert_eq!(synced.state, FileState::Synced);
    assert_eq!(synced.synced_size, Some(17));
    assert!(synced.sync_ts.is_some());
    assert!(synced.lock.is_none(), "lock cleared on confirmation");

    let mut reader = fx.fs.reader("docs", "reports/q1.pdf").await.expect("reader");
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.expect("read");
    assert_eq!(buf, b"quarterly numbers");
}

#[tokio::test]
async fn writer_confirms_synchronously_on_local_backend() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let data = tempfile::tempdir().expect("tempdir");
    let coord = coordns::MemoryCoord::new();
    let mut cfg = settings(&scratch);
    for container in &mut cfg.containers {
        container.backend_root = data
            .path()
            .join(&container.domain)
            .to_string_lossy()
            .into_owned();
    }
    let fs = FileSystem::mount(cfg, Arc::new(coord), Arc::new(LocalBackend::new()))
        .await
        .expect("mount");

    let mut writer = fs.writer("docs", "notes.txt", true).await.expect("writer");
    writer.write_all(b"local bytes").await.expect("write");
    let done = writer.complete().await.expect("complete");

    // direct medium writes confirm without an upload round
    assert_eq!(done.state, FileState::Synced);
    assert_eq!(done.synced_size, Some(11));
    assert!(done.lock.is_none());

    let mut reader = fs.reader("docs", "notes.txt").await.expect("reader");
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.expect("read");
    assert_eq!(buf, b"local bytes");
}

#[tokio::test]
async fn lock_is_exclusive_across_clients() {
    let fx = mount_memory().await;
    let other = second_instance(&fx).await;
    assert_ne!(fx.fs.client_id(), other.client_id());

    let file = fx.fs.create_file("docs", "contended.bin").await.expect("create");

    let locked = fx.fs.file_lock(&file).await.expect("first lock");
    assert!(locked.locked_by(fx.fs.client_id()));

    // second client is rejected while the record is live
    let err = other.file_lock(&file).await.expect_err("held elsewhere");
    match err {
        FsError::LockConflict { holder, .. } => assert_eq!(holder, fx.fs.client_id()),
        other => panic!("expected LockConflict, got {other}"),
    }

    // re-acquiring from the owning client refreshes, not conflicts
    fx.fs.file_lock(&locked).await.expect("re-lock by owner");
    fx.fs.file_update_lock(&locked).await.expect("refresh");

    // after release the other client wins
    fx.fs.file_unlock(&locked).await.expect("unlock");
    let stolen = other.file_lock(&file).await.expect("second lock");
    assert!(stolen.locked_by(other.client_id()));

    // and the first client is now the one rejected
    let err = fx.fs.file_update_lock(&file).await.expect_err("foreign lock");
    assert!(matches!(err, FsError::LockConflict { .. }), "got {err}");
}

#[tokio::test]
async fn stale_lock_record_reads_unlocked() {
    let fx = mount_memory().await;
    let file = fx.fs.create_file("docs", "idle.bin").await.expect("create");

    // lock record on a file with no pending update: not "locked"
    let locked = fx.fs.file_lock(&file).await.expect("lock");
    assert_eq!(locked.state, FileState::New);
    assert!(!fx.fs.is_file_locked(&locked).await.expect("query"));

    // an open writer marks the pending update
    let writer = fx.fs.writer("docs", "idle.bin", true).await.expect("writer");
    assert!(fx.fs.is_file_locked(writer.inode()).await.expect("query"));

    let done = writer.complete().await.expect("complete");
    let synced = fx.fs.check_inode_available(&done, WAIT).await.expect("available");
    assert!(!fx.fs.is_file_locked(&synced).await.expect("query"));
}

#[tokio::test]
async fn concurrent_updates_are_detected_as_stale() {
    let fx = mount_memory().await;
    let other = second_instance(&fx).await;

    let file = fx.fs.create_file("docs", "contended.txt").await.expect("create");

    // A reads, B persists an update, then A's write must be rejected
    let a_copy = fx
        .fs
        .get_inode("docs", "contended.txt")
        .await
        .expect("get")
        .expect("exists");
    let mut b_copy = other
        .get_inode("docs", "contended.txt")
        .await
        .expect("get")
        .expect("exists")
        .into_file()
        .expect("file");
    b_copy.compressed = true;
    other
        .store()
        .update_inode_with_lock(&Inode::File(b_copy))
        .await
        .expect("b update");

    let err = fx
        .fs
        .store()
        .update_inode_with_lock(&a_copy)
        .await
        .expect_err("stale");
    match err {
        FsError::StaleWrite { stored, proposed, .. } => {
            assert!(stored > proposed, "stored {stored} vs proposed {proposed}");
        }
        other => panic!("expected StaleWrite, got {other}"),
    }

    // A re-reads and can update again
    let fresh = fx
        .fs
        .get_inode("docs", "contended.txt")
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(file.common.uuid, fresh.common().uuid);
    fx.fs
        .store()
        .update_inode_with_lock(&fresh)
        .await
        .expect("update after re-read");
}

#[tokio::test]
async fn failed_upload_keeps_lock_and_scratch_for_retry() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let coord = coordns::MemoryCoord::new();
    let store = Arc::new(InMemory::new());
    let backend = Arc::new(FlakyBackend::new(store));
    backend.fail_uploads(true);
    let fs = FileSystem::mount(settings(&scratch), Arc::new(coord), backend.clone())
        .await
        .expect("mount");

    let mut writer = fs.writer("docs", "unlucky.bin", true).await.expect("writer");
    writer.write_all(b"doomed bytes").await.expect("write");
    let pending = writer.complete().await.expect("complete");

    let err = fs
        .check_inode_available(&pending, WAIT)
        .await
        .expect_err("upload failed");
    assert!(matches!(err, FsError::BackendFailure(_)), "got {err}");

    let stored = fs
        .get_inode("docs", "unlucky.bin")
        .await
        .expect("get")
        .expect("exists")
        .into_file()
        .expect("file");
    assert_eq!(stored.state, FileState::Error);
    assert!(stored.error.is_some());
    // the lock survives a failure so the retry reuses the scratch file
    let lock = stored.lock.clone().expect("lock retained");
    assert!(lock.local_scratch_path.exists(), "scratch file retained");
    assert!(fs.is_file_locked(&stored).await.expect("query"));

    // retry from the same scratch file once the backend recovers
    backend.fail_uploads(false);
    let retried = fs
        .upload(lock.local_scratch_path.clone(), stored, true)
        .await
        .expect("retry");
    assert_eq!(retried.state, FileState::Updating);
    let synced = fs.check_inode_available(&retried, WAIT).await.expect("available");
    assert_eq!(synced.state, FileState::Synced);
    assert_eq!(synced.synced_size, Some(12));
    assert!(synced.lock.is_none());
}

#[tokio::test]
async fn overwrite_false_refuses_synced_content() {
    let fx = mount_memory().await;

    let mut writer = fx.fs.writer("docs", "keep.txt", false).await.expect("first write");
    writer.write_all(b"v1").await.expect("write");
    let done = writer.complete().await.expect("complete");
    fx.fs.check_inode_available(&done, WAIT).await.expect("available");

    let err = fx
        .fs
        .writer("docs", "keep.txt", false)
        .await
        .expect_err("refuse overwrite");
    assert!(matches!(err, FsError::StructuralConflict(_)), "got {err}");

    // explicit overwrite reopens the lifecycle
    let writer = fx.fs.writer("docs", "keep.txt", true).await.expect("overwrite");
    assert_eq!(writer.inode().state, FileState::Updating);
    let done = writer.complete().await.expect("complete");
    fx.fs.check_inode_available(&done, WAIT).await.expect("available");
}

#[tokio::test]
async fn move_updates_both_paths_and_backend() {
    let fx = mount_memory().await;

    let mut writer = fx.fs.writer("docs", "reports/q1.pdf", true).await.expect("writer");
    writer.write_all(b"numbers").await.expect("write");
    let done = writer.complete().await.expect("complete");
    fx.fs.check_inode_available(&done, WAIT).await.expect("available");

    let moved = fx
        .fs
        .move_to("docs", "reports/q1.pdf", "archive/q1.pdf")
        .await
        .expect("move");
    assert_eq!(moved.common.path, "archive/q1.pdf");
    assert_eq!(moved.state, FileState::Synced);
    assert_eq!(moved.synced_size, Some(7));

    // old path gone, new path readable
    assert!(fx.fs.get_inode("docs", "reports/q1.pdf").await.expect("get").is_none());
    let mut reader = fx.fs.reader("docs", "archive/q1.pdf").await.expect("reader");
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.expect("read");
    assert_eq!(buf, b"numbers");
}

#[tokio::test]
async fn copy_rolls_back_target_metadata_on_backend_failure() {
    let fx = mount_memory().await;

    // metadata exists but no backend object: the byte copy must fail
    fx.fs.create_file("docs", "ghost.bin").await.expect("create");
    let err = fx
        .fs
        .copy("docs", "ghost.bin", "copies/ghost.bin")
        .await
        .expect_err("no bytes to copy");
    assert!(matches!(err, FsError::BackendFailure(_)), "got {err}");

    // the half-created target inode was rolled back
    assert!(
        fx.fs
            .get_inode("docs", "copies/ghost.bin")
            .await
            .expect("get")
            .is_none(),
        "target metadata must not survive a failed backend copy",
    );
}

#[tokio::test]
async fn rename_is_move_within_the_parent() {
    let fx = mount_memory().await;

    let mut writer = fx.fs.writer("docs", "reports/draft.txt", true).await.expect("writer");
    writer.write_all(b"text").await.expect("write");
    let done = writer.complete().await.expect("complete");
    fx.fs.check_inode_available(&done, WAIT).await.expect("available");

    let renamed = fx
        .fs
        .rename("docs", "reports/draft.txt", "final.txt")
        .await
        .expect("rename");
    assert_eq!(renamed.common.path, "reports/final.txt");
    assert!(fx.fs.get_inode("docs", "reports/draft.txt").await.expect("get").is_none());
}

#[tokio::test]
async fn download_fetches_backend_bytes() {
    let fx = mount_memory().await;

    let mut writer = fx.fs.writer("docs", "fetch.bin", true).await.expect("writer");
    writer.write_all(b"fetch me").await.expect("write");
    let done = writer.complete().await.expect("complete");
    let synced = fx.fs.check_inode_available(&done, WAIT).await.expect("available");

    let local = fx.fs.download(&synced, WAIT).await.expect("download");
    assert_eq!(tokio::fs::read(&local).await.expect("read"), b"fetch me");
}
