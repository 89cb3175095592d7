// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Tree structure scenarios: idempotent creation, type conflicts,
//! listing, find, and delete semantics.

mod common;

use common::{mount_memory, second_instance};
use millpond::{FileState, FsError, Inode};

#[tokio::test]
async fn create_is_idempotent() {
    let fx = mount_memory().await;

    let first = fx.fs.create_file("docs", "reports/q1.pdf").await.expect("create");
    let second = fx.fs.create_file("docs", "reports/q1.pdf").await.expect("recreate");
    assert_eq!(first.common.uuid, second.common.uuid);
    assert_eq!(first.state, FileState::New);

    let dir_first = fx.fs.create_directory("docs", "reports").await.expect("mkdir");
    let dir_second = fx.fs.create_directory("docs", "reports").await.expect("mkdir again");
    assert_eq!(dir_first.common.uuid, dir_second.common.uuid);

    // no duplicate children appeared
    let listing = fx.fs.list("docs", "", false).await.expect("list");
    assert_eq!(listing.len(), 1);
    assert!(listing[0].is_directory());
}

#[tokio::test]
async fn intermediate_directories_are_created() {
    let fx = mount_memory().await;

    let file = fx.fs.create_file("docs", "a/b/c.txt").await.expect("create");
    assert_eq!(file.common.path, "a/b/c.txt");

    let a = fx.fs.get_inode("docs", "a").await.expect("get").expect("a exists");
    let b = fx.fs.get_inode("docs", "a/b").await.expect("get").expect("b exists");
    assert!(a.is_directory());
    assert!(b.is_directory());
    // the namespace path of a child is its parent's path plus its name
    assert_eq!(
        b.common().parent_coord_path.as_deref(),
        Some(a.common().coord_path.as_str()),
    );
}

#[tokio::test]
async fn type_conflicts_are_rejected() {
    let fx = mount_memory().await;
    fx.fs.create_directory("docs", "reports").await.expect("mkdir");
    fx.fs.create_file("docs", "reports/q1.pdf").await.expect("create");

    // file where a directory lives
    let err = fx.fs.create_file("docs", "reports").await.expect_err("must conflict");
    assert!(matches!(err, FsError::StructuralConflict(_)), "got {err}");

    // directory where a file lives
    let err = fx
        .fs
        .create_directory("docs", "reports/q1.pdf")
        .await
        .expect_err("must conflict");
    assert!(matches!(err, FsError::StructuralConflict(_)), "got {err}");

    // create inside a non-directory
    let err = fx
        .fs
        .create_file("docs", "reports/q1.pdf/nested.txt")
        .await
        .expect_err("must conflict");
    assert!(matches!(err, FsError::StructuralConflict(_)), "got {err}");
}

#[tokio::test]
async fn absent_paths_are_not_found_not_errors() {
    let fx = mount_memory().await;

    assert!(fx.fs.get_inode("docs", "missing").await.expect("get").is_none());

    let err = fx.fs.exists("docs", "missing").await.expect_err("strict");
    assert!(matches!(err, FsError::NotFound(_)), "got {err}");

    let err = match fx.fs.reader("docs", "missing").await {
        Ok(_) => panic!("strict"),
        Err(err) => err,
    };
    assert!(matches!(err, FsError::NotFound(_)), "got {err}");

    // unknown domain is a configuration error, not a lazy create
    let err = fx.fs.create_file("nope", "x").await.expect_err("unknown domain");
    assert!(matches!(err, FsError::ConfigurationError(_)), "got {err}");
}

#[tokio::test]
async fn listing_classifies_files_and_directories() {
    let fx = mount_memory().await;
    fx.fs.create_file("docs", "reports/q1.pdf").await.expect("create");
    fx.fs.create_file("docs", "reports/deep/q2.pdf").await.expect("create");
    fx.fs.create_file("docs", "top.txt").await.expect("create");

    // one level: the file plus the directory
    let shallow = fx.fs.list("docs", "", false).await.expect("list");
    let mut kinds: Vec<(bool, String)> = shallow
        .iter()
        .map(|n| (n.is_file(), n.common().path.clone()))
        .collect();
    kinds.sort();
    assert_eq!(
        kinds,
        vec![
            (false, "reports".to_string()),
            (true, "top.txt".to_string()),
        ],
    );

    // recursive: only files, directories traversed
    let deep = fx.fs.list("docs", "", true).await.expect("list");
    let mut paths: Vec<String> = deep.iter().map(|n| n.common().path.clone()).collect();
    paths.sort();
    assert_eq!(paths, vec!["reports/deep/q2.pdf", "reports/q1.pdf", "top.txt"]);
    assert!(deep.iter().all(Inode::is_file));

    // empty directory lists empty, not an error
    fx.fs.create_directory("docs", "blank").await.expect("mkdir");
    assert!(fx.fs.list("docs", "blank", true).await.expect("list").is_empty());
}

#[tokio::test]
async fn find_filters_by_name_and_directory() {
    let fx = mount_memory().await;
    fx.fs.create_file("docs", "reports/2024/q1.pdf").await.expect("create");
    fx.fs.create_file("docs", "reports/2024/q1.txt").await.expect("create");
    fx.fs.create_file("docs", "archive/2024/q1.pdf").await.expect("create");

    let pdfs = fx
        .fs
        .find("docs", "", None, r"\.pdf$")
        .await
        .expect("find");
    assert_eq!(pdfs.len(), 2);

    let report_pdfs = fx
        .fs
        .find("docs", "", Some("^reports/"), r"\.pdf$")
        .await
        .expect("find");
    assert_eq!(report_pdfs.len(), 1);
    assert_eq!(report_pdfs[0].common().path, "reports/2024/q1.pdf");

    let err = fx
        .fs
        .find("docs", "", None, "q1(")
        .await
        .expect_err("bad pattern");
    assert!(matches!(err, FsError::ConfigurationError(_)), "got {err}");
}

#[tokio::test]
async fn recursive_delete_removes_every_descendant() {
    let fx = mount_memory().await;
    fx.fs.create_file("docs", "reports/2024/q1.pdf").await.expect("create");
    fx.fs.create_file("docs", "reports/2024/q2.pdf").await.expect("create");
    fx.fs.create_file("docs", "reports/summary.txt").await.expect("create");

    fx.fs.delete("docs", "reports", true).await.expect("delete");

    for path in [
        "reports",
        "reports/2024",
        "reports/2024/q1.pdf",
        "reports/2024/q2.pdf",
        "reports/summary.txt",
    ] {
        assert!(
            fx.fs.get_inode("docs", path).await.expect("get").is_none(),
            "{path} survived the recursive delete",
        );
    }

    let err = fx.fs.delete("docs", "reports", true).await.expect_err("gone");
    assert!(matches!(err, FsError::NotFound(_)), "got {err}");
}

#[tokio::test]
async fn non_recursive_delete_refuses_non_empty_directory() {
    let fx = mount_memory().await;
    fx.fs.create_file("docs", "reports/q1.pdf").await.expect("create");

    let err = fx
        .fs
        .delete("docs", "reports", false)
        .await
        .expect_err("must refuse");
    assert!(matches!(err, FsError::StructuralConflict(_)), "got {err}");

    // contents intact
    assert!(fx.fs.get_inode("docs", "reports/q1.pdf").await.expect("get").is_some());

    // empty it, then the non-recursive delete goes through
    fx.fs.delete("docs", "reports/q1.pdf", false).await.expect("delete leaf");
    fx.fs.delete("docs", "reports", false).await.expect("delete empty dir");
    assert!(fx.fs.get_inode("docs", "reports").await.expect("get").is_none());
}

#[tokio::test]
async fn domain_roots_cannot_be_deleted() {
    let fx = mount_memory().await;
    let err = fx.fs.delete("docs", "", true).await.expect_err("root is protected");
    assert!(matches!(err, FsError::StructuralConflict(_)), "got {err}");
}

#[tokio::test]
async fn file_defaults_come_from_settings() {
    use std::sync::Arc;

    let scratch = tempfile::tempdir().expect("tempdir");
    let mut cfg = common::settings(&scratch);
    cfg.compressed = true;
    cfg.encryption_key_ref = Some("kms://tenant-key".to_string());

    let backend = Arc::new(millpond::ObjectBackend::new(Arc::new(
        object_store::memory::InMemory::new(),
    )));
    let fs = millpond::FileSystem::mount(cfg, Arc::new(coordns::MemoryCoord::new()), backend)
        .await
        .expect("mount");

    let file = fs.create_file("docs", "secret.bin").await.expect("create");
    assert!(file.compressed);
    assert_eq!(
        file.encryption.as_ref().map(|e| e.key_ref.as_str()),
        Some("kms://tenant-key"),
    );

    // directories carry no file lifecycle flags
    let dir = fs.create_directory("docs", "plain").await.expect("mkdir");
    assert!(dir.common.uri.contains_key("path"));
}

#[tokio::test]
async fn racing_instances_share_one_domain_root() {
    let fx = mount_memory().await;
    let other = second_instance(&fx).await;

    let mine = fx.fs.get_inode("docs", "").await.expect("get").expect("root");
    let theirs = other.get_inode("docs", "").await.expect("get").expect("root");
    assert_eq!(mine.common().uuid, theirs.common().uuid);

    // structure created by one instance is visible to the other
    fx.fs.create_file("docs", "shared/x.bin").await.expect("create");
    let seen = other
        .get_inode("docs", "shared/x.bin")
        .await
        .expect("get")
        .expect("visible");
    assert!(seen.is_file());
}
