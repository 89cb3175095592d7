// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Inode records.
//!
//! An inode is the metadata for one file or directory in the virtual
//! namespace. The serialized form is the payload of one coordination
//! namespace node and is self-describing: an embedded `kind` tag selects
//! the directory or file variant on deserialization, so readers never need
//! external hints.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FsError, Result};

pub type Timestamp = DateTime<Utc>;

/// Key into the `uri` map holding the backend path for this inode.
pub const URI_PATH_KEY: &str = "path";

/// What kind of inode a caller wants created at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    Directory,
    File,
}

/// Per-file synchronization status against the storage backend.
///
/// `New` - metadata exists, no confirmed backend bytes. `Updating` - a
/// write is in flight. `Synced` - metadata and backend agree. `Error` -
/// the last operation failed; must be retried or deleted before further
/// writes succeed. `Synced` and `Error` are both re-enterable; no state is
/// terminal while the inode exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    New,
    Updating,
    Synced,
    Error,
}

impl FileState {
    /// Whether a transition to `next` is one the lifecycle permits.
    /// Content never changes without passing through `Updating`.
    pub fn can_become(self, next: FileState) -> bool {
        matches!(
            (self, next),
            (FileState::New, FileState::Updating)
                | (FileState::Updating, FileState::Synced)
                | (FileState::Updating, FileState::Error)
                | (FileState::Error, FileState::Updating)
                | (FileState::Synced, FileState::Updating)
        )
    }

    /// True for states that mark a pending update. A lock record on an
    /// inode outside these states is stale and reads as unlocked.
    pub fn is_pending_update(self) -> bool {
        matches!(self, FileState::Updating | FileState::Error)
    }
}

/// The single-writer lock on a file inode. Ownership is by client (one
/// filesystem instance), not by thread: any thread of the owning instance
/// may extend or release it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInodeLock {
    pub client_id: String,
    pub local_scratch_path: PathBuf,
    pub last_update_ts: Timestamp,
}

/// Reference to an externally managed encryption key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionDescriptor {
    pub key_ref: String,
    pub algorithm: String,
}

/// Fields shared by both inode variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InodeCommon {
    pub uuid: String,
    pub domain: String,
    /// Logical path relative to the domain root, empty for the root itself.
    pub path: String,
    pub name: String,
    /// This node's own path in the coordination namespace.
    pub coord_path: String,
    /// Back-reference to the parent's coordination path. `None` only for
    /// domain roots. Never an ownership edge.
    pub parent_coord_path: Option<String>,
    /// Backend-specific path metadata (opaque to the metadata layer).
    #[serde(default)]
    pub uri: BTreeMap<String, String>,
    pub create_ts: Timestamp,
    pub update_ts: Timestamp,
    /// Monotonic counter bumped on every persisted update; the staleness
    /// check compares versions, not timestamps.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub synced: bool,
}

impl InodeCommon {
    fn new(
        domain: &str,
        path: &str,
        name: &str,
        coord_path: String,
        parent_coord_path: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            uuid: uuid7::uuid7().to_string(),
            domain: domain.to_string(),
            path: path.to_string(),
            name: name.to_string(),
            coord_path,
            parent_coord_path,
            uri: BTreeMap::new(),
            create_ts: now,
            update_ts: now,
            version: 0,
            synced: false,
        }
    }

    pub fn backend_path(&self) -> Option<&str> {
        self.uri.get(URI_PATH_KEY).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryInode {
    #[serde(flatten)]
    pub common: InodeCommon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInode {
    #[serde(flatten)]
    pub common: InodeCommon,
    pub state: FileState,
    #[serde(default)]
    pub lock: Option<FileInodeLock>,
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub encryption: Option<EncryptionDescriptor>,
    #[serde(default)]
    pub synced_size: Option<u64>,
    #[serde(default)]
    pub sync_ts: Option<Timestamp>,
    /// Failure payload while in [`FileState::Error`].
    #[serde(default)]
    pub error: Option<String>,
}

/// One node of the virtual namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Inode {
    Directory(DirectoryInode),
    File(FileInode),
}

impl DirectoryInode {
    pub fn new(
        domain: &str,
        path: &str,
        name: &str,
        coord_path: String,
        parent_coord_path: Option<String>,
    ) -> Self {
        Self {
            common: InodeCommon::new(domain, path, name, coord_path, parent_coord_path),
        }
    }
}

impl FileInode {
    pub fn new(
        domain: &str,
        path: &str,
        name: &str,
        coord_path: String,
        parent_coord_path: String,
    ) -> Self {
        Self {
            common: InodeCommon::new(domain, path, name, coord_path, Some(parent_coord_path)),
            state: FileState::New,
            lock: None,
            compressed: false,
            encryption: None,
            synced_size: None,
            sync_ts: None,
            error: None,
        }
    }

    /// Whether this client's lock record is present on the inode.
    pub fn locked_by(&self, client_id: &str) -> bool {
        self.lock
            .as_ref()
            .is_some_and(|l| l.client_id == client_id)
    }
}

impl Inode {
    pub fn common(&self) -> &InodeCommon {
        match self {
            Inode::Directory(d) => &d.common,
            Inode::File(f) => &f.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut InodeCommon {
        match self {
            Inode::Directory(d) => &mut d.common,
            Inode::File(f) => &mut f.common,
        }
    }

    pub fn kind(&self) -> InodeKind {
        match self {
            Inode::Directory(_) => InodeKind::Directory,
            Inode::File(_) => InodeKind::File,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Inode::Directory(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Inode::File(_))
    }

    pub fn as_file(&self) -> Result<&FileInode> {
        match self {
            Inode::File(f) => Ok(f),
            Inode::Directory(d) => Err(FsError::conflict(format!(
                "not a file: {}",
                d.common.path
            ))),
        }
    }

    pub fn as_directory(&self) -> Result<&DirectoryInode> {
        match self {
            Inode::Directory(d) => Ok(d),
            Inode::File(f) => Err(FsError::conflict(format!(
                "not a directory: {}",
                f.common.path
            ))),
        }
    }

    pub fn into_file(self) -> Result<FileInode> {
        match self {
            Inode::File(f) => Ok(f),
            Inode::Directory(d) => Err(FsError::conflict(format!(
                "not a file: {}",
                d.common.path
            ))),
        }
    }

    pub fn into_directory(self) -> Result<DirectoryInode> {
        match self {
            Inode::Directory(d) => Ok(d),
            Inode::File(f) => Err(FsError::conflict(format!(
                "not a directory: {}",
                f.common.path
            ))),
        }
    }

    /// Serialize for storage as a coordination node payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize a coordination node payload.
    pub fn from_bytes(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

impl From<DirectoryInode> for Inode {
    fn from(d: DirectoryInode) -> Self {
        Inode::Directory(d)
    }
}

impl From<FileInode> for Inode {
    fn from(f: FileInode) -> Self {
        Inode::File(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_self_describing() {
        let dir = DirectoryInode::new("docs", "reports", "reports", "/mp/fs/docs/reports".into(), Some("/mp/fs/docs".into()));
        let file = FileInode::new(
            "docs",
            "reports/q1.pdf",
            "q1.pdf",
            "/mp/fs/docs/reports/q1.pdf".into(),
            "/mp/fs/docs/reports".into(),
        );

        let dir_bytes = Inode::from(dir.clone()).to_bytes().expect("serialize");
        let file_bytes = Inode::from(file.clone()).to_bytes().expect("serialize");

        match Inode::from_bytes(&dir_bytes).expect("deserialize") {
            Inode::Directory(d) => assert_eq!(d, dir),
            Inode::File(_) => panic!("directory round-tripped as file"),
        }
        match Inode::from_bytes(&file_bytes).expect("deserialize") {
            Inode::File(f) => {
                assert_eq!(f.state, FileState::New);
                assert_eq!(f, file);
            }
            Inode::Directory(_) => panic!("file round-tripped as directory"),
        }
    }

    #[test]
    fn lifecycle_transitions() {
        use FileState::*;
        assert!(New.can_become(Updating));
        assert!(Updating.can_become(Synced));
        assert!(Updating.can_become(Error));
        assert!(Error.can_become(Updating));
        assert!(Synced.can_become(Updating));

        // content never changes without passing through Updating
        assert!(!New.can_become(Synced));
        assert!(!Error.can_become(Synced));
        assert!(!Synced.can_become(New));
        assert!(!Updating.can_become(New));
    }

    #[test]
    fn stale_lock_reads_unlocked() {
        assert!(FileState::Updating.is_pending_update());
        assert!(FileState::Error.is_pending_update());
        assert!(!FileState::New.is_pending_update());
        assert!(!FileState::Synced.is_pending_update());
    }

    #[test]
    fn missing_optional_fields_default() {
        // Payloads written before a field existed still deserialize.
        let raw = r#"{"kind":"file","uuid":"u","domain":"d","path":"a/b","name":"b",
            "coord_path":"/mp/fs/d/a/b","parent_coord_path":"/mp/fs/d/a",
            "create_ts":"2025-06-01T00:00:00Z","update_ts":"2025-06-01T00:00:00Z",
            "state":"new"}"#;
        let inode = Inode::from_bytes(raw.as_bytes()).expect("deserialize");
        let file = inode.as_file().expect("file");
        assert_eq!(file.common.version, 0);
        assert!(file.lock.is_none());
        assert!(file.synced_size.is_none());
        assert!(!file.compressed);
    }
}
