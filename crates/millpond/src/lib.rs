// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Millpond - a virtual distributed filesystem layer.
//!
//! One logical namespace of files and directories whose authoritative
//! metadata lives in a strongly-consistent coordination namespace
//! ([`coordns`]), while file bytes live in a pluggable [`StorageBackend`].
//! Any number of process instances can mount the same namespace; the
//! coordination service is what lets them agree on structure and locking
//! without talking to each other directly.
//!
//! Set MILLPOND_LOG to control logging (off/info/debug).

/// Inode records: the metadata for one file or directory
pub mod inode;

/// Pure logical-path to coordination-path / backend-path mapping
pub mod path_builder;

/// Inode CRUD and the tree mutation protocol
pub mod store;

/// Domain/container bookkeeping and root bootstrap
pub mod domain;

/// Storage backend trait and the bundled implementations
pub mod backend;

/// Opaque byte-transform seam (compression, encryption)
pub mod transform;

/// The filesystem orchestrator and its writer handle
pub mod filesystem;

/// Asynchronous upload worker pool
pub mod upload;

/// Scratch-directory reaper
pub mod reaper;

/// Per-filesystem background reconciliation
pub mod sync;

/// Named filesystem instances and settings persistence
pub mod registry;

/// Filesystem settings
pub mod config;

/// Post-mutation visitor hooks
pub mod visitor;

// Error types
pub mod error;

// Re-export key types
pub use backend::{BackendResponse, PathInfo, StorageBackend, WriteTarget};
pub use backend::local::LocalBackend;
pub use backend::object::ObjectBackend;
pub use config::{BackendSettings, FileSystemSettings};
pub use domain::{Container, DomainRegistry};
pub use error::{FsError, Result};
pub use filesystem::{FileSystem, FileWriter};
pub use inode::{
    DirectoryInode, EncryptionDescriptor, FileInode, FileInodeLock, FileState, Inode, InodeKind,
};
pub use path_builder::PathBuilder;
pub use registry::FileSystemRegistry;
pub use store::{FileDefaults, InodeStore};
pub use visitor::{MutationOp, MutationOutcome, MutationVisitor};
