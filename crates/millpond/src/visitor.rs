// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Post-mutation hooks for audit trails and external indexers.
//!
//! The visitor list is fixed when a filesystem is constructed and never
//! mutated afterwards. Visitors run synchronously after each structural
//! mutation, before the operation returns to the caller; a failing visitor
//! is reported and isolated, it never rolls back the mutation.

use crate::error::FsError;
use crate::inode::Inode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Completed,
    Error,
}

pub type VisitorResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub trait MutationVisitor: Send + Sync {
    fn visit(
        &self,
        op: MutationOp,
        outcome: MutationOutcome,
        inode: &Inode,
        error: Option<&FsError>,
    ) -> VisitorResult;
}
