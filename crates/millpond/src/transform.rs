//! Content-level byte transforms (compression, encryption) are external
//! collaborators. The orchestrator only knows this seam: a transform wraps
//! the backend's streams at open time, keyed off the inode's `compressed`
//! flag and encryption descriptor. The default is the identity.

use crate::backend::{BoxedReader, BoxedWriter};
use crate::inode::FileInode;

pub trait ByteTransform: Send + Sync {
    fn wrap_reader(&self, inner: BoxedReader, inode: &FileInode) -> BoxedReader;
    fn wrap_writer(&self, inner: BoxedWriter, inode: &FileInode) -> BoxedWriter;
}

/// Pass-through transform.
pub struct IdentityTransform;

impl ByteTransform for IdentityTransform {
    fn wrap_reader(&self, inner: BoxedReader, _inode: &FileInode) -> BoxedReader {
        inner
    }

    fn wrap_writer(&self, inner: BoxedWriter, _inode: &FileInode) -> BoxedWriter {
        inner
    }
}
