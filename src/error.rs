//! Recoverable filesystem errors (spec.md §7). Fatal invariant violations
//! (freeing an already-free block, locking an inode with `ref < 1`, ...)
//! are never represented here — they `panic!`, matching spec.md §7's
//! propagation policy that fatal failures are never caught.
//!
//! No error crate appears in the teacher (it is `no_std` and panic-driven
//! throughout), so this is grounded on the rest of the retrieval pack:
//! `other_examples/gifnksm-ov6` depends on `thiserror` workspace-wide, and
//! `other_examples/KINGFIOX-hitsz-ext2-fuse` structures a host-hosted
//! filesystem's errors the same way.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("name too long")]
    NameTooLong,

    #[error("offset beyond end of file")]
    OffsetTooLarge,

    #[error("file too large")]
    FileTooLarge,

    #[error("no free inodes")]
    NoFreeInodes,

    #[error("no space left on device")]
    NoSpace,

    #[error("cross-device link")]
    CrossDevice,

    #[error("too many levels of symbolic links")]
    SymlinkLoop,

    #[error("file already exists")]
    AlreadyExists,

    #[error("read-only file handle")]
    ReadOnly,

    #[error("directory not empty")]
    NotEmpty,
}

pub type FsResult<T> = Result<T, FsError>;
