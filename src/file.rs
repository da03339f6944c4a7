//! An open file handle: an inode reference plus an independent I/O offset
//! (spec.md §6 "File handle"). Grounded on the teacher's `File`/`FileInner`,
//! trimmed to the inode-backed case — pipes, sockets and raw device files
//! are process/syscall-layer concerns this crate's Non-goals exclude
//! (spec.md §1).

use std::sync::Mutex;

use crate::error::{FsError, FsResult};
use crate::inode::{Inode, InodeType};

bitflags::bitflags! {
    pub struct OpenFlags: u32 {
        const RDONLY = 0b000;
        const WRONLY = 0b001;
        const RDWR   = 0b010;
        const CREATE = 0b100;
        const TRUNC  = 0b1000;
    }
}

pub struct File<'a> {
    inode: Inode<'a>,
    readable: bool,
    writable: bool,
    offset: Mutex<usize>,
}

impl<'a> File<'a> {
    pub fn new(inode: Inode<'a>, flags: OpenFlags) -> FsResult<Self> {
        let readable = !flags.contains(OpenFlags::WRONLY);
        let writable = flags.contains(OpenFlags::WRONLY) || flags.contains(OpenFlags::RDWR);
        Ok(Self { inode, readable, writable, offset: Mutex::new(0) })
    }

    pub fn inode(&self) -> &Inode<'a> {
        &self.inode
    }

    pub fn seek(&self, pos: usize) {
        *self.offset.lock().unwrap() = pos;
    }

    pub fn tell(&self) -> usize {
        *self.offset.lock().unwrap()
    }

    pub fn readable(&self) -> bool {
        self.readable
    }

    pub fn writable(&self) -> bool {
        self.writable
    }
}

/// A directory may be opened read-only (xv6's `sys_open` allows this, used
/// by `ls`), but never for writing.
pub fn check_open_type(kind: InodeType, writable: bool) -> FsResult<()> {
    match kind {
        InodeType::Directory if writable => Err(FsError::IsADirectory),
        InodeType::Directory => Ok(()),
        InodeType::Empty => Err(FsError::NotFound),
        _ => Ok(()),
    }
}
