//! The out-of-scope physical block device driver (spec.md §1), represented
//! here only by the trait it would implement: synchronous, whole-block
//! reads and writes (spec.md §6: `disk_rw(buf, write?)`).
//!
//! `MemDisk` and `FileDisk` are not part of the core's invariants; they
//! exist so the rest of the crate is testable without a real device.
//! `FileDisk` is grounded on `mkfs/src/main.rs`'s `FSImage::rsect`/`wsect`
//! (`Seek` + `Read`/`Write` over a `std::fs::File`).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::param::BSIZE;

/// Synchronous block I/O, the interface `BufferCache` drives on a cache
/// miss or a `bwrite`.
pub trait BlockDevice: Send + Sync {
    fn read_block(&self, blockno: u32, buf: &mut [u8; BSIZE]);
    fn write_block(&self, blockno: u32, buf: &[u8; BSIZE]);
}

/// In-memory block device, for unit and integration tests.
pub struct MemDisk {
    blocks: std::sync::Mutex<Vec<[u8; BSIZE]>>,
}

impl MemDisk {
    pub fn new(nblocks: usize) -> Self {
        Self {
            blocks: std::sync::Mutex::new(vec![[0u8; BSIZE]; nblocks]),
        }
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, blockno: u32, buf: &mut [u8; BSIZE]) {
        let blocks = self.blocks.lock().unwrap();
        buf.copy_from_slice(&blocks[blockno as usize]);
    }

    fn write_block(&self, blockno: u32, buf: &[u8; BSIZE]) {
        let mut blocks = self.blocks.lock().unwrap();
        blocks[blockno as usize] = *buf;
    }
}

/// File-backed block device: a real `fs.img` on the host filesystem, used
/// by the `mkfs` binary and by crash-recovery tests that close and reopen
/// the image between a simulated crash and recovery.
pub struct FileDisk {
    file: std::sync::Mutex<File>,
}

impl FileDisk {
    pub fn open(file: File) -> Self {
        Self {
            file: std::sync::Mutex::new(file),
        }
    }
}

impl BlockDevice for FileDisk {
    fn read_block(&self, blockno: u32, buf: &mut [u8; BSIZE]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(blockno as u64 * BSIZE as u64))
            .expect("FileDisk: seek for read");
        file.read_exact(buf).expect("FileDisk: read_block");
    }

    fn write_block(&self, blockno: u32, buf: &[u8; BSIZE]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(blockno as u64 * BSIZE as u64))
            .expect("FileDisk: seek for write");
        file.write_all(buf).expect("FileDisk: write_block");
    }
}
