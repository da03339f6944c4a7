//! Unlinking a file does not free its blocks while another handle still has
//! it open (spec.md §8's "free and referenced by none" bitmap invariant).

mod common;

use std::sync::Arc;

use xv6fs_core::device::MemDisk;
use xv6fs_core::{Filesystem, FsError, OpenFlags};

#[test]
fn blocks_are_freed_only_once_the_last_open_handle_drops() {
    let disk: Arc<MemDisk> = Arc::new(MemDisk::new(64));
    common::format(disk.clone(), 64, 30, 10);
    let fs = Filesystem::mount(disk).unwrap();

    // Big enough to need the singly-indirect block, small enough to leave
    // no room for a second file this size on a 64-block image.
    let payload = vec![0x7Au8; 40 * 4096];

    let writer = fs.open(b"/big.bin", OpenFlags::CREATE | OpenFlags::WRONLY).unwrap();
    fs.write(&writer, &payload).unwrap();
    drop(writer);

    let still_open = fs.open(b"/big.bin", OpenFlags::RDONLY).unwrap();
    fs.unlink(b"/big.bin").unwrap();

    // The directory entry is gone, but `still_open` keeps the inode (and
    // its blocks) alive.
    let contender = fs.open(b"/other.bin", OpenFlags::CREATE | OpenFlags::WRONLY).unwrap();
    let err = fs.write(&contender, &payload).unwrap_err();
    assert_eq!(err, FsError::NoSpace);
    fs.unlink(b"/other.bin").unwrap();
    drop(contender);

    // Dropping the last reference to the unlinked file truncates and frees
    // it, making room again.
    drop(still_open);

    let retry = fs.open(b"/other.bin", OpenFlags::CREATE | OpenFlags::WRONLY).unwrap();
    fs.write(&retry, &payload).unwrap();
}
