use std::sync::Arc;

use xv6fs_core::balloc;
use xv6fs_core::bio::BufferCache;
use xv6fs_core::device::BlockDevice;
use xv6fs_core::inode::{InodeTable, InodeType, SbFields};
use xv6fs_core::param::ROOTDEV;
use xv6fs_core::param::ROOTINO;
use xv6fs_core::superblock::SuperBlock;
use xv6fs_core::wal::Log;
use xv6fs_core::Filesystem;

/// Lay down a fresh, mountable image on `disk` without going through the
/// `mkfs` binary (tests only link the library crate).
pub fn format(disk: Arc<dyn BlockDevice>, nblocks: u32, ninodes: u32, nlog: u32) {
    let bcache = Arc::new(BufferCache::new(disk));
    let sb = SuperBlock::format(nblocks, nblocks, ninodes, nlog);
    sb.write(&bcache, ROOTDEV);

    let log = Arc::new(Log::open(bcache.clone(), ROOTDEV, &sb));
    let first_data_block = sb.bmapstart + sb.nbitmap_blocks();
    {
        let tx = log.begin_op();
        balloc::mark_range_in_use(&tx, &bcache, &sb, ROOTDEV, first_data_block);
    }

    let sb_fields = SbFields::new(sb);
    let table = InodeTable::new(bcache.clone(), log.clone(), sb_fields);
    let tx = log.begin_op();
    let root = table.ialloc(&tx, &sb_fields, ROOTDEV, InodeType::Directory).unwrap();
    assert_eq!(root.inum, ROOTINO);
    let mut idata = root.ilock_with(&sb_fields);
    idata.set_links(0, 0, 1);
    idata.dirlink(&tx, &bcache, &sb_fields, b".", ROOTINO).unwrap();
    idata.dirlink(&tx, &bcache, &sb_fields, b"..", ROOTINO).unwrap();
    idata.iupdate(&tx, &bcache, &sb_fields);
}

pub fn mount(disk: Arc<dyn BlockDevice>) -> Filesystem {
    Filesystem::mount(disk).expect("mount a freshly formatted image")
}
