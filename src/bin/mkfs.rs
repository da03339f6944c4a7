//! Host-side tool that lays down a fresh filesystem image: write the
//! superblock, zero the log region, mark the boot/superblock/log/inode/
//! bitmap blocks in-use, and create the root directory.
//!
//! Grounded on the teacher's `mkfs/src/main.rs`, which does the same thing
//! by writing raw bytes through `FSImage::rsect`/`wsect` since it has no
//! kernel underneath it to go through. This version instead drives the
//! crate's own `BufferCache`/`Transaction`/`InodeTable` directly — the
//! host tool and the mounted filesystem share one code path for "how a
//! root directory gets its `.`/`..` entries", rather than the teacher's
//! two independent implementations (one for `mkfs`, one for `sysfile.c`'s
//! `create`).

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use xv6fs_core::balloc;
use xv6fs_core::bio::BufferCache;
use xv6fs_core::device::FileDisk;
use xv6fs_core::inode::{InodeTable, InodeType, SbFields};
use xv6fs_core::param::{BSIZE, ROOTDEV, ROOTINO};
use xv6fs_core::superblock::SuperBlock;
use xv6fs_core::wal::Log;
use xv6fs_core::FsConfig;

fn main() {
    env_logger::init();
    let mut args = std::env::args().skip(1);
    let image_path = PathBuf::from(args.next().unwrap_or_else(|| {
        eprintln!("usage: mkfs <image-path> [nblocks]");
        std::process::exit(2);
    }));
    let mut config = FsConfig::default();
    if let Some(nblocks) = args.next().and_then(|s| s.parse().ok()) {
        config.nblocks = nblocks;
    }

    if let Err(e) = format(&image_path, &config) {
        eprintln!("mkfs: {e}");
        std::process::exit(1);
    }
    log::info!("wrote {} blocks to {}", config.nblocks, image_path.display());
}

fn format(image_path: &PathBuf, config: &FsConfig) -> std::io::Result<()> {
    let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(image_path)?;
    file.set_len(config.nblocks as u64 * BSIZE as u64)?;

    let disk = Arc::new(FileDisk::open(file));
    let bcache = Arc::new(BufferCache::new(disk));

    let sb = SuperBlock::format_with(config);
    sb.write(&bcache, ROOTDEV);

    let log = Arc::new(Log::open(bcache.clone(), ROOTDEV, &sb));
    mark_metadata_blocks_in_use(&log, &bcache, &sb);

    let sb_fields = SbFields::new(sb);
    let table = InodeTable::new(bcache.clone(), log.clone(), sb_fields);

    let tx = log.begin_op();
    let root = table.ialloc(&tx, &sb_fields, ROOTDEV, InodeType::Directory).unwrap();
    assert_eq!(root.inum, ROOTINO, "root directory must be the first inode allocated");
    let mut idata = root.ilock_with(&sb_fields);
    idata.set_links(0, 0, 1);
    idata.dirlink(&tx, &bcache, &sb_fields, b".", ROOTINO).unwrap();
    idata.dirlink(&tx, &bcache, &sb_fields, b"..", ROOTINO).unwrap();
    idata.iupdate(&tx, &bcache, &sb_fields);
    drop(idata);
    drop(root);
    drop(tx);

    Ok(())
}

/// The boot sector, superblock, log region, inode blocks and bitmap blocks
/// themselves occupy space the allocator must never hand out; `mkfs` marks
/// them used up front by setting their bitmap bits directly, the same way
/// the teacher's `mkfs` does before it ever calls its own `balloc` —
/// routing this through `balloc::alloc` would zero the superblock and
/// log/inode blocks it's meant to protect instead of leaving them intact.
fn mark_metadata_blocks_in_use(log: &Arc<Log>, bcache: &Arc<BufferCache>, sb: &SuperBlock) {
    let first_data_block = sb.bmapstart + sb.nbitmap_blocks();
    let tx = log.begin_op();
    balloc::mark_range_in_use(&tx, bcache, sb, ROOTDEV, first_data_block);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn format_produces_a_mountable_image_with_a_root_directory() {
        let tmp = NamedTempFile::new().unwrap();
        let config = FsConfig { nblocks: 512, ..FsConfig::default() };
        format(&tmp.path().to_path_buf(), &config).unwrap();

        let file = OpenOptions::new().read(true).write(true).open(tmp.path()).unwrap();
        let disk = Arc::new(FileDisk::open(file));
        let fs = xv6fs_core::Filesystem::mount(disk).unwrap();
        let file = fs.open(b"/.", xv6fs_core::OpenFlags::RDONLY).unwrap();
        let st = fs.stat(&file).unwrap();
        assert_eq!(st.kind, InodeType::Directory);
    }
}
