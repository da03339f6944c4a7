//! Buffer cache, write-ahead log, inode layer and path resolution for a
//! teaching-grade crash-consistent filesystem, in the structure of
//! `kazukousen-xv6rs`'s kernel filesystem stack but hosted on top of
//! `std` rather than bare metal: no scheduler, no interrupt controller,
//! no page tables. A caller supplies a `BlockDevice` and gets back a
//! `Filesystem` that can create, read, write, link and unlink files.

pub mod balloc;
pub mod bio;
pub mod device;
pub mod error;
pub mod file;
pub mod fs;
pub mod inode;
pub mod param;
pub mod path;
pub mod sleeplock;
pub mod spinlock;
pub mod stat;
pub mod superblock;
pub mod wal;

pub use error::{FsError, FsResult};
pub use file::{File, OpenFlags};
pub use fs::Filesystem;
pub use inode::InodeType;
pub use stat::FileStat;
pub use superblock::FsConfig;
