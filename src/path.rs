//! Pathname resolution and directory entries (spec.md §4.5
//! "DirectoryAndPath"): splitting a path into elements, walking it through
//! the inode tree one lookup at a time, and following symlinks on the
//! final component.
//!
//! `skip_elem`/`namex`/`namei`/`nameiparent` are grounded on the teacher's
//! `fs.rs` methods of the same name, generalized to take an explicit
//! starting directory instead of reading a process's `cwd` (there is no
//! process table in this crate — spec.md §1 keeps the process/syscall
//! layer out of scope). Symlink following is supplemented from
//! `original_source/kernel/sysfile.c`'s 6.S081 symlink-lab solution, which
//! the teacher and the other four example repos do not implement at all.

use std::sync::Arc;

use crate::bio::BufferCache;
use crate::error::{FsError, FsResult};
use crate::inode::{Inode, InodeTable, InodeType, SbFields};
use crate::param::{DIRSIZ, MAX_SYMLINK_DEPTH};

/// Copy the next path element from `path[cur..]` into `name`. Returns the
/// offset following the copied element, or `None` once the path is
/// exhausted.
///
/// ```text
/// skip_elem("a/bb/c", 0) -> name="a",  next=2
/// skip_elem("///a//bb", 0) -> name="a", next=5
/// skip_elem("", 0) -> None
/// ```
pub fn skip_elem(path: &[u8], mut cur: usize, name: &mut [u8; DIRSIZ]) -> Option<usize> {
    while cur < path.len() && path[cur] == b'/' {
        cur += 1;
    }
    if cur >= path.len() {
        return None;
    }
    let start = cur;
    while cur < path.len() && path[cur] != b'/' {
        cur += 1;
    }
    let len = (cur - start).min(DIRSIZ);
    *name = [0u8; DIRSIZ];
    name[..len].copy_from_slice(&path[start..start + len]);

    while cur < path.len() && path[cur] == b'/' {
        cur += 1;
    }
    Some(cur)
}

pub struct PathContext<'a> {
    pub table: &'a InodeTable,
    pub bcache: &'a Arc<BufferCache>,
    pub sb_fields: &'a SbFields,
    pub dev: u32,
}

/// Walk `path`, starting at `start_inum` (the root, or a caller-supplied
/// working directory). If `want_parent`, stop one component early and
/// return the parent directory plus the final element's name instead of
/// resolving it.
pub fn namex<'a>(
    ctx: &PathContext<'a>,
    start_inum: u32,
    path: &[u8],
    want_parent: bool,
) -> FsResult<(Inode<'a>, [u8; DIRSIZ])> {
    let mut inode = ctx.table.iget(ctx.dev, start_inum);
    let mut name = [0u8; DIRSIZ];
    let mut cur = 0usize;

    loop {
        let next = match skip_elem(path, cur, &mut name) {
            Some(n) => n,
            None => return Ok((inode, name)),
        };

        let mut idata = inode.ilock_with(ctx.sb_fields);
        if idata.kind() != InodeType::Directory {
            return Err(FsError::NotADirectory);
        }

        let at_last_component = skip_elem(path, next, &mut [0u8; DIRSIZ]).is_none();
        if want_parent && at_last_component {
            drop(idata);
            return Ok((inode, name));
        }

        let found = idata.dirlookup(ctx.bcache, ctx.sb_fields, &trim(&name))?;
        drop(idata);
        let (next_inum, _) = found.ok_or(FsError::NotFound)?;
        inode = ctx.table.iget(ctx.dev, next_inum);
        cur = next;
    }
}

fn trim(name: &[u8; DIRSIZ]) -> Vec<u8> {
    let len = name.iter().position(|&b| b == 0).unwrap_or(DIRSIZ);
    name[..len].to_vec()
}

pub fn namei<'a>(ctx: &PathContext<'a>, start_inum: u32, path: &[u8]) -> FsResult<Inode<'a>> {
    namex(ctx, start_inum, path, false).map(|(inode, _)| inode)
}

pub fn nameiparent<'a>(ctx: &PathContext<'a>, start_inum: u32, path: &[u8]) -> FsResult<(Inode<'a>, [u8; DIRSIZ])> {
    namex(ctx, start_inum, path, true)
}

/// Resolve `path`, then follow a chain of symlinks at the final component,
/// capping the chain length so a cycle fails rather than looping forever
/// (spec.md §4.5 "Symlink loop").
pub fn namei_follow<'a>(ctx: &PathContext<'a>, start_inum: u32, path: &[u8]) -> FsResult<Inode<'a>> {
    let mut inode = namei(ctx, start_inum, path)?;
    for _ in 0..MAX_SYMLINK_DEPTH {
        let kind = inode.ilock_with(ctx.sb_fields).kind();
        if kind != InodeType::Symlink {
            return Ok(inode);
        }
        let target = {
            let mut idata = inode.ilock_with(ctx.sb_fields);
            let len = idata.size() as usize;
            let mut buf = vec![0u8; len];
            idata.readi(ctx.bcache, ctx.sb_fields, &mut buf, 0)?;
            buf
        };
        let base = if target.first() == Some(&b'/') { crate::param::ROOTINO } else { start_inum };
        inode = namei(ctx, base, &target)?;
    }
    Err(FsError::SymlinkLoop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_elem_collapses_repeated_slashes() {
        let mut name = [0u8; DIRSIZ];
        let next = skip_elem(b"///a//bb", 0, &mut name).unwrap();
        assert_eq!(next, 5);
        assert_eq!(&name[..1], b"a");
    }

    #[test]
    fn skip_elem_on_empty_path_returns_none() {
        let mut name = [0u8; DIRSIZ];
        assert_eq!(skip_elem(b"", 0, &mut name), None);
        assert_eq!(skip_elem(b"////", 0, &mut name), None);
    }

    #[test]
    fn skip_elem_single_component() {
        let mut name = [0u8; DIRSIZ];
        let next = skip_elem(b"a", 0, &mut name).unwrap();
        assert_eq!(next, 1);
        assert_eq!(&name[..1], b"a");
    }
}
