//! In-memory VFS (spec §4.6). This replaces the teacher's on-disk
//! `fs/fs.rs` (a full xv6 SimpleFS: superblock, on-disk inodes, block
//! bitmap, write-ahead log) wholesale — that machinery backs a block
//! device and is explicitly out of this kernel's core (spec §1's "RAM-disk
//! block device and the SimpleFS layout" are named external collaborators,
//! not part of the VFS). What spec §4.6 actually asks for is a static pool
//! of named nodes with parent/child links and path resolution, which is a
//! much smaller structure; grounded on the same "index links into a fixed
//! arena instead of owning references" idiom spec §9 recommends for every
//! pointer-rich structure in this kernel (and used identically for the
//! process table in `proc::mod`).

use crate::config::{MAX_VNODE_CHILDREN, MAXPATH, NVNODE};
use crate::errno::Errno;
use crate::spinlock::Spinlock;

pub type VNodeRef = usize;
const NONE: VNodeRef = usize::MAX;
pub const ROOT: VNodeRef = 0;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum NodeKind {
    Directory,
    File,
    Device(usize),
}

pub struct VNode {
    pub name: [u8; 32],
    pub name_len: usize,
    pub kind: NodeKind,
    pub parent: VNodeRef,
    pub children: [VNodeRef; MAX_VNODE_CHILDREN],
    pub nchildren: usize,
    pub ref_count: u32,
    pub in_use: bool,
}

impl VNode {
    const fn empty() -> Self {
        VNode {
            name: [0; 32],
            name_len: 0,
            kind: NodeKind::Directory,
            parent: NONE,
            children: [NONE; MAX_VNODE_CHILDREN],
            nchildren: 0,
            ref_count: 0,
            in_use: false,
        }
    }

    pub fn name_str(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("")
    }
}

struct Pool {
    nodes: [VNode; NVNODE],
}

static LOCK: Spinlock = Spinlock::new("vfs");
static mut POOL: Pool = Pool {
    nodes: [const { VNode::empty() }; NVNODE],
};

fn set_name(node: &mut VNode, name: &str) {
    let bytes = name.as_bytes();
    let n = bytes.len().min(node.name.len());
    node.name[..n].copy_from_slice(&bytes[..n]);
    node.name_len = n;
}

pub fn init() {
    LOCK.acquire();
    unsafe {
        let root = &mut POOL.nodes[ROOT];
        *root = VNode::empty();
        root.in_use = true;
        root.kind = NodeKind::Directory;
        root.parent = ROOT;
        root.ref_count = 1;
    }
    LOCK.release();

    mkdev("console", 1).expect("mkdev console");
    mkdev("tty", 1).expect("mkdev tty");
    mkdev("null", 2).expect("mkdev null");
    mkdev("ramdisk", 3).expect("mkdev ramdisk");
}

fn mkdev(name: &str, major: usize) -> Result<VNodeRef, Errno> {
    let dev = alloc_child(ROOT, name, NodeKind::Device(major))?;
    Ok(dev)
}

fn alloc_node() -> Result<VNodeRef, Errno> {
    unsafe {
        for (i, n) in POOL.nodes.iter_mut().enumerate() {
            if !n.in_use {
                *n = VNode::empty();
                n.in_use = true;
                return Ok(i);
            }
        }
    }
    Err(Errno::NoSpc)
}

fn alloc_child(parent: VNodeRef, name: &str, kind: NodeKind) -> Result<VNodeRef, Errno> {
    LOCK.acquire();
    let result = (|| {
        if find_child(parent, name).is_some() {
            return Err(Errno::Exist);
        }
        let p = node_mut(parent);
        if p.nchildren >= MAX_VNODE_CHILDREN {
            return Err(Errno::NoSpc);
        }
        let idx = alloc_node()?;
        let child = node_mut(idx);
        set_name(child, name);
        child.kind = kind;
        child.parent = parent;
        child.ref_count = 1;
        let p = node_mut(parent);
        p.children[p.nchildren] = idx;
        p.nchildren += 1;
        Ok(idx)
    })();
    LOCK.release();
    result
}

fn node_mut(idx: VNodeRef) -> &'static mut VNode {
    unsafe { &mut POOL.nodes[idx] }
}

pub fn node(idx: VNodeRef) -> &'static VNode {
    unsafe { &POOL.nodes[idx] }
}

fn find_child(parent: VNodeRef, name: &str) -> Option<VNodeRef> {
    let p = node(parent);
    (0..p.nchildren)
        .map(|i| p.children[i])
        .find(|&c| node(c).name_str() == name)
}

/// Resolve `path` relative to `cwd` (ignored if `path` is absolute).
/// `.` resolves to self; `..` resolves to parent (root at root).
pub fn resolve(path: &str, cwd: VNodeRef) -> Result<VNodeRef, Errno> {
    if path.len() >= MAXPATH {
        return Err(Errno::NameTooLong);
    }
    let mut cur = if path.starts_with('/') { ROOT } else { cwd };
    for comp in path.split('/').filter(|s| !s.is_empty()) {
        cur = match comp {
            "." => cur,
            ".." => node(cur).parent,
            name => find_child(cur, name).ok_or(Errno::NoEnt)?,
        };
    }
    Ok(cur)
}

/// Resolve everything but the final component, returning (parent, leaf
/// name). Used by `openat(O_CREAT)`/`mkdirat`/`unlinkat`.
pub fn resolve_parent<'a>(path: &'a str, cwd: VNodeRef) -> Result<(VNodeRef, &'a str), Errno> {
    let trimmed = path.trim_end_matches('/');
    let (dir, leaf) = match trimmed.rfind('/') {
        Some(i) => (&trimmed[..=i.max(0)], &trimmed[i + 1..]),
        None => ("", trimmed),
    };
    if leaf.is_empty() || leaf == "." || leaf == ".." {
        return Err(Errno::Inval);
    }
    let parent = if dir.is_empty() {
        cwd
    } else {
        resolve(dir, cwd)?
    };
    if node(parent).kind != NodeKind::Directory {
        return Err(Errno::NotDir);
    }
    Ok((parent, leaf))
}

pub fn create_file(parent: VNodeRef, name: &str) -> Result<VNodeRef, Errno> {
    alloc_child(parent, name, NodeKind::File)
}

pub fn create_directory(parent: VNodeRef, name: &str) -> Result<VNodeRef, Errno> {
    alloc_child(parent, name, NodeKind::Directory)
}

/// `0` on success; forbidden on root, devices, non-empty directories, and
/// nodes with more than one reference (spec §4.6).
pub fn unlink(path: &str, cwd: VNodeRef) -> Result<(), Errno> {
    let (parent, leaf) = resolve_parent(path, cwd)?;
    LOCK.acquire();
    let result = (|| {
        let idx = find_child(parent, leaf).ok_or(Errno::NoEnt)?;
        if idx == ROOT {
            return Err(Errno::Busy);
        }
        let n = node(idx);
        if matches!(n.kind, NodeKind::Device(_)) {
            return Err(Errno::Busy);
        }
        if n.kind == NodeKind::Directory && n.nchildren > 0 {
            return Err(Errno::Busy);
        }
        if n.ref_count > 1 {
            return Err(Errno::Busy);
        }
        let p = node_mut(parent);
        let pos = (0..p.nchildren).find(|&i| p.children[i] == idx).unwrap();
        for i in pos..p.nchildren - 1 {
            p.children[i] = p.children[i + 1];
        }
        p.nchildren -= 1;
        node_mut(idx).in_use = false;
        Ok(())
    })();
    LOCK.release();
    result
}

pub fn is_directory(idx: VNodeRef) -> bool {
    node(idx).kind == NodeKind::Directory
}

/// Children of a directory, in creation order (the order `getdents64`
/// walks them in): `(array, count)`, valid entries in `array[..count]`.
pub fn children(dir: VNodeRef) -> ([VNodeRef; MAX_VNODE_CHILDREN], usize) {
    let n = node(dir);
    let mut out = [NONE; MAX_VNODE_CHILDREN];
    out[..n.nchildren].copy_from_slice(&n.children[..n.nchildren]);
    (out, n.nchildren)
}

/// Build the absolute path from root to `node_ref`, writing it (and a
/// trailing NUL) into `buf`. Returns the length excluding the NUL.
pub fn path_of(node_ref: VNodeRef, buf: &mut [u8]) -> Result<usize, Errno> {
    let mut components: [VNodeRef; 32] = [NONE; 32];
    let mut n = 0;
    let mut cur = node_ref;
    while cur != ROOT {
        if n >= components.len() {
            return Err(Errno::NameTooLong);
        }
        components[n] = cur;
        n += 1;
        cur = node(cur).parent;
    }

    if n == 0 {
        if buf.is_empty() {
            return Err(Errno::NameTooLong);
        }
        buf[0] = b'/';
        buf[1] = 0;
        return Ok(1);
    }

    let mut off = 0;
    for &c in components[..n].iter().rev() {
        let name = node(c).name_str().as_bytes();
        if off + 1 + name.len() >= buf.len() {
            return Err(Errno::NameTooLong);
        }
        buf[off] = b'/';
        off += 1;
        buf[off..off + name.len()].copy_from_slice(name);
        off += name.len();
    }
    buf[off] = 0;
    Ok(off)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_absolute_and_relative_and_dotdot() {
        init();
        let d = create_directory(ROOT, "d").unwrap();
        let f = create_file(d, "a.txt").unwrap();
        assert_eq!(resolve("/d/a.txt", ROOT).unwrap(), f);
        assert_eq!(resolve("a.txt", d).unwrap(), f);
        assert_eq!(resolve("../d/a.txt", d).unwrap(), f);
        assert_eq!(resolve(".", d).unwrap(), d);
        assert!(resolve("/nope", ROOT).is_err());
    }

    #[test]
    fn unlink_rejects_root_and_nonempty_dir_and_busy_refs() {
        init();
        assert_eq!(unlink("/", ROOT).unwrap_err(), Errno::Busy);
        let d = create_directory(ROOT, "d2").unwrap();
        create_file(d, "x").unwrap();
        assert_eq!(unlink("/d2", ROOT).unwrap_err(), Errno::Busy);
    }

    #[test]
    fn create_file_rejects_duplicate_name() {
        init();
        create_file(ROOT, "dup.txt").unwrap();
        assert_eq!(
            create_file(ROOT, "dup.txt").unwrap_err(),
            Errno::Exist
        );
    }
}
