//! Open file descriptions and the per-process descriptor table (spec §4.6,
//! §9's "prefer a trait object or an enum dispatching over file types").
//! The teacher's `file/file.rs` dispatched over an on-disk inode type that
//! doesn't exist here (`FD_INODE` backed by `fs::Inode`) plus `FD_PIPE` and
//! `FD_DEVICE`; this is a fresh sum type over the four kinds spec §4.6
//! actually lists — console, null, in-memory regular file, directory — with
//! `Device` left as the fifth for `/dev/ramdisk` and `/dev/tty`. An enum
//! was chosen over a trait object per spec §9: every variant is plain data,
//! there's no need for a vtable, and `match` keeps dispatch bodies in one
//! place for review.

use crate::config::{MEMFILE_CAPACITY, NFILE, NOFILE};
use crate::errno::Errno;
use crate::vfs::{self, VNodeRef};

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl OpenMode {
    pub fn readable(self) -> bool {
        self != OpenMode::WriteOnly
    }
    pub fn writable(self) -> bool {
        self != OpenMode::ReadOnly
    }
}

pub struct MemFile {
    pub data: [u8; MEMFILE_CAPACITY],
    pub len: usize,
}

impl MemFile {
    const fn empty() -> Self {
        MemFile {
            data: [0; MEMFILE_CAPACITY],
            len: 0,
        }
    }
}

pub enum FileKind {
    Console,
    Null,
    Memory(VNodeRef),
    Directory(VNodeRef),
    Ramdisk,
}

pub struct OpenFile {
    pub kind: FileKind,
    pub mode: OpenMode,
    pub offset: usize,
    pub refcount: u32,
    pub in_use: bool,
}

impl OpenFile {
    const fn empty() -> Self {
        OpenFile {
            kind: FileKind::Null,
            mode: OpenMode::ReadOnly,
            offset: 0,
            refcount: 0,
            in_use: false,
        }
    }
}

/// Backing store for every `Memory` file, indexed by `VNodeRef` (spec's
/// VNode is a name/structure node; its bytes live here so multiple open
/// descriptions of the same file share one buffer, like a real inode).
static mut MEMFILES: [MemFile; crate::config::NVNODE] =
    [const { MemFile::empty() }; crate::config::NVNODE];

static mut OPEN_FILES: [OpenFile; NFILE] = [const { OpenFile::empty() }; NFILE];
static FILE_TABLE_LOCK: crate::spinlock::Spinlock = crate::spinlock::Spinlock::new("filetable");

pub type FileRef = usize;

/// Allocate a system-wide open file description. Caller fills in
/// kind/mode/offset.
fn alloc_open_file(kind: FileKind, mode: OpenMode) -> Result<FileRef, Errno> {
    FILE_TABLE_LOCK.acquire();
    let result = unsafe {
        OPEN_FILES.iter_mut().enumerate().find(|(_, f)| !f.in_use).map(|(i, f)| {
            f.in_use = true;
            f.kind = kind;
            f.mode = mode;
            f.offset = 0;
            f.refcount = 1;
            i
        })
    };
    FILE_TABLE_LOCK.release();
    result.ok_or(Errno::NFile)
}

pub fn dup_open_file(fr: FileRef) {
    FILE_TABLE_LOCK.acquire();
    unsafe { OPEN_FILES[fr].refcount += 1 };
    FILE_TABLE_LOCK.release();
}

pub fn close_open_file(fr: FileRef) {
    FILE_TABLE_LOCK.acquire();
    unsafe {
        let f = &mut OPEN_FILES[fr];
        f.refcount -= 1;
        if f.refcount == 0 {
            f.in_use = false;
        }
    }
    FILE_TABLE_LOCK.release();
}

fn open_file(fr: FileRef) -> &'static mut OpenFile {
    unsafe { &mut OPEN_FILES[fr] }
}

fn memfile(v: VNodeRef) -> &'static mut MemFile {
    unsafe { &mut MEMFILES[v] }
}

/// Open (or create) `path` relative to `cwd`, returning a fresh system-wide
/// file description. `create` mirrors `O_CREAT`.
pub fn open(path: &str, cwd: VNodeRef, mode: OpenMode, create: bool) -> Result<FileRef, Errno> {
    let vnode = match vfs::resolve(path, cwd) {
        Ok(v) => v,
        Err(Errno::NoEnt) if create => {
            let (parent, leaf) = vfs::resolve_parent(path, cwd)?;
            vfs::create_file(parent, leaf)?
        }
        Err(e) => return Err(e),
    };

    let kind = match vfs::node(vnode).kind {
        vfs::NodeKind::Directory => FileKind::Directory(vnode),
        vfs::NodeKind::File => FileKind::Memory(vnode),
        vfs::NodeKind::Device(1) => FileKind::Console,
        vfs::NodeKind::Device(2) => FileKind::Null,
        vfs::NodeKind::Device(_) => FileKind::Ramdisk,
    };
    if matches!(kind, FileKind::Directory(_)) && mode.writable() {
        return Err(Errno::IsDir);
    }
    alloc_open_file(kind, mode)
}

pub fn read(fr: FileRef, buf: &mut [u8]) -> Result<usize, Errno> {
    let f = open_file(fr);
    if !f.mode.readable() {
        return Err(Errno::BadF);
    }
    match f.kind {
        FileKind::Console => crate::console::read(buf),
        FileKind::Null => Ok(0),
        FileKind::Ramdisk => crate::ramdisk::read(f.offset, buf).map(|n| {
            f.offset += n;
            n
        }),
        FileKind::Memory(v) => {
            let mf = memfile(v);
            let start = f.offset.min(mf.len);
            let n = buf.len().min(mf.len - start);
            buf[..n].copy_from_slice(&mf.data[start..start + n]);
            f.offset += n;
            Ok(n)
        }
        FileKind::Directory(_) => Err(Errno::IsDir),
    }
}

pub fn write(fr: FileRef, buf: &[u8]) -> Result<usize, Errno> {
    let f = open_file(fr);
    if !f.mode.writable() {
        return Err(Errno::BadF);
    }
    match f.kind {
        FileKind::Console => crate::console::write(buf),
        FileKind::Null => Ok(buf.len()),
        FileKind::Ramdisk => crate::ramdisk::write(f.offset, buf).map(|n| {
            f.offset += n;
            n
        }),
        FileKind::Memory(v) => {
            let mf = memfile(v);
            let start = f.offset;
            if start >= mf.data.len() {
                return Err(Errno::NoSpc);
            }
            let n = buf.len().min(mf.data.len() - start);
            mf.data[start..start + n].copy_from_slice(&buf[..n]);
            mf.len = mf.len.max(start + n);
            f.offset += n;
            Ok(n)
        }
        FileKind::Directory(_) => Err(Errno::IsDir),
    }
}

/// `lseek`: `whence` follows the usual `SEEK_SET=0, SEEK_CUR=1, SEEK_END=2`.
pub fn seek(fr: FileRef, off: i64, whence: i32) -> Result<usize, Errno> {
    let f = open_file(fr);
    let base = match whence {
        0 => 0i64,
        1 => f.offset as i64,
        2 => match f.kind {
            FileKind::Memory(v) => memfile(v).len as i64,
            FileKind::Ramdisk => crate::config::RAMDISK_BLOCKS as i64 * crate::config::RAMDISK_BLOCK_SIZE as i64,
            _ => return Err(Errno::SPipe),
        },
        _ => return Err(Errno::Inval),
    };
    let new_off = base + off;
    if new_off < 0 {
        return Err(Errno::Inval);
    }
    f.offset = new_off as usize;
    Ok(f.offset)
}

/// The `VNode` an open file description is backed by, if any (devices and
/// `Null` have none).
pub fn vnode_of(fr: FileRef) -> Option<VNodeRef> {
    match open_file(fr).kind {
        FileKind::Memory(v) | FileKind::Directory(v) => Some(v),
        _ => None,
    }
}

pub fn file_size(vnode: VNodeRef) -> usize {
    memfile(vnode).len
}

/// A live descriptor: the system-wide open-file description it names, and
/// its own close-on-exec bit. `FD_CLOEXEC` is a per-descriptor property in
/// POSIX, not a per-open-file-description one, so it lives here rather
/// than on `OpenFile` — two fds `dup`'d from the same open file must be
/// able to carry independent cloexec bits.
#[derive(Clone, Copy)]
struct FdEntry {
    file: FileRef,
    cloexec: bool,
}

pub struct FdTable {
    entries: [Option<FdEntry>; NOFILE],
}

impl FdTable {
    pub const fn new() -> Self {
        FdTable {
            entries: [None; NOFILE],
        }
    }

    pub fn alloc(&mut self, fr: FileRef) -> Result<i32, Errno> {
        self.alloc_with_flags(fr, false)
    }

    pub fn alloc_with_flags(&mut self, fr: FileRef, cloexec: bool) -> Result<i32, Errno> {
        for (i, e) in self.entries.iter_mut().enumerate() {
            if e.is_none() {
                *e = Some(FdEntry { file: fr, cloexec });
                return Ok(i as i32);
            }
        }
        Err(Errno::MFile)
    }

    pub fn get(&self, fd: i32) -> Result<FileRef, Errno> {
        if fd < 0 || fd as usize >= NOFILE {
            return Err(Errno::BadF);
        }
        self.entries[fd as usize].map(|e| e.file).ok_or(Errno::BadF)
    }

    pub fn close(&mut self, fd: i32) -> Result<(), Errno> {
        let fr = self.get(fd)?;
        self.entries[fd as usize] = None;
        close_open_file(fr);
        Ok(())
    }

    /// `dup3`/fork-time inheritance: duplicate every live descriptor
    /// (cloexec bit included) into a fresh table, bumping refcounts rather
    /// than reopening.
    pub fn clone_into(&self, dst: &mut FdTable) {
        for (i, e) in self.entries.iter().enumerate() {
            if let Some(entry) = e {
                dup_open_file(entry.file);
                dst.entries[i] = Some(*entry);
            }
        }
    }

    pub fn dup(&mut self, fd: i32) -> Result<i32, Errno> {
        let fr = self.get(fd)?;
        dup_open_file(fr);
        self.alloc(fr)
    }

    pub fn dup_to(&mut self, fd: i32, newfd: i32) -> Result<i32, Errno> {
        if newfd < 0 || newfd as usize >= NOFILE {
            return Err(Errno::BadF);
        }
        let fr = self.get(fd)?;
        if let Some(old) = self.entries[newfd as usize].take() {
            close_open_file(old.file);
        }
        dup_open_file(fr);
        self.entries[newfd as usize] = Some(FdEntry { file: fr, cloexec: false });
        Ok(newfd)
    }

    /// Close every descriptor flagged `O_CLOEXEC`. Called once at the top
    /// of `execve`, before the old address space is torn down.
    pub fn close_on_exec(&mut self) {
        for e in self.entries.iter_mut() {
            let close = matches!(*e, Some(entry) if entry.cloexec);
            if close {
                close_open_file(e.take().unwrap().file);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fd_table_alloc_reuses_closed_slots() {
        let mut t = FdTable::new();
        vfs::init();
        let fr = open("/console", vfs::ROOT, OpenMode::ReadWrite, false).unwrap();
        let a = t.alloc(fr).unwrap();
        assert_eq!(a, 0);
        t.close(a).unwrap();
        let fr2 = open("/console", vfs::ROOT, OpenMode::ReadWrite, false).unwrap();
        let b = t.alloc(fr2).unwrap();
        assert_eq!(b, 0);
    }
}
