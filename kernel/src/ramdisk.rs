//! RAM-disk block store backing `/dev/ramdisk` (spec §1 names the device
//! and the `SimpleFS` layout it carries as an external collaborator; the
//! VFS/file layer only needs the block-oriented `read`/`write` interface
//! spec §4.6 describes, not the filesystem that might sit on top of it).
//! The teacher's `virtio/*` and `bio.rs`/`buf.rs` talk to a real virtio-blk
//! device and a buffer cache with write-back; this kernel's ramdisk is
//! simply backing memory, so that whole layer collapses to one flat array.
//!
//! The `SimpleFS` command protocol spec §4.6 mentions for `mkinitrd` is
//! explicitly called a "compatibility shim, not a core behaviour" and left
//! to the port; it isn't implemented here.

use crate::config::{RAMDISK_BLOCKS, RAMDISK_BLOCK_SIZE};
use crate::errno::Errno;
use crate::spinlock::Spinlock;

const SIZE: usize = RAMDISK_BLOCKS * RAMDISK_BLOCK_SIZE;

static LOCK: Spinlock = Spinlock::new("ramdisk");
static mut DISK: [u8; SIZE] = [0; SIZE];

/// Read starting at byte `offset`; reads past the end are truncated to 0
/// bytes (EOF), never an error.
pub fn read(offset: usize, buf: &mut [u8]) -> Result<usize, Errno> {
    LOCK.acquire();
    let n = unsafe {
        if offset >= SIZE {
            0
        } else {
            let n = buf.len().min(SIZE - offset);
            buf[..n].copy_from_slice(&DISK[offset..offset + n]);
            n
        }
    };
    LOCK.release();
    Ok(n)
}

/// Write starting at byte `offset`; writing past the end returns `ENOSPC`
/// once no bytes at all fit (matches spec's "out-of-range positions ...
/// ENOSPC for writes").
pub fn write(offset: usize, buf: &[u8]) -> Result<usize, Errno> {
    if offset >= SIZE {
        return Err(Errno::NoSpc);
    }
    LOCK.acquire();
    let n = unsafe {
        let n = buf.len().min(SIZE - offset);
        DISK[offset..offset + n].copy_from_slice(&buf[..n]);
        n
    };
    LOCK.release();
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back() {
        write(0, b"hello").unwrap();
        let mut buf = [0u8; 5];
        let n = read(0, &mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_past_end_is_eof_not_error() {
        let mut buf = [0u8; 4];
        let n = read(SIZE, &mut buf).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn write_past_end_is_enospc() {
        assert_eq!(write(SIZE, b"x").unwrap_err(), Errno::NoSpc);
    }
}
