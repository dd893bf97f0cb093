//! Physical frame allocator (spec §4.1). The teacher's `kalloc.rs` was an
//! intrusive freelist (`Run { next: *mut Run }` threaded through freed
//! pages); spec normatively requires a bitmap with first-fit scan instead,
//! so this module is a rewrite, not a port. The bitmap/alloc-tracker idiom
//! itself is grounded on `examples/RustFlyer-OS/lib/mm/src/frame.rs`, which
//! wraps a `bitmap_allocator::BitAlloc` behind a spinlock and an
//! `offset: usize` that converts bit-index <-> physical frame number; we
//! keep that shape but use this repo's own `Spinlock` rather than
//! RustFlyer's `SpinNoIrqLock`, since every other lock in this kernel is
//! that type.

use bitmap_allocator::{BitAlloc, BitAlloc64K};

use crate::errno::Errno;
use crate::memlayout::{KERNBASE, PHYSTOP};
use crate::riscv::PGSIZE;
use crate::spinlock::Spinlock;
use crate::string::memset;
use crate::PGROUNDUP;

extern "C" {
    /// First free physical address after the kernel image; provided by
    /// `linker.ld`.
    static end: u8;
}

struct FrameBitmap {
    bitmap: BitAlloc64K,
    /// Physical frame number of bit 0.
    base_pfn: usize,
    total: usize,
}

static FRAME_ALLOC: Spinlock = Spinlock::new("frame");
static mut BITMAP: Option<FrameBitmap> = None;

fn pfn(addr: usize) -> usize {
    addr / PGSIZE
}

/// Set up the bitmap over `[first_free, PHYSTOP)`, marking every frame
/// occupied by the kernel image, by OpenSBI's own reservation (implicitly
/// excluded since `first_free` starts after it), and by MMIO (never part of
/// the RAM range in the first place) as already in use by construction —
/// only frames in the scanned range are ever marked free.
pub fn init() {
    FRAME_ALLOC.acquire();
    unsafe {
        let first_free = PGROUNDUP!((&end as *const u8) as usize);
        let base = pfn(first_free);
        let top = pfn(PHYSTOP);
        let total = top - base;

        let mut bitmap = BitAlloc64K::DEFAULT;
        bitmap.insert(0..total);

        BITMAP = Some(FrameBitmap {
            bitmap,
            base_pfn: base,
            total,
        });
    }
    FRAME_ALLOC.release();
    log::info!(
        "frame allocator: {} frames ({} KiB) available from {:#x}",
        unsafe { BITMAP.as_ref().unwrap().total },
        unsafe { BITMAP.as_ref().unwrap().total } * PGSIZE / 1024,
        KERNBASE
    );
}

/// Allocate one 4 KiB physical frame. Contents are unspecified.
pub fn alloc() -> Result<usize, Errno> {
    FRAME_ALLOC.acquire();
    let result = unsafe {
        let bm = BITMAP.as_mut().expect("frame allocator not initialized");
        bm.bitmap.alloc().map(|bit| (bm.base_pfn + bit) * PGSIZE)
    };
    FRAME_ALLOC.release();
    result.ok_or(Errno::NoMem)
}

/// `alloc()` plus a full-frame zero-write; required for every page-table
/// frame (spec: "this must be used for every page-table frame").
pub fn alloc_zeroed() -> Result<usize, Errno> {
    let pa = alloc()?;
    memset(pa as *mut u8, 0, PGSIZE);
    Ok(pa)
}

/// Release a previously allocated frame. Double-free and freeing an
/// address outside the managed range are programmer errors, not
/// recoverable conditions (spec §7's first bucket) — both panic.
pub fn free(pa: usize) {
    if pa % PGSIZE != 0 {
        panic!("frame::free: unaligned address {:#x}", pa);
    }
    FRAME_ALLOC.acquire();
    unsafe {
        let bm = BITMAP.as_mut().expect("frame allocator not initialized");
        let bit = pfn(pa)
            .checked_sub(bm.base_pfn)
            .filter(|&b| b < bm.total)
            .unwrap_or_else(|| panic!("frame::free: {:#x} outside managed range", pa));
        if !bm.bitmap.dealloc(bit) {
            panic!("frame::free: double free of {:#x}", pa);
        }
    }
    FRAME_ALLOC.release();
}
