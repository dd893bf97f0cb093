//! Sv39 page-table manager (spec §4.2). Rewritten from the teacher's
//! `vm.rs`: the walk/map structure and the trampoline/kernel-stack mapping
//! sequence are kept, but three things changed —
//!
//! 1. the frame source is `crate::frame` (bitmap) instead of `crate::kalloc`
//!    (freelist);
//! 2. every PTE validity/leaf test goes through `Pte::valid()`/`is_leaf()`
//!    instead of ad hoc bitmask comparisons. The teacher's `mappages` and
//!    `uvmunmap` used `pte.0 & PTE_V == 1`, which is only true when the
//!    *entire* low word of the PTE happens to equal 1, not whenever the V
//!    bit is set — and `uvmunmap`'s leaf check additionally had its sense
//!    inverted (it panicked on *valid leaf* PTEs instead of on invalid or
//!    non-leaf ones). `walk()` three lines below it already used the
//!    correct `pte.0 & PTE_V == PTE_V` form. This is the bug SPEC_FULL.md's
//!    Open Question #1 resolution names as the probable source of
//!    "recurring page-table corruption at a specific L2 PTE": a remap whose
//!    low word wasn't exactly 1 would pass the remap check it should have
//!    failed, and an unmap of a genuinely valid leaf would spuriously
//!    panic. Consolidating on one predicate removes the class of bug.
//! 3. `install_kernel_globals`/`clone_user_space` are new, implementing
//!    spec's resolution to Open Question #1: every user table gets the
//!    kernel subtree installed by literally re-running the same mapping
//!    walk against its own root, not by aliasing or cloning the kernel
//!    root pointer.

use crate::errno::Errno;
use crate::frame;
use crate::memlayout::{KERNBASE, PHYSTOP, TRAMPOLINE};
use crate::riscv::{
    sfence_vma, w_satp, PageTable, Pte, MAXVA, PGSIZE, PTE_G, PTE_R, PTE_U, PTE_V, PTE_W, PTE_X,
};
use crate::string::memmove;
use crate::{MAKE_SATP, PA2PTE, PGROUNDDOWN, PGROUNDUP, PX};

static mut KERNEL_PAGETABLE: Option<*mut PageTable> = None;

extern "C" {
    static etext: u8;
    static trampoline: u8;
}

fn empty_pagetable() -> Result<*mut PageTable, Errno> {
    let pa = frame::alloc_zeroed()?;
    Ok(pa as *mut PageTable)
}

/// Populate the mappings every address space must share: the kernel text
/// (R|X), kernel data + free RAM (R|W), and the trampoline page (R|X) at
/// the top of the space. No UART/CLINT/PLIC MMIO mapping is needed — all
/// console and timer access goes through SBI ecalls (see `sbi.rs`), so the
/// kernel never loads or stores through those physical addresses directly.
/// Called once for the kernel's own root and again, verbatim, for every new
/// user root — see the module doc for why that (rather than sharing or
/// cloning the kernel root) is how kernel globals end up present
/// everywhere.
pub fn install_kernel_globals(pt: &mut PageTable) -> Result<(), Errno> {
    let etext_addr = unsafe { &etext as *const u8 as usize };
    let trampoline_addr = unsafe { &trampoline as *const u8 as usize };

    kvmmap(pt, KERNBASE, KERNBASE, etext_addr - KERNBASE, PTE_R | PTE_X)?;
    kvmmap(
        pt,
        etext_addr,
        etext_addr,
        PHYSTOP - etext_addr,
        PTE_R | PTE_W,
    )?;
    kvmmap(pt, TRAMPOLINE, trampoline_addr, PGSIZE, PTE_R | PTE_X)?;
    Ok(())
}

fn kvmmap(pt: &mut PageTable, va: usize, pa: usize, sz: usize, perm: usize) -> Result<(), Errno> {
    mappages(pt, va, pa, sz, perm | PTE_G)
}

/// Build and install the kernel's own direct-map page table, then turn on
/// paging for this hart.
pub fn kvminit() -> Result<(), Errno> {
    let pt = empty_pagetable()?;
    unsafe {
        install_kernel_globals(&mut *pt)?;
        crate::proc::map_kernel_stacks(&mut *pt)?;
        KERNEL_PAGETABLE = Some(pt);
    }
    Ok(())
}

pub fn kvminithart() {
    sfence_vma();
    let pt = unsafe { KERNEL_PAGETABLE.expect("kvminit not called") };
    w_satp(MAKE_SATP!(pt as usize));
    sfence_vma();
}

pub fn kernel_satp() -> usize {
    MAKE_SATP!(unsafe { KERNEL_PAGETABLE.expect("kvminit not called") as usize })
}

/// Install 4 KiB leaves for `[va, va+size)` -> `[pa, pa+size)`, allocating
/// intermediate tables on demand. `AlreadyMapped` if any target leaf is
/// already valid.
pub fn mappages(
    pagetable: &mut PageTable,
    va: usize,
    mut pa: usize,
    size: usize,
    perm: usize,
) -> Result<(), Errno> {
    assert!(size != 0, "mappages: zero size");

    let mut a = PGROUNDDOWN!(va);
    let last = PGROUNDDOWN!(va + size - 1);

    loop {
        let pte = walk(pagetable, a, true)?;
        if pte.valid() {
            return Err(Errno::Exist);
        }
        *pte = Pte(PA2PTE!(pa) | perm | PTE_V);

        if a == last {
            break;
        }
        a += PGSIZE;
        pa += PGSIZE;
    }
    Ok(())
}

/// Remove `npages` leaves starting at page-aligned `va`. Optionally frees
/// the backing physical frame.
pub fn uvmunmap(pagetable: &mut PageTable, va: usize, npages: usize, do_free: bool) {
    assert!(va % PGSIZE == 0, "uvmunmap: unaligned va");

    for i in 0..npages {
        let a = va + i * PGSIZE;
        let pte = walk(pagetable, a, false).unwrap_or_else(|_| panic!("uvmunmap: walk {:#x}", a));
        if !pte.valid() {
            panic!("uvmunmap: not mapped at {:#x}", a);
        }
        if !pte.is_leaf() {
            panic!("uvmunmap: not a leaf at {:#x}", a);
        }
        if do_free {
            frame::free(pte.pa());
        }
        *pte = Pte(0);
    }
}

/// Return the PTE slot for `va`, allocating intermediate tables if `alloc`.
fn walk(pagetable: &mut PageTable, va: usize, alloc: bool) -> Result<&mut Pte, Errno> {
    assert!(va < MAXVA, "walk: va out of range");

    let mut curr: *mut PageTable = pagetable;
    for level in (1..3).rev() {
        let pte = unsafe { &mut (*curr).0[PX!(level, va)] };
        if pte.valid() {
            curr = pte.pa() as *mut PageTable;
        } else {
            if !alloc {
                return Err(Errno::NoMem);
            }
            let next = empty_pagetable()?;
            *pte = Pte(PA2PTE!(next as usize) | PTE_V);
            curr = next;
        }
    }
    Ok(unsafe { &mut (*curr).0[PX!(0, va)] })
}

/// Read-only translation, for diagnostics and `copy_in`/`copy_out`.
pub fn walk_addr(pagetable: &mut PageTable, va: usize) -> Option<usize> {
    if va >= MAXVA {
        return None;
    }
    let mut curr: *mut PageTable = pagetable;
    for level in (0..3).rev() {
        let pte = unsafe { &(*curr).0[PX!(level, va)] };
        if !pte.valid() {
            return None;
        }
        if level == 0 {
            return Some(pte.pa());
        }
        curr = pte.pa() as *mut PageTable;
    }
    None
}

pub fn uvmcreate() -> Result<*mut PageTable, Errno> {
    empty_pagetable()
}

/// Allocate `npages` fresh user pages starting at `va` with `perm | U`.
pub fn uvmalloc(pagetable: &mut PageTable, va: usize, npages: usize, perm: usize) -> Result<(), Errno> {
    for i in 0..npages {
        let pa = frame::alloc_zeroed()?;
        if let Err(e) = mappages(pagetable, va + i * PGSIZE, pa, PGSIZE, perm | PTE_U) {
            frame::free(pa);
            return Err(e);
        }
    }
    Ok(())
}

/// Load `src` into a single fresh user page at VA `0x0`-relative `va`; used
/// for exec's first text page.
pub fn uvmfirst(pagetable: &mut PageTable, va: usize, src: &[u8]) -> Result<(), Errno> {
    assert!(src.len() < PGSIZE, "uvmfirst: more than a page");
    let pa = frame::alloc_zeroed()?;
    mappages(pagetable, va, pa, PGSIZE, PTE_W | PTE_R | PTE_X | PTE_U)?;
    memmove(pa as *mut u8, src.as_ptr(), src.len());
    Ok(())
}

/// Copy every `U`-flagged leaf from `src` into freshly allocated frames in
/// `dst`, byte for byte. Never touches `G` (kernel-global) leaves — those
/// are populated separately by `install_kernel_globals`, per Open Question
/// #1's resolution.
pub fn clone_user_space(src: &mut PageTable, dst: &mut PageTable, sz: usize) -> Result<(), Errno> {
    let mut va = 0usize;
    while va < sz {
        let step: Result<(), Errno> = (|| {
            // `walk(.., false)` reports an entirely absent intermediate
            // table the same way it reports "not yet allocated" — both
            // mean there's nothing here to copy, which is the normal case
            // for the unmapped null-guard page at va 0.
            let pte = match walk(src, va, false) {
                Ok(pte) => pte,
                Err(_) => return Ok(()),
            };
            if !pte.valid() || (pte.0 & PTE_U) == 0 {
                return Ok(());
            }
            let flags = pte.flags();
            let src_pa = pte.pa();
            let pa = frame::alloc_zeroed()?;
            memmove(pa as *mut u8, src_pa as *const u8, PGSIZE);
            if let Err(e) = mappages(dst, va, pa, PGSIZE, flags) {
                frame::free(pa);
                return Err(e);
            }
            Ok(())
        })();
        if let Err(e) = step {
            uvmunmap_range(dst, va);
            return Err(e);
        }
        va += PGSIZE;
    }
    Ok(())
}

/// Unwind a partially-populated clone on failure: free every user leaf in
/// `[0, upto)` that was copied in before the failing page.
fn uvmunmap_range(dst: &mut PageTable, upto: usize) {
    let mut va = 0usize;
    while va < upto {
        if let Ok(pte) = walk(dst, va, false) {
            if pte.valid() && (pte.0 & PTE_U) != 0 {
                frame::free(pte.pa());
                *pte = Pte(0);
            }
        }
        va += PGSIZE;
    }
}

/// Recursively free page-table pages. All leaf mappings (other than
/// globally-shared `G` leaves, which are never owned by this table) must
/// already have been removed by the caller.
fn freewalk(pagetable: *mut PageTable) {
    unsafe {
        for pte in &mut (*pagetable).0 {
            if pte.valid() && !pte.is_leaf() {
                freewalk(pte.pa() as *mut PageTable);
                *pte = Pte(0);
            } else if pte.valid() && (pte.0 & PTE_G) == 0 {
                panic!("freewalk: leaf still mapped");
            }
        }
    }
    frame::free(pagetable as usize);
}

pub fn uvmfree(pagetable: &mut PageTable, sz: usize) {
    let base = crate::memlayout::USER_NULL_GUARD;
    if sz > base {
        uvmunmap(pagetable, base, (PGROUNDUP!(sz) - base) / PGSIZE, true);
    }
    freewalk(pagetable as *mut PageTable);
}

/// Grow `[oldsz, newsz)` with fresh zeroed user pages.
pub fn uvmgrow(pagetable: &mut PageTable, oldsz: usize, newsz: usize) -> Result<usize, Errno> {
    if newsz <= oldsz {
        return Ok(oldsz);
    }
    let lo = PGROUNDUP!(oldsz);
    let npages = (PGROUNDUP!(newsz) - lo) / PGSIZE;
    uvmalloc(pagetable, lo, npages, PTE_W | PTE_R)?;
    Ok(newsz)
}

/// Shrink by unmapping and freeing `[newsz, oldsz)`.
pub fn uvmshrink(pagetable: &mut PageTable, oldsz: usize, newsz: usize) -> usize {
    if newsz >= oldsz {
        return oldsz;
    }
    let lo = PGROUNDUP!(newsz);
    let hi = PGROUNDUP!(oldsz);
    if hi > lo {
        uvmunmap(pagetable, lo, (hi - lo) / PGSIZE, true);
    }
    newsz
}

/// Copy `len` bytes from user VA `src` into kernel memory `dst` (spec
/// §4.5). `EFAULT` if any covered page is unmapped or lacks `U|R`.
pub fn copy_in(pagetable: &mut PageTable, dst: &mut [u8], src: usize, len: usize) -> Result<(), Errno> {
    let mut dst_off = 0;
    let mut va = src;
    let mut remaining = len;
    while remaining > 0 {
        let va0 = PGROUNDDOWN!(va);
        let pte = walk(pagetable, va0, false).map_err(|_| Errno::Fault)?;
        if !pte.valid() || (pte.0 & PTE_U) == 0 || (pte.0 & PTE_R) == 0 {
            return Err(Errno::Fault);
        }
        let pa0 = pte.pa();
        let page_off = va - va0;
        let n = (PGSIZE - page_off).min(remaining);
        unsafe {
            core::ptr::copy_nonoverlapping(
                (pa0 + page_off) as *const u8,
                dst[dst_off..].as_mut_ptr(),
                n,
            );
        }
        dst_off += n;
        remaining -= n;
        va = va0 + PGSIZE;
    }
    Ok(())
}

/// Copy `src` from kernel memory out to user VA `dst` (spec §4.5).
/// `EFAULT` if any covered page is unmapped or lacks `U|W`.
pub fn copy_out(pagetable: &mut PageTable, dst: usize, src: &[u8]) -> Result<(), Errno> {
    let mut src_off = 0;
    let mut va = dst;
    let mut remaining = src.len();
    while remaining > 0 {
        let va0 = PGROUNDDOWN!(va);
        let pte = walk(pagetable, va0, false).map_err(|_| Errno::Fault)?;
        if !pte.valid() || (pte.0 & PTE_U) == 0 || (pte.0 & PTE_W) == 0 {
            return Err(Errno::Fault);
        }
        let pa0 = pte.pa();
        let page_off = va - va0;
        let n = (PGSIZE - page_off).min(remaining);
        unsafe {
            core::ptr::copy_nonoverlapping(
                src[src_off..].as_ptr(),
                (pa0 + page_off) as *mut u8,
                n,
            );
        }
        src_off += n;
        remaining -= n;
        va = va0 + PGSIZE;
    }
    Ok(())
}

/// Copy a NUL-terminated string from user VA `src`, stopping at the first
/// NUL or at `buf.len()-1` bytes; always NUL-terminates `buf`. Returns the
/// string length excluding the NUL.
pub fn copy_in_str(pagetable: &mut PageTable, buf: &mut [u8], src: usize) -> Result<usize, Errno> {
    let mut va = src;
    let mut i = 0;
    while i < buf.len() - 1 {
        let va0 = PGROUNDDOWN!(va);
        let pte = walk(pagetable, va0, false).map_err(|_| Errno::Fault)?;
        if !pte.valid() || (pte.0 & PTE_U) == 0 || (pte.0 & PTE_R) == 0 {
            return Err(Errno::Fault);
        }
        let pa0 = pte.pa();
        let page_off = va - va0;
        let page_bytes = unsafe { core::slice::from_raw_parts((pa0 + page_off) as *const u8, PGSIZE - page_off) };
        for &c in page_bytes {
            if i >= buf.len() - 1 {
                break;
            }
            if c == 0 {
                buf[i] = 0;
                return Ok(i);
            }
            buf[i] = c;
            i += 1;
            va += 1;
        }
    }
    buf[i] = 0;
    Ok(i)
}
