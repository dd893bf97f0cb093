//! `execve` (spec §4.4 "Exec"). The teacher's `exec.rs` parsed an ELF
//! header and program headers out of an on-disk inode via
//! `ELF_MAGIC`/`ProgramHeader`/`loadseg`; the ELF loader is named
//! out-of-core here, and the program this kernel execs is an embedded flat
//! binary (see `initrd.rs`), not a file read through the VFS. What's kept
//! from the teacher's version is the surrounding contract: build a fresh
//! page table, load the new image one page above VA 0 (leaving page 0
//! permanently unmapped, so a null pointer always faults) with a fixed-size
//! stack immediately above it, and only commit (swap
//! `p.pagetable`/`p.sz`/trap-frame `epc`/`sp`) once every fallible step has
//! succeeded — never leave the caller with a half-built new image and a
//! torn-down old one.

use crate::errno::Errno;
use crate::initrd;
use crate::proc::myproc;
use crate::riscv::{PageTable, PGSIZE, PTE_R, PTE_W, PTE_X};
use crate::vm;
use crate::PGROUNDUP;

/// Replace the calling process's user image with the embedded program
/// matching `path`. There is currently exactly one bundled program
/// (`initrd::init_image`), so any resolvable name loads it — this kernel
/// has no userland shell to exec *other* programs, per the out-of-core
/// scope for that layer.
pub fn exec(path: &str) -> Result<(), Errno> {
    if path.is_empty() {
        return Err(Errno::NoEnt);
    }
    let image = initrd::init_image();

    let pt = vm::uvmcreate()?;
    let result = load_and_build_stack(unsafe { &mut *pt }, image);
    let (sz, sp, entry) = match result {
        Ok(v) => v,
        Err(e) => {
            vm::uvmfree(unsafe { &mut *pt }, 0);
            return Err(e);
        }
    };

    let p = myproc();
    let old_pagetable = p.pagetable;
    let old_sz = p.sz;

    map_trapframe_trampoline(unsafe { &mut *pt }, p.trapframe as usize)?;

    p.pagetable = pt;
    p.sz = sz;
    p.heap_start = sz;
    p.heap_end = sz;
    let tf = p.trapframe();
    tf.epc = entry;
    tf.sp = sp as u64;

    let mut name = [0u8; 16];
    let n = path.as_bytes().len().min(name.len());
    name[..n].copy_from_slice(&path.as_bytes()[..n]);
    p.name = name;

    // FDs survive exec except those opened with O_CLOEXEC; only sweep
    // these once the new image is actually committed, not on an error
    // path above, since a failed exec must leave the caller's FD table
    // exactly as it found it.
    p.fds.close_on_exec();

    vm::uvmfree(unsafe { &mut *old_pagetable }, old_sz);
    Ok(())
}

fn map_trapframe_trampoline(pt: &mut PageTable, trapframe_pa: usize) -> Result<(), Errno> {
    extern "C" {
        static trampoline: u8;
    }
    let trampoline_addr = unsafe { &trampoline as *const u8 as usize };
    vm::mappages(
        pt,
        crate::memlayout::TRAMPOLINE,
        trampoline_addr,
        PGSIZE,
        PTE_R | PTE_X,
    )?;
    vm::mappages(
        pt,
        crate::memlayout::TRAPFRAME,
        trapframe_pa,
        PGSIZE,
        PTE_R | PTE_W,
    )?;
    Ok(())
}

/// Load `image` one page above VA 0, then lay out a stack immediately
/// above it. Page 0 itself is never mapped, so any load or store through a
/// null pointer faults instead of silently succeeding. Returns `(sz, sp,
/// entry)` on success; `pt` is left however far it got on failure, for the
/// caller to tear down.
fn load_and_build_stack(pt: &mut PageTable, image: &[u8]) -> Result<(usize, usize, u64), Errno> {
    let base = crate::memlayout::USER_NULL_GUARD;
    let text_pages = PGROUNDUP!(image.len().max(1)) / PGSIZE;
    let stack_base = base + text_pages * PGSIZE;
    let stack_pages = crate::memlayout::USER_STACK_PAGES;
    let stack_top = stack_base + stack_pages * PGSIZE;

    // Text and stack are one contiguous allocation starting at `base`, so
    // `uvmfree`'s unmap walk (which also starts at `base`) never hits a
    // hole. VA 0 is left out of this range entirely — not mapped, not
    // merely access-stripped — so it's never a valid target for a page
    // table walk.
    vm::uvmalloc(pt, base, text_pages + stack_pages, PTE_W | PTE_R | PTE_X)?;

    let mut copied = 0;
    for i in 0..text_pages {
        let va = base + i * PGSIZE;
        let pa = vm::walk_addr(pt, va).expect("load_and_build_stack: just-mapped page missing");
        let n = (image.len() - copied).min(PGSIZE);
        unsafe {
            core::ptr::copy_nonoverlapping(image[copied..].as_ptr(), pa as *mut u8, n);
        }
        copied += n;
    }

    Ok((stack_top, stack_top, base as u64))
}
