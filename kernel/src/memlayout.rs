//! Physical and virtual memory layout (spec §6 "EXTERNAL INTERFACES").
//!
//! QEMU `virt` is laid out as in qemu's `hw/riscv/virt.c`; OpenSBI occupies
//! the first 2 MiB of RAM and hands the kernel control at 0x8020_0000.

use crate::riscv::*;

/// RAM base and the region the kernel owns after OpenSBI's reservation and
/// its own 2MiB load offset.
pub const RAMBASE: usize = 0x8000_0000;
pub const KERNBASE: usize = 0x8020_0000;
pub const PHYSTOP: usize = RAMBASE + 128 * 1024 * 1024;

/// Trampoline page: mapped identically at the top of every address space
/// (kernel and every user table) so the U<->S transition never crosses a
/// translation change mid-flight.
pub const TRAMPOLINE: usize = MAXVA - PGSIZE;
pub const TRAPFRAME: usize = TRAMPOLINE - PGSIZE;

#[macro_export]
macro_rules! KSTACK {
    ( $p:expr ) => {
        $crate::memlayout::TRAMPOLINE - (($p) + 1) * 3 * $crate::riscv::PGSIZE
    };
}

/// User virtual layout: page 0 is never mapped, so a load or store through a
/// null pointer always faults. The image (text) starts one page above VA 0
/// and a fixed-size stack follows it immediately; see
/// `exec::load_and_build_stack`.
pub const USER_NULL_GUARD: usize = PGSIZE;
pub const USER_STACK_PAGES: usize = 4;
