//! Process table and per-CPU state (spec §3 "Process (PCB)", §4.4). Split
//! out of the teacher's single `proc.rs`, which declared this shape
//! (`Context`, `Cpu`, `Trapframe`, `Proc`, `Procstate`, `allocproc`,
//! `(proc|uvm)_pagetable`, `userinit`, `forkret`) but left the scheduler
//! itself — `schedule`, `sleep_on`, `wake_all`, `wakeup`, `fork`, `exit`,
//! `wait4`, the idle loop — as bare stubs or `panic!("unimplemented")`.
//! Those live in `scheduler.rs`; this module is the data the scheduler
//! operates on.

pub mod scheduler;

use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::{NCPU, NOFILE, NPROC};
use crate::errno::Errno;
use crate::file::FdTable;
use crate::memlayout::{TRAMPOLINE, TRAPFRAME};
use crate::riscv::{PageTable, Pte, PGSIZE, PTE_R, PTE_W, PTE_X};
use crate::spinlock::Spinlock;
use crate::vfs::VNodeRef;
use crate::vm;
use crate::KSTACK;

/// Callee-saved registers for `context_switch` (spec §4.3): exactly
/// `ra, sp, s0..s11`, plus `satp` since this kernel switches page tables as
/// part of a context switch (spec §9 "Context switching").
#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct Context {
    pub ra: u64,
    pub sp: u64,
    pub s0: u64,
    pub s1: u64,
    pub s2: u64,
    pub s3: u64,
    pub s4: u64,
    pub s5: u64,
    pub s6: u64,
    pub s7: u64,
    pub s8: u64,
    pub s9: u64,
    pub s10: u64,
    pub s11: u64,
}

extern "C" {
    /// Defined in `asm/switch.S`: save the callee-saved set into `old`,
    /// load it from `new`, and return into whatever `new.ra` points at.
    pub fn context_switch(old: *mut Context, new: *const Context);
}

/// Per-process trap frame (spec §3): every general register the trampoline
/// must restore, plus what `usertrap`/`usertrapret` need to get back and
/// forth. Field order and offsets are load-bearing — `asm/trampoline.S`
/// indexes into this struct by byte offset.
#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct TrapFrame {
    pub kernel_satp: u64,
    pub kernel_sp: u64,
    pub kernel_trap: u64,
    pub epc: u64,
    pub kernel_hartid: u64,
    pub ra: u64,
    pub sp: u64,
    pub gp: u64,
    pub tp: u64,
    pub t0: u64,
    pub t1: u64,
    pub t2: u64,
    pub s0: u64,
    pub s1: u64,
    pub a0: u64,
    pub a1: u64,
    pub a2: u64,
    pub a3: u64,
    pub a4: u64,
    pub a5: u64,
    pub a6: u64,
    pub a7: u64,
    pub s2: u64,
    pub s3: u64,
    pub s4: u64,
    pub s5: u64,
    pub s6: u64,
    pub s7: u64,
    pub s8: u64,
    pub s9: u64,
    pub s10: u64,
    pub s11: u64,
    pub t3: u64,
    pub t4: u64,
    pub t5: u64,
    pub t6: u64,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ProcState {
    Unused,
    Embryo,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

/// The ready queue is an intrusive singly-linked list over the fixed
/// process array (spec §9: "represent them as index links into fixed
/// arenas rather than owning references"), so `next_ready` is an index,
/// not a pointer. Wait queues are represented the same way the teacher's
/// own call sites already implied (`wakeup(&self.r)` in `console.rs`):
/// rather than a separate linked list per channel, a sleeping process
/// simply records the channel address it's waiting on in `chan`, and
/// `wake_all`/`wakeup` scan the (small, fixed) process array for a match —
/// still entirely over the fixed arena, with no owned pointers anywhere.
pub const NONE_IDX: usize = usize::MAX;

pub struct Proc {
    pub lock: Spinlock,

    pub state: ProcState,
    pub chan: usize,
    pub killed: bool,
    pub xstate: i32,
    pub pid: u32,

    pub parent: usize,
    pub next_ready: usize,

    pub kstack: usize,
    pub sz: usize,
    pub pagetable: *mut PageTable,
    pub trapframe: *mut TrapFrame,
    pub context: Context,
    pub fds: FdTable,
    pub cwd: Option<VNodeRef>,
    pub name: [u8; 16],

    /// The brk-growable region: fixed at the end of the loaded image (and
    /// its stack, in this kernel's layout — see `exec::load_and_build_stack`)
    /// once `exec` commits, then `heap_end` tracks `sys_brk` growth/shrink.
    /// `heap_end` is kept equal to `sz` (the total mapped extent); they're
    /// split into two fields because they mean different things even though
    /// this kernel's layout happens to make them numerically identical.
    pub heap_start: usize,
    pub heap_end: usize,
}

unsafe impl Sync for Proc {}

impl Proc {
    const fn unused(kstack: usize) -> Self {
        Proc {
            lock: Spinlock::new("proc"),
            state: ProcState::Unused,
            chan: NONE_IDX,
            killed: false,
            xstate: 0,
            pid: 0,
            parent: NONE_IDX,
            next_ready: NONE_IDX,
            kstack,
            sz: 0,
            pagetable: core::ptr::null_mut(),
            trapframe: core::ptr::null_mut(),
            context: Context {
                ra: 0,
                sp: 0,
                s0: 0,
                s1: 0,
                s2: 0,
                s3: 0,
                s4: 0,
                s5: 0,
                s6: 0,
                s7: 0,
                s8: 0,
                s9: 0,
                s10: 0,
                s11: 0,
            },
            fds: FdTable::new(),
            cwd: None,
            name: [0; 16],
            heap_start: 0,
            heap_end: 0,
        }
    }

    pub fn trapframe(&mut self) -> &mut TrapFrame {
        unsafe { &mut *self.trapframe }
    }

    pub fn pagetable(&mut self) -> &mut PageTable {
        unsafe { &mut *self.pagetable }
    }
}

#[derive(Copy, Clone)]
pub struct Cpu {
    pub proc: usize,
    pub context: Context,
    pub noff: u8,
    pub intena: bool,
}

impl Cpu {
    const fn default() -> Self {
        Cpu {
            proc: NONE_IDX,
            context: Context {
                ra: 0,
                sp: 0,
                s0: 0,
                s1: 0,
                s2: 0,
                s3: 0,
                s4: 0,
                s5: 0,
                s6: 0,
                s7: 0,
                s8: 0,
                s9: 0,
                s10: 0,
                s11: 0,
            },
            noff: 0,
            intena: false,
        }
    }
}

static mut CPUS: [Cpu; NCPU] = [Cpu::default(); NCPU];

const fn make_table() -> [Proc; NPROC] {
    let mut table = [const { Proc::unused(0) }; NPROC];
    let mut i = 0;
    while i < NPROC {
        table[i].kstack = KSTACK!(i);
        i += 1;
    }
    table
}

static mut PROCS: [Proc; NPROC] = make_table();

/// Protects `parent`/`next_wait` links and the exit/reap handshake
/// (spec: "must be acquired before any p->lock").
pub static WAIT_LOCK: Spinlock = Spinlock::new("wait_lock");

static NEXT_PID: AtomicU32 = AtomicU32::new(1);

pub fn cpuid() -> usize {
    crate::riscv::r_tp() as usize
}

/// Must be called with interrupts disabled (the caller is expected to be
/// inside a `push_off`'d region already, e.g. holding a `Spinlock`).
pub fn mycpu() -> &'static mut Cpu {
    unsafe { &mut CPUS[cpuid()] }
}

pub fn proc_at(idx: usize) -> &'static mut Proc {
    unsafe { &mut PROCS[idx] }
}

/// Index of the process currently running on this hart, or `NONE_IDX`.
pub fn myproc_idx() -> usize {
    crate::spinlock::push_off();
    let idx = mycpu().proc;
    crate::spinlock::pop_off();
    idx
}

pub fn myproc() -> &'static mut Proc {
    proc_at(myproc_idx())
}

fn allocpid() -> u32 {
    NEXT_PID.fetch_add(1, Ordering::Relaxed)
}

/// Map a kernel stack (plus guard page below it) for every process slot
/// into the kernel's own page table, mirroring the teacher's
/// `proc_mapstacks`.
pub fn map_kernel_stacks(kpgtbl: &mut PageTable) -> Result<(), Errno> {
    for i in 0..NPROC {
        let pa = crate::frame::alloc_zeroed()?;
        let va = KSTACK!(i);
        vm::mappages(kpgtbl, va, pa, PGSIZE, PTE_R | PTE_W)?;
    }
    Ok(())
}

/// Find an `UNUSED` slot, mark it `EMBRYO`, and give it a trapframe and an
/// otherwise-empty page table (trampoline + trapframe mapped, kernel
/// globals installed). Returns with `p.lock` held, as the teacher's
/// `allocproc` contract required.
pub fn allocproc() -> Result<usize, Errno> {
    let idx = (0..NPROC).find(|&i| {
        let p = proc_at(i);
        p.lock.acquire();
        if p.state == ProcState::Unused {
            true
        } else {
            p.lock.release();
            false
        }
    });
    let idx = idx.ok_or(Errno::Again)?;
    let p = proc_at(idx);

    p.pid = allocpid();
    p.state = ProcState::Embryo;

    let result: Result<(), Errno> = (|| {
        let tf_pa = crate::frame::alloc_zeroed()?;
        p.trapframe = tf_pa as *mut TrapFrame;

        let pt = vm::uvmcreate()?;
        p.pagetable = pt;
        unsafe {
            vm::install_kernel_globals(&mut *pt)?;
        }
        proc_pagetable_trapframe(p)?;
        Ok(())
    })();

    if let Err(e) = result {
        free_proc(p);
        p.lock.release();
        return Err(e);
    }

    p.context = Context::default();
    p.context.ra = scheduler::forkret as u64;
    p.context.sp = (p.kstack + 3 * PGSIZE) as u64;

    Ok(idx)
}

fn proc_pagetable_trapframe(p: &mut Proc) -> Result<(), Errno> {
    extern "C" {
        static trampoline: u8;
    }
    let trampoline_addr = unsafe { &trampoline as *const u8 as usize };
    let trapframe_addr = p.trapframe as usize;
    let pt = p.pagetable();
    vm::mappages(pt, TRAMPOLINE, trampoline_addr, PGSIZE, PTE_R | PTE_X)?;
    vm::mappages(pt, TRAPFRAME, trapframe_addr, PGSIZE, PTE_R | PTE_W)?;
    Ok(())
}

/// Free a process's trapframe, page table and user memory, and reset it to
/// `UNUSED`. `p.lock` must be held.
pub fn free_proc(p: &mut Proc) {
    if !p.trapframe.is_null() {
        crate::frame::free(p.trapframe as usize);
    }
    p.trapframe = core::ptr::null_mut();

    if !p.pagetable.is_null() {
        let sz = p.sz;
        let pt = p.pagetable();
        if vm::walk_addr(pt, TRAMPOLINE).is_some() {
            vm::uvmunmap(pt, TRAMPOLINE, 1, false);
        }
        if vm::walk_addr(pt, TRAPFRAME).is_some() {
            vm::uvmunmap(pt, TRAPFRAME, 1, false);
        }
        vm::uvmfree(pt, sz);
    }
    p.pagetable = core::ptr::null_mut();

    p.sz = 0;
    p.heap_start = 0;
    p.heap_end = 0;
    p.pid = 0;
    p.parent = NONE_IDX;
    p.name = [0; 16];
    p.chan = NONE_IDX;
    p.killed = false;
    p.xstate = 0;
    p.state = ProcState::Unused;
}
