//! Process-control syscalls (spec §4.4, §4.5, §6). The teacher's
//! `sysproc.rs` had a single hand-inlined `fork()`; this kernel's fork lives
//! in `proc::scheduler` (it needs the ready queue, which `sysproc` has no
//! business touching directly), so these wrappers just marshal arguments
//! and delegate to `proc::scheduler`.

use crate::errno::Errno;
use crate::proc::scheduler;
use crate::proc::myproc;

use super::{argaddr, argint, argpath, path_str};

pub fn sys_clone() -> i64 {
    match scheduler::fork() {
        Ok(pid) => pid as i64,
        Err(e) => e.to_retval(),
    }
}

pub fn sys_execve() -> i64 {
    let path = match argpath(0) {
        Ok(p) => p,
        Err(e) => return e.to_retval(),
    };
    match crate::exec::exec(path_str(&path)) {
        Ok(()) => 0,
        Err(e) => e.to_retval(),
    }
}

pub fn sys_exit() -> i64 {
    let code = argint(0);
    scheduler::exit(code);
}

pub fn sys_wait4() -> i64 {
    let addr = argaddr(1);
    let mut status = 0i32;
    match scheduler::wait4(&mut status) {
        Ok(pid) => {
            if addr != 0 {
                let bytes = status.to_ne_bytes();
                let p = myproc();
                if crate::vm::copy_out(p.pagetable(), addr, &bytes).is_err() {
                    return Errno::Fault.to_retval();
                }
            }
            pid as i64
        }
        Err(e) => e.to_retval(),
    }
}

pub fn sys_getpid() -> i64 {
    myproc().pid as i64
}

pub fn sys_getppid() -> i64 {
    let parent = myproc().parent;
    if parent == crate::proc::NONE_IDX {
        0
    } else {
        crate::proc::proc_at(parent).pid as i64
    }
}

pub fn sys_sched_yield() -> i64 {
    scheduler::yield_now();
    0
}

/// `brk`-as-`sbrk`: `argint(0)` is a signed byte delta against
/// `p.heap_end`, matching the teacher's `sys_sbrk` convention rather than
/// Linux's absolute-target-address `brk`. This is a deliberate ABI
/// deviation from the syscall's usual contract, recorded in
/// `SPEC_FULL.md` — there is no libc in this tree computing an absolute
/// target from `sbrk(0)`, so there's no real caller either convention
/// would break for. `p.heap_end` is kept equal to `p.sz` since, in this
/// kernel's fixed (non-demand-paged) stack layout, the heap is simply
/// whatever's mapped past the end of the stack.
pub fn sys_brk() -> i64 {
    let delta = argint(0) as i64;
    let p = myproc();
    let oldend = p.heap_end;
    let result = if delta >= 0 {
        crate::vm::uvmgrow(p.pagetable(), oldend, oldend + delta as usize)
    } else {
        let heap_start = p.heap_start;
        Ok(crate::vm::uvmshrink(
            p.pagetable(),
            oldend,
            oldend.saturating_sub((-delta) as usize).max(heap_start),
        ))
    };
    match result {
        Ok(newend) => {
            p.heap_end = newend;
            p.sz = newend;
            oldend as i64
        }
        Err(e) => e.to_retval(),
    }
}

#[repr(C)]
struct Timespec {
    tv_sec: i64,
    tv_nsec: i64,
}

fn ticks_to_timespec(ticks: u64) -> Timespec {
    let ns_per_tick = 1_000_000_000 / crate::config::TIMER_HZ;
    let total_ns = ticks * ns_per_tick;
    Timespec {
        tv_sec: (total_ns / 1_000_000_000) as i64,
        tv_nsec: (total_ns % 1_000_000_000) as i64,
    }
}

/// Timed sleep tracked in scheduler ticks (spec §5: "kernel-tracked wake
/// time; a spurious wake must not return success before the deadline").
pub fn sys_nanosleep() -> i64 {
    let addr = argaddr(0);
    let p = myproc();
    let mut ts = Timespec { tv_sec: 0, tv_nsec: 0 };
    let bytes = unsafe {
        core::slice::from_raw_parts_mut(&mut ts as *mut Timespec as *mut u8, core::mem::size_of::<Timespec>())
    };
    if crate::vm::copy_in(p.pagetable(), bytes, addr, bytes.len()).is_err() {
        return Errno::Fault.to_retval();
    }
    let ticks_per_sec = crate::config::TIMER_HZ as i64;
    let requested = ts.tv_sec * ticks_per_sec + (ts.tv_nsec * ticks_per_sec) / 1_000_000_000;
    crate::trap::sleep_ticks(requested.max(0) as u64);
    0
}

pub fn sys_clock_gettime() -> i64 {
    let addr = argaddr(1);
    let ts = ticks_to_timespec(crate::trap::ticks());
    let bytes = unsafe {
        core::slice::from_raw_parts(&ts as *const Timespec as *const u8, core::mem::size_of::<Timespec>())
    };
    match crate::vm::copy_out(myproc().pagetable(), addr, bytes) {
        Ok(()) => 0,
        Err(e) => e.to_retval(),
    }
}

pub fn sys_time() -> i64 {
    ticks_to_timespec(crate::trap::ticks()).tv_sec
}
