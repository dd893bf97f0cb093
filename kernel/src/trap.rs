//! Trap dispatch (spec §4.3). The teacher's `usertrapret` already had the
//! right shape (set `stvec` to the trampoline's `uservec`, stash
//! `kernel_satp`/`kernel_sp`/`kernel_trap`/`kernel_hartid` into the trap
//! frame, flip `sstatus.SPP`/`SPIE`, jump through `userret`); it's kept
//! here, ported onto the new `proc::mod` API (`p.trapframe()`/
//! `p.pagetable()` instead of `Option`-wrapped raw pointers). `usertrap`
//! itself was a bare `panic!("unimplemented")` in the teacher and is
//! written fresh: ecall dispatches to the syscall table, the timer
//! interrupt bumps the tick counter and polls the SBI console (see
//! `uart.rs`) before possibly rescheduling, and anything else is treated
//! as spec §4.3's "unrecoverable" case — PLIC-routed external interrupts
//! are gone along with `plic.rs` since all console I/O goes through SBI.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::memlayout::TRAMPOLINE;
use crate::proc::myproc;
use crate::proc::scheduler::{sleep_on, yield_now};
use crate::riscv::{
    intr_off, r_satp, r_scause, r_sstatus, r_stval, r_tp, w_sepc, w_sstatus, w_stvec, PageTable,
    PGSIZE, SSTATUS_SPIE, SSTATUS_SPP,
};
use crate::sbi;
use crate::spinlock::Spinlock;
use crate::MAKE_SATP;

extern "C" {
    static kernelvec: u8;
    static trampoline: u8;
    static uservec: u8;
    static userret: u8;
}

const SCAUSE_INTERRUPT: u64 = 1 << 63;
const SCAUSE_ECALL_U: u64 = 8;
const SCAUSE_TIMER: u64 = 5 | SCAUSE_INTERRUPT;

/// Ticks since boot, bumped by the timer ISR, and the channel `nanosleep`
/// callers wait on.
static TICKS: AtomicU64 = AtomicU64::new(0);
static TICKS_LOCK: Spinlock = Spinlock::new("ticks");

pub fn trapinit() {}

/// Set up to take traps while in the kernel (`kernelvec`, not the
/// trampoline's `uservec`), enable the supervisor timer interrupt, and arm
/// the first tick — `timer_tick` rearms itself from then on.
pub fn trapinithart() {
    w_stvec(unsafe { &kernelvec as *const u8 as usize });
    crate::riscv::w_sie(crate::riscv::r_sie() | crate::riscv::SIE_STIE);
    sbi::set_timer(sbi::read_time() + crate::config::TIMER_INTERVAL_CYCLES);
}

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

fn tick_channel() -> usize {
    &TICKS as *const AtomicU64 as usize
}

/// Sleep for at least `n` scheduler ticks. A spurious wake re-checks the
/// deadline rather than returning early (spec §5: "a spurious wake must
/// not return success before the deadline").
pub fn sleep_ticks(n: u64) {
    let deadline = ticks() + n;
    TICKS_LOCK.acquire();
    while ticks() < deadline {
        sleep_on(tick_channel(), &TICKS_LOCK);
    }
    TICKS_LOCK.release();
}

fn timer_tick() {
    if r_tp() == 0 {
        TICKS.fetch_add(1, Ordering::Relaxed);
        crate::uart::poll();
        crate::proc::scheduler::wake_all(tick_channel());
    }
    sbi::set_timer(sbi::read_time() + crate::config::TIMER_INTERVAL_CYCLES);
}

/// Entry point for `EcallFromUMode`/timer traps, called from `uservec` in
/// `asm/trampoline.S` with `stvec` already pointed at `kernelvec` for the
/// duration of the call.
#[no_mangle]
pub extern "C" fn usertrap() {
    if (r_sstatus() as u64 & (1 << 8)) != 0 {
        panic!("usertrap: not from user mode");
    }

    let trampoline_addr = unsafe { &trampoline as *const u8 as usize };
    let kernelvec_addr = unsafe { &kernelvec as *const u8 as usize };
    w_stvec(kernelvec_addr);
    let _ = trampoline_addr;

    let p = myproc();
    p.trapframe().epc = crate::riscv::r_sepc() as u64;

    let scause = r_scause();
    if scause == SCAUSE_ECALL_U {
        if p.killed {
            crate::proc::scheduler::exit(-1);
        }
        p.trapframe().epc += 4;
        crate::riscv::intr_on();
        crate::syscall::syscall();
    } else if scause == SCAUSE_TIMER {
        timer_tick();
        yield_now();
    } else {
        log::error!(
            "usertrap: unrecoverable scause={:#x} stval={:#x} pid={}",
            scause,
            r_stval(),
            p.pid
        );
        p.killed = true;
    }

    if p.killed {
        crate::proc::scheduler::exit(-1);
    }

    usertrapret();
}

/// Kernel-mode trap entry (`kernelvec`, `asm/kernelvec.S`): this kernel
/// only ever sees the timer interrupt while running kernel code (no
/// PLIC-routed external interrupts now that console I/O goes through SBI).
#[no_mangle]
pub extern "C" fn kerneltrap() {
    let scause = r_scause();
    if scause == SCAUSE_TIMER {
        timer_tick();
    } else {
        panic!(
            "kerneltrap: unexpected scause={:#x} stval={:#x}",
            scause,
            r_stval()
        );
    }
}

/// Return to user space: the inverse of the ecall/timer entry, restoring
/// every register from the trap frame and `sret`-ing into user mode.
pub fn usertrapret() -> ! {
    let p = myproc();

    intr_off();

    let uservec_addr = unsafe { &uservec as *const u8 as usize };
    let trampoline_addr = unsafe { &trampoline as *const u8 as usize };
    let trampoline_uservec = TRAMPOLINE + uservec_addr - trampoline_addr;
    w_stvec(trampoline_uservec);

    let kstack = p.kstack;
    let tf = p.trapframe();
    tf.kernel_satp = r_satp() as u64;
    tf.kernel_sp = (kstack + 3 * PGSIZE) as u64;
    tf.kernel_trap = usertrap as usize as u64;
    tf.kernel_hartid = r_tp();

    let mut x = r_sstatus();
    x &= !SSTATUS_SPP;
    x |= SSTATUS_SPIE;
    w_sstatus(x);

    w_sepc(tf.epc as usize);

    let satp = MAKE_SATP!((p.pagetable as *const PageTable) as usize);

    let userret_addr = unsafe { &userret as *const u8 as usize };
    let trampoline_userret = TRAMPOLINE + userret_addr - trampoline_addr;

    unsafe {
        let func: extern "C" fn(usize) -> ! = core::mem::transmute(trampoline_userret);
        func(satp)
    }
}
