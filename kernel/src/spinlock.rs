//! A spinlock plus the nested-safe interrupt-disable discipline spec §5
//! requires ("nested-safe save/restore of `sstatus.SIE` to allow
//! composition"). Ported from the teacher's stale `src/kernel/spinlock.rs`
//! (absent from the live `kernel/src/` tree that was otherwise chosen as the
//! base) into this tree, since every core subsystem needs it.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::proc::mycpu;
use crate::riscv::{intr_get, intr_off, intr_on};

pub struct Spinlock {
    locked: AtomicBool,
    name: &'static str,
}

impl Spinlock {
    pub const fn new(name: &'static str) -> Self {
        Self {
            locked: AtomicBool::new(false),
            name,
        }
    }

    pub fn acquire(&self) {
        push_off();
        if self.holding() {
            panic!("spinlock {}: already held by this hart", self.name);
        }
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
    }

    pub fn release(&self) {
        if !self.holding() {
            panic!("spinlock {}: release without holding", self.name);
        }
        self.locked.store(false, Ordering::Release);
        pop_off();
    }

    /// Single-hart kernel: "held by this hart" degenerates to "held at
    /// all", since no other hart can contend for it. Kept as its own
    /// method so a later multi-hart port only has to change this body.
    pub fn holding(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

unsafe impl Sync for Spinlock {}

/// push_off/pop_off: nestable sstatus.SIE disable, so code that already
/// holds a lock (interrupts off) can call into code that also disables
/// interrupts without the inner call re-enabling them on its way out.
/// Mirrors the teacher's `Cpu.noff`/`Cpu.intena` fields.
pub fn push_off() {
    let was_enabled = intr_get();
    intr_off();
    let c = mycpu();
    if c.noff == 0 {
        c.intena = was_enabled;
    }
    c.noff += 1;
}

pub fn pop_off() {
    let c = mycpu();
    if intr_get() {
        panic!("pop_off: interrupts enabled while counting");
    }
    if c.noff == 0 {
        panic!("pop_off: unbalanced with push_off");
    }
    c.noff -= 1;
    if c.noff == 0 && c.intena {
        intr_on();
    }
}
