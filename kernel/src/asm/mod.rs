//! Assembles the boot entry, U<->S trampoline, kernel trap vector and
//! context switch. `trampoline.S` needs `memlayout::TRAPFRAME` baked in as
//! an immediate; `global_asm!`'s `const` operand substitution does that
//! without hand-duplicating the constant in the `.S` source.

use core::arch::global_asm;

use crate::memlayout::TRAPFRAME;

global_asm!(include_str!("entry.S"));
global_asm!(include_str!("kernelvec.S"));
global_asm!(include_str!("switch.S"));
global_asm!(include_str!("trampoline.S"), TRAPFRAME = const TRAPFRAME);
