//! Thin wrapper over the SBI calls this kernel needs from OpenSBI. The
//! teacher's `start.rs` performed the xv6-riscv M-mode boot dance itself
//! (mstatus.MPP, direct CLINT MTIMECMP pokes, `mret`); under OpenSBI the
//! firmware has already done the M->S transition before the kernel's entry
//! point runs, so that dance is both unnecessary and, for the timer, invalid
//! (CLINT's MTIMECMP is an M-mode-only register once OpenSBI owns M-mode).
//! Anything that needs M-mode now goes through an `ecall` into OpenSBI.
#![allow(deprecated)]

/// Put one byte to the firmware console (SBI legacy `console_putchar`).
/// Used as the `Console`'s backing sink instead of a direct UART MMIO poke,
/// since OpenSBI may be multiplexing the UART with its own diagnostics.
pub fn console_putchar(c: u8) {
    sbi_rt::legacy::console_putchar(c as usize);
}

/// Poll the firmware console for one buffered byte (SBI legacy
/// `console_getchar`); returns `None` when nothing is waiting. There is no
/// SBI-level console RX interrupt, so this is polled from the timer tick
/// rather than delivered as a real UART IRQ through the PLIC — see
/// `uart.rs`.
pub fn console_getchar() -> Option<u8> {
    match sbi_rt::legacy::console_getchar() {
        usize::MAX => None,
        c => Some(c as u8),
    }
}

/// Ask the firmware to raise the next supervisor timer interrupt at
/// `time + interval` cycles (SBI legacy `set_timer`), replacing the
/// teacher's direct CLINT_MTIMECMP write.
pub fn set_timer(deadline: u64) {
    sbi_rt::legacy::set_timer(deadline);
}

/// Cycles since boot, readable from S-mode via the `time` CSR (unchanged by
/// the OpenSBI boundary — `time` is not privileged).
pub fn read_time() -> u64 {
    crate::riscv::r_time()
}
