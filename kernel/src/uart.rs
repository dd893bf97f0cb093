//! UART driver: out of core (spec §1). OpenSBI already owns the physical
//! NS16550 and multiplexes it as its own debug console, so rather than
//! fight it for raw MMIO access this kernel never touches UART0 registers
//! directly — every byte in or out goes through `sbi::console_putchar` /
//! `sbi::console_getchar`. `poll()` is called once per timer tick (see
//! `trap.rs`) to drain whatever the firmware has buffered since the last
//! tick and feed it to the console layer; this stands in for a real
//! UART-via-PLIC receive interrupt, which would require fighting OpenSBI
//! for the device.

use crate::console;
use crate::sbi;

pub fn poll() {
    while let Some(c) = sbi::console_getchar() {
        console::consoleintr(c);
    }
}
