//! The embedded program `userinit`/`exec` load (spec §1 "embedded initial
//! ramdisk and userland"). Building a real userland binary requires the
//! ELF loader and `mkinitrd` tool, both named out-of-core (§1); rather than
//! fake that pipeline, this is one hand-assembled RV64 flat binary that
//! calls `exit(0)` and then spins, so the flat-binary-loading contract
//! `userinit`/`exec` implement has something real to load and run under
//! QEMU without depending on a cross-compiled `user/` crate.

/// `addi a0, zero, 0`; `addi a7, zero, 93` (`exit`); `ecall`; `j .` (in case
/// `exit` is ever reached without the scheduler reaping the zombie).
pub const PLACEHOLDER_INIT: [u8; 16] = [
    0x13, 0x05, 0x00, 0x00, // addi a0, zero, 0
    0x93, 0x08, 0xd0, 0x05, // addi a7, zero, 93
    0x73, 0x00, 0x00, 0x00, // ecall
    0x6f, 0x00, 0x00, 0x00, // j .
];

pub fn init_image() -> &'static [u8] {
    &PLACEHOLDER_INIT
}
