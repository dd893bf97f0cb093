//! Canonical-mode console TTY (spec §4.7). Rewritten from the teacher's
//! `console.rs`, which kept one 128-byte ring shared between the ISR and
//! the reader and echoed/erased directly against it. Spec calls for two
//! independent buffers — a ≥256-byte ring fed by the ISR and a separate
//! ≥256-byte line buffer a reader accumulates into — so the reader's
//! erase/kill handling operates on cooked state instead of rewinding raw
//! ring indices, and a line in progress survives a `read()` that asks for
//! fewer bytes than are typed. Output no longer goes to `uart::UART_INSTANCE`
//! directly; it goes through `sbi::console_putchar` (see `sbi.rs`, `uart.rs`).

use crate::config::{TTY_LINE_SIZE, TTY_RING_SIZE};
use crate::errno::Errno;
use crate::proc::scheduler::{sleep_on, wake_all};
use crate::sbi;
use crate::spinlock::Spinlock;

const RING_SIZE: usize = TTY_RING_SIZE;
const LINE_SIZE: usize = TTY_LINE_SIZE;
const BACKSPACE: u8 = 0x7f;

struct Tty {
    ring: [u8; RING_SIZE],
    r: usize,
    w: usize,
    line: [u8; LINE_SIZE],
    llen: usize,
}

impl Tty {
    const fn new() -> Self {
        Tty {
            ring: [0; RING_SIZE],
            r: 0,
            w: 0,
            line: [0; LINE_SIZE],
            llen: 0,
        }
    }

    fn ring_empty(&self) -> bool {
        self.r == self.w
    }

    fn ring_push(&mut self, c: u8) {
        let next = (self.w + 1) % RING_SIZE;
        if next == self.r {
            return; // ring full: drop
        }
        self.ring[self.w] = c;
        self.w = next;
    }

    fn ring_pop(&mut self) -> u8 {
        let c = self.ring[self.r];
        self.r = (self.r + 1) % RING_SIZE;
        c
    }
}

static LOCK: Spinlock = Spinlock::new("console");
static mut TTY: Tty = Tty::new();
static READ_WAIT: u8 = 0;

fn read_chan() -> usize {
    &READ_WAIT as *const u8 as usize
}

fn emit(c: u8) {
    sbi::console_putchar(c);
}

fn echo_erase() {
    emit(0x08);
    emit(b' ');
    emit(0x08);
}

/// ISR entry point: one received byte (see `uart::poll`). Pushes into the
/// ring and echoes, then wakes every reader — ring write must precede the
/// wake (spec's ordering guarantee), which holding `LOCK` across both
/// guarantees under this kernel's push_off/pop_off discipline.
pub fn consoleintr(c: u8) {
    LOCK.acquire();
    unsafe {
        TTY.ring_push(c);
    }
    if c.is_ascii_graphic() || c == b' ' || c == b'\r' || c == b'\n' {
        emit(if c == b'\r' { b'\n' } else { c });
    }
    LOCK.release();
    wake_all(read_chan());
}

/// Canonical-mode read: consume ring bytes into the line buffer, handling
/// backspace/DEL and CR/LF, and hand a completed line back to the caller.
pub fn read(buf: &mut [u8]) -> Result<usize, Errno> {
    if buf.is_empty() {
        return Ok(0);
    }
    LOCK.acquire();
    loop {
        let tty = unsafe { &mut TTY };
        while !tty.ring_empty() {
            let c = tty.ring_pop();
            match c {
                b'\r' | b'\n' => {
                    let n = (tty.llen + 1).min(buf.len());
                    buf[..n.min(tty.llen)].copy_from_slice(&tty.line[..n.min(tty.llen)]);
                    if n > tty.llen {
                        buf[tty.llen] = b'\n';
                    }
                    tty.llen = 0;
                    LOCK.release();
                    return Ok(n);
                }
                0x08 | BACKSPACE => {
                    if tty.llen > 0 {
                        tty.llen -= 1;
                        echo_erase();
                    }
                }
                _ => {
                    if tty.llen < LINE_SIZE {
                        tty.line[tty.llen] = c;
                        tty.llen += 1;
                    }
                }
            }
        }
        sleep_on(read_chan(), &LOCK);
    }
}

pub fn write(buf: &[u8]) -> Result<usize, Errno> {
    for &c in buf {
        emit(c);
    }
    Ok(buf.len())
}
