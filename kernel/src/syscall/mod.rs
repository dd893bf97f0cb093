//! System-call dispatch (spec §4.5, §6). Reworked from the teacher's
//! `syscall/syscall.rs`, which kept argument-fetch helpers
//! (`argaddr`/`argint`/`argstr`/`fetchaddr`/`fetchstr`) alongside a
//! fixed-size `[Option<fn() -> u64>; N]` table indexed by small syscall
//! numbers 1..21. The argument-fetch shape is kept, but dispatch is a
//! `match` instead of an array: the normative numbers spec §6 requires
//! range up to 1062 (`time`), far too sparse for a literal table.

pub mod sysfile;
pub mod sysproc;

use crate::config::MAXPATH;
use crate::errno::Errno;
use crate::proc::myproc;
use crate::vm;

pub const SYS_GETCWD: u64 = 17;
pub const SYS_DUP: u64 = 23;
pub const SYS_DUP3: u64 = 24;
pub const SYS_MKDIRAT: u64 = 34;
pub const SYS_UNLINKAT: u64 = 35;
pub const SYS_CHDIR: u64 = 49;
pub const SYS_OPENAT: u64 = 56;
pub const SYS_CLOSE: u64 = 57;
pub const SYS_GETDENTS64: u64 = 61;
pub const SYS_LSEEK: u64 = 62;
pub const SYS_READ: u64 = 63;
pub const SYS_WRITE: u64 = 64;
pub const SYS_FSTATAT: u64 = 79;
pub const SYS_FSTAT: u64 = 80;
pub const SYS_EXIT: u64 = 93;
pub const SYS_NANOSLEEP: u64 = 101;
pub const SYS_GETPPID: u64 = 110;
pub const SYS_CLOCK_GETTIME: u64 = 113;
pub const SYS_SCHED_YIELD: u64 = 124;
pub const SYS_KILL: u64 = 129;
pub const SYS_RT_SIGACTION: u64 = 134;
pub const SYS_SETGID: u64 = 144;
pub const SYS_SETUID: u64 = 146;
pub const SYS_GETPID: u64 = 172;
pub const SYS_GETUID: u64 = 174;
pub const SYS_GETEUID: u64 = 175;
pub const SYS_GETGID: u64 = 176;
pub const SYS_GETEGID: u64 = 177;
pub const SYS_BRK: u64 = 214;
pub const SYS_CLONE: u64 = 220;
pub const SYS_EXECVE: u64 = 221;
pub const SYS_WAIT4: u64 = 260;
pub const SYS_TIME: u64 = 1062;

/// Fetch the nth 64-bit syscall argument (`a0..a5`) from the current
/// process's trap frame.
fn argraw(n: u8) -> u64 {
    let tf = myproc().trapframe();
    match n {
        0 => tf.a0,
        1 => tf.a1,
        2 => tf.a2,
        3 => tf.a3,
        4 => tf.a4,
        5 => tf.a5,
        _ => panic!("argraw: argument index out of range"),
    }
}

pub fn argaddr(n: u8) -> usize {
    argraw(n) as usize
}

pub fn argint(n: u8) -> i32 {
    argraw(n) as i32
}

/// Copy the nth argument, read as a user NUL-terminated string pointer,
/// into `buf`.
pub fn argstr(n: u8, buf: &mut [u8]) -> Result<usize, Errno> {
    let addr = argaddr(n);
    vm::copy_in_str(myproc().pagetable(), buf, addr)
}

pub fn argpath(n: u8) -> Result<[u8; MAXPATH], Errno> {
    let mut buf = [0u8; MAXPATH];
    argstr(n, &mut buf)?;
    Ok(buf)
}

pub fn path_str(buf: &[u8; MAXPATH]) -> &str {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    core::str::from_utf8(&buf[..len]).unwrap_or("")
}

/// Dispatch the syscall named in `a7`, writing its return value (negative
/// errno on failure, per the Linux RISC-V ABI) into `a0`.
pub fn syscall() {
    let num = myproc().trapframe().a7;
    let ret: i64 = match num {
        SYS_READ => sysfile::sys_read(),
        SYS_WRITE => sysfile::sys_write(),
        SYS_OPENAT => sysfile::sys_openat(),
        SYS_CLOSE => sysfile::sys_close(),
        SYS_LSEEK => sysfile::sys_lseek(),
        SYS_FSTAT => sysfile::sys_fstat(),
        SYS_FSTATAT => sysfile::sys_fstatat(),
        SYS_DUP => sysfile::sys_dup(),
        SYS_DUP3 => sysfile::sys_dup3(),
        SYS_GETDENTS64 => sysfile::sys_getdents64(),
        SYS_MKDIRAT => sysfile::sys_mkdirat(),
        SYS_UNLINKAT => sysfile::sys_unlinkat(),
        SYS_GETCWD => sysfile::sys_getcwd(),
        SYS_CHDIR => sysfile::sys_chdir(),

        SYS_CLONE => sysproc::sys_clone(),
        SYS_EXECVE => sysproc::sys_execve(),
        SYS_EXIT => sysproc::sys_exit(),
        SYS_WAIT4 => sysproc::sys_wait4(),
        SYS_GETPID => sysproc::sys_getpid(),
        SYS_GETPPID => sysproc::sys_getppid(),
        SYS_GETUID | SYS_GETEUID | SYS_GETGID | SYS_GETEGID => 0,
        SYS_SETUID | SYS_SETGID => 0,
        SYS_SCHED_YIELD => sysproc::sys_sched_yield(),
        SYS_BRK => sysproc::sys_brk(),
        SYS_NANOSLEEP => sysproc::sys_nanosleep(),
        SYS_CLOCK_GETTIME => sysproc::sys_clock_gettime(),
        SYS_TIME => sysproc::sys_time(),

        // rt_sigaction/kill: accepted as no-ops rather than ENOSYS, since
        // userland's libc init sequence probes for them unconditionally
        // (spec non-goal: signals).
        SYS_KILL | SYS_RT_SIGACTION => 0,

        _ => {
            log::warn!("pid {}: unknown syscall {}", myproc().pid, num);
            Errno::NoSys.to_retval()
        }
    };
    myproc().trapframe().a0 = ret as u64;
}
