//! The errno vocabulary from spec §6/§7, returned as `Err` from fallible
//! kernel operations instead of raw sentinel integers.

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(i32)]
pub enum Errno {
    Perm = 1,
    NoEnt = 2,
    Srch = 3,
    Io = 5,
    BadF = 9,
    Child = 10,
    Again = 11,
    NoMem = 12,
    Fault = 14,
    Busy = 16,
    Exist = 17,
    NotDir = 20,
    IsDir = 21,
    Inval = 22,
    NFile = 23,
    MFile = 24,
    NotTy = 25,
    SPipe = 29,
    NoSpc = 28,
    NameTooLong = 36,
    NoSys = 38,
    Dom = 33,
    NotSup = 95,
}

impl Errno {
    /// Negative-errno form expected in `a0` by the Linux RISC-V syscall ABI.
    pub const fn to_retval(self) -> i64 {
        -(self as i32 as i64)
    }
}

pub type KResult<T> = Result<T, Errno>;
