#![no_std]
#![no_main]

mod asm;
mod config;
mod console;
mod errno;
mod exec;
mod file;
mod frame;
mod initrd;
mod logger;
mod memlayout;
mod proc;
mod ramdisk;
mod riscv;
mod sbi;
mod spinlock;
mod string;
mod syscall;
mod trap;
mod uart;
mod vfs;
mod vm;

use core::sync::atomic::{AtomicBool, Ordering};

use proc::cpuid;

#[no_mangle]
extern "C" fn eh_personality() {}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    use core::fmt::Write;
    struct PanicWriter;
    impl Write for PanicWriter {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            console::write(s.as_bytes()).map(|_| ()).map_err(|_| core::fmt::Error)
        }
    }
    if let Some(loc) = info.location() {
        let _ = writeln!(
            PanicWriter,
            "panic at {}:{}: {}",
            loc.file(),
            loc.line(),
            info.message()
        );
    } else {
        let _ = writeln!(PanicWriter, "panic (no location available)");
    }
    abort()
}

#[no_mangle]
extern "C" fn abort() -> ! {
    loop {
        unsafe { core::arch::asm!("wfi") }
    }
}

static STARTED: AtomicBool = AtomicBool::new(false);

/// Called from `asm/entry.S` once per hart, with `tp` already set to the
/// hart id. This kernel only ever brings up hart 0 (spec non-goal: SMP),
/// but the started-barrier shape is kept from the teacher so a later port
/// can raise `NCPU` without restructuring boot.
#[no_mangle]
pub extern "C" fn kmain() -> ! {
    if cpuid() == 0 {
        logger::init();
        log::info!("Claudia kernel booting");

        frame::init();
        log::debug!("frame allocator initialized");

        vm::kvminit().expect("kvminit");
        vm::kvminithart();
        log::debug!("paging enabled");

        trap::trapinit();
        trap::trapinithart();
        log::debug!("trap vectors installed");

        vfs::init();
        log::debug!("vfs initialized");

        proc::scheduler::userinit(initrd::init_image());
        log::debug!("init process created");

        core::sync::atomic::fence(Ordering::SeqCst);
        STARTED.store(true, Ordering::Release);
        log::info!("boot complete");
    } else {
        while !STARTED.load(Ordering::Acquire) {}
        core::sync::atomic::fence(Ordering::SeqCst);
        vm::kvminithart();
        trap::trapinithart();
    }

    proc::scheduler::scheduler();
}
