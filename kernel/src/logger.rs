//! Wires the `log` crate (already part of the teacher's dependency stack,
//! but never actually connected — the teacher's own `debug_log!` macro was
//! gated on a `cfg(log_level = "debug")` that nothing ever set, so it was
//! dead code) to the console sink as the kernel's real logging facade.

use core::fmt::Write;
use log::{Level, LevelFilter, Log, Metadata, Record};

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

/// Adapts `console::write`'s byte-slice/`Result<usize, Errno>` shape to
/// `core::fmt::Write`, so `writeln!` can target it directly.
struct ConsoleWriter;

impl Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        crate::console::write(s.as_bytes()).map(|_| ()).map_err(|_| core::fmt::Error)
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level_tag = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        let _ = writeln!(ConsoleWriter, "[{}] {}", level_tag, record.args());
    }

    fn flush(&self) {}
}

const fn max_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Info
    }
}

pub fn init() {
    log::set_logger(&LOGGER).expect("logger already set");
    log::set_max_level(max_level());
}
