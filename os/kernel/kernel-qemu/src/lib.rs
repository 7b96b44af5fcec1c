//! # QEMU Debug Console Logging
//!
//! A `log` backend for kernels running under QEMU. Records are formatted
//! without allocation as `[LEVEL] target: message` and written byte by byte
//! to the debug console port (`-debugcon stdio` on the host side).
//!
//! ```rust,no_run
//! use kernel_qemu::QemuLogger;
//! use log::{LevelFilter, info};
//!
//! QemuLogger::new(LevelFilter::Debug).init().ok();
//! info!("paging enabled");
//! ```
//!
//! Port I/O is only compiled for bare-metal x86 with the `enabled` feature;
//! everywhere else the sink discards its input, so dependent crates can log
//! freely in host tests.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::{QemuLogger, write_record};

#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    /// The port number of QEMU's `isa-debugcon` device.
    pub const QEMU_DEBUG_PORT: u16 = 0xE9;

    /// Write a single byte to QEMU's debug port.
    #[cfg(all(feature = "enabled", target_arch = "x86", target_os = "none"))]
    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn dbg_putc(c: u8) {
        // SAFETY: port 0xE9 is QEMU's debug console; writing has no other effect
        unsafe {
            core::arch::asm!(
            "out dx, al",
            in("dx") QEMU_DEBUG_PORT,
            in("al") c,
            options(nomem, nostack, preserves_flags)
            );
        }
    }

    #[cfg(not(all(feature = "enabled", target_arch = "x86", target_os = "none")))]
    #[inline]
    pub const fn dbg_putc(_c: u8) {}

    pub struct QemuSink;

    impl Write for QemuSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for b in s.bytes() {
                dbg_putc(b);
            }
            Ok(())
        }
    }

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best-effort debug output.
        let _ = fmt::write(&mut QemuSink, args);
    }
}

#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
