use crate::qemu_fmt::QemuSink;
use core::fmt::{self, Write};
use kernel_sync::SyncOnceCell;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

static LOGGER: SyncOnceCell<QemuLogger> = SyncOnceCell::new();

pub struct QemuLogger {
    max_level: LevelFilter,
}

impl QemuLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Install as the global logger. Call this once during early init.
    ///
    /// # Errors
    /// Fails if a logger (this or any other) is already installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        let max_level = self.max_level;
        let logger = LOGGER.get_or_init(|| self);
        log::set_logger(logger)?;
        log::set_max_level(max_level);
        Ok(())
    }
}

/// Format `record` as `[LEVEL] target: message\n` into `w`.
///
/// # Errors
/// Propagates errors of the underlying writer.
pub fn write_record(w: &mut impl Write, record: &Record) -> fmt::Result {
    writeln!(w, "[{}] {}: {}", record.level(), record.target(), record.args())
}

impl Log for QemuLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _ = write_record(&mut QemuSink, record);
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn formats_level_target_and_message() {
        let mut out = String::new();
        let record = Record::builder()
            .level(Level::Warn)
            .target("kernel::fault")
            .args(format_args!("pid {} terminated", 7))
            .build();
        write_record(&mut out, &record).unwrap();
        assert_eq!(out, "[WARN] kernel::fault: pid 7 terminated\n");
    }

    #[test]
    fn filters_by_level() {
        let logger = QemuLogger::new(LevelFilter::Info);
        let debug = Metadata::builder().level(Level::Debug).build();
        let error = Metadata::builder().level(Level::Error).build();
        assert!(!logger.enabled(&debug));
        assert!(logger.enabled(&error));
    }
}
