use chrono::Local;
use log::{Level, Log, SetLoggerError, set_logger, set_max_level};

/// Timestamped stdout logger for the citrine binaries.
pub struct CitrineLogger;

static LOGGER: CitrineLogger = CitrineLogger;

impl CitrineLogger {
    /// Installs the logger as the global `log` backend.
    ///
    /// Records above `max_level` are dropped before formatting.
    pub fn init(max_level: Level) -> Result<(), SetLoggerError> {
        set_logger(&LOGGER)?;
        set_max_level(max_level.to_level_filter());
        Ok(())
    }
}

impl Log for CitrineLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let now = Local::now();
            println!(
                "{} {} [{}] {}",
                now.format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}
