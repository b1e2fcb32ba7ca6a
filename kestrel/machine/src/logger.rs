//! Kernel console logger.
//!
//! A [`log`] backend that prints one colored line per record on the standard
//! error stream, tagged with the level and the name of the thread that
//! emitted it.
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::Write;

struct Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let thread = std::thread::current();
        let mut stderr = std::io::stderr().lock();
        // A console that can not be written to has nowhere to report it.
        let _ = writeln!(
            stderr,
            "\x1b[{}m[{:>5}] {}: {}\x1b[0m",
            level_to_color_code(record.level()),
            record.level(),
            thread.name().unwrap_or("<unnamed>"),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_to_color_code(level: Level) -> u8 {
    match level {
        Level::Error => 31, // Red
        Level::Warn => 93,  // BrightYellow
        Level::Info => 34,  // Blue
        Level::Debug => 32, // Green
        Level::Trace => 90, // BrightBlack
    }
}

/// The level selected by the `LOG` variable at build time.
///
/// Anything other than `error`, `warn`, `info`, `debug` or `trace` turns
/// logging off.
pub fn default_level() -> LevelFilter {
    match option_env!("LOG") {
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Off,
    }
}

/// Installs the console logger and sets the maximum level.
///
/// Installing twice keeps the first logger but still applies `level`.
pub fn init(level: LevelFilter) {
    static LOGGER: Logger = Logger;
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init(LevelFilter::Warn);
        init(LevelFilter::Debug);
        assert_eq!(log::max_level(), LevelFilter::Debug);
        log::debug!("logger is alive");
    }

    #[test]
    fn colors_are_distinct() {
        let codes = [
            Level::Error,
            Level::Warn,
            Level::Info,
            Level::Debug,
            Level::Trace,
        ]
        .map(level_to_color_code);
        for (i, a) in codes.iter().enumerate() {
            assert!(codes[i + 1..].iter().all(|b| a != b));
        }
    }
}
