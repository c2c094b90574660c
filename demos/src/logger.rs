//! Terminal logger for the `blinky` binary.
//!
//! Demo console lines (target `console`) are printed as-is; everything else
//! gets a level-coloured prefix and its target.

use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

struct TerminalLogger {
    level: LevelFilter,
}

impl Log for TerminalLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if record.target() == "console" {
            println!("{}", record.args());
            return;
        }

        let level = match record.level() {
            Level::Error => "ERROR".red().bold(),
            Level::Warn => " WARN".yellow().bold(),
            Level::Info => " INFO".green(),
            Level::Debug => "DEBUG".bright_blue(),
            Level::Trace => "TRACE".dimmed(),
        };
        println!("{level} {} {}", record.target().dimmed(), record.args());
    }

    fn flush(&self) {}
}

pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(TerminalLogger { level }))?;
    log::set_max_level(level);
    Ok(())
}
