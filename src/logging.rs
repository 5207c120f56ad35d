//! Logger implementation for the log crate.
//!
//! Records are formatted with a level colour and their source location and
//! handed to a console sink the platform registers with [`init`].

use core::fmt::{self, Display};

use lazyinit::LazyInit;
use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::error::TinyResult;

/// Console output supplied by the platform.
pub type ConsoleSink = fn(fmt::Arguments);

static SINK: LazyInit<ConsoleSink> = LazyInit::new();

pub struct SimpleLogger;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorCode {
    Red = 31,
    Green = 32,
    Yellow = 33,
    Cyan = 36,
    BrightBlack = 90,
}

impl Display for ColorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\u{1B}[{}m", *self as u8)
    }
}

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Some(sink) = SINK.get() else {
            return;
        };

        let level = record.level();
        let file = record.file().unwrap_or("none");
        let line = record.line().unwrap_or(0);
        let args = record.args();
        let color_reset = "\u{1B}[0m";

        let args_color = match level {
            Level::Error => ColorCode::Red,
            Level::Warn => ColorCode::Yellow,
            Level::Info => ColorCode::Green,
            Level::Debug => ColorCode::Cyan,
            Level::Trace => ColorCode::BrightBlack,
        };

        sink(format_args!(
            "[{level:<5} {file}:{line}] {args_color}{args}{color_reset}\n"
        ));
    }

    fn flush(&self) {}
}

/// Level selected by the `LOG` variable at build time; off when unset.
pub fn level_from_env() -> LevelFilter {
    match option_env!("LOG") {
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Off,
    }
}

/// Initialize the logger at the build-time level.
pub fn init(sink: ConsoleSink) -> TinyResult<()> {
    init_with_level(sink, level_from_env())
}

/// Initialize the logger at an explicit level.
pub fn init_with_level(sink: ConsoleSink, level: LevelFilter) -> TinyResult<()> {
    anyhow::ensure!(!SINK.is_inited(), "the console sink is already registered");
    log::set_logger(&SimpleLogger).map_err(|_| anyhow::anyhow!("a logger is already installed"))?;
    SINK.init_once(sink);
    log::set_max_level(level);
    Ok(())
}
