//! Engine logging: thin macros over the `log` facade.
//!
//! The core never installs a logger or opens a log file; whichever backend the
//! host application registers (`env_logger`, a file sink, a platform logger)
//! receives the records under the `paintcore` target.
//!
//! Usage: anywhere in the crate use the `log_info!` / `log_warn!` /
//! `log_err!` / `log_debug!` macros, or call `crate::logger::write(...)`
//! directly.

pub use log::Level;

/// Log target shared by every record the engine emits.
pub const TARGET: &str = "paintcore";

/// Write a level-tagged line through the `log` facade.
pub fn write(level: Level, msg: &str) {
    log::log!(target: TARGET, level, "{}", msg);
}

/// True when a record at `level` would be kept by the installed logger.
/// Lets hot loops skip building messages nobody will read.
pub fn enabled(level: Level) -> bool {
    log::log_enabled!(target: TARGET, level)
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if $crate::logger::enabled($crate::logger::Level::Debug) {
            $crate::logger::write($crate::logger::Level::Debug, &format!($($arg)*));
        }
    };
}
