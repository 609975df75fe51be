//! Pluggable logging sink for keyring diagnostics.

use std::sync::{Arc, OnceLock};

/// Receives log records emitted by the keyring.
///
/// Implement this on the host side to route keyring logs into the
/// application's own logging system. Records never contain passwords, keys
/// or phrases; addresses may appear.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use keyring_core::logger::{set_logger, LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
///
/// set_logger(Arc::new(StderrLogger));
/// ```
pub trait Logger: Sync + Send {
    /// Logs a message at the specified level.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Very low priority, extremely detailed messages.
    Trace,
    /// Debugging information.
    Debug,
    /// Progress of normal operations.
    Info,
    /// Potentially harmful situations, e.g. a failed unlock.
    Warn,
    /// Errors that still allow the application to continue.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

/// `log::Log` adapter that forwards records to the installed [`Logger`].
struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !should_forward(record.level(), record.module_path()) {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(record.level().into(), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

/// Debug and Trace records are only forwarded from keyring modules.
fn should_forward(level: log::Level, module_path: Option<&str>) -> bool {
    let is_from_keyring = module_path.is_some_and(|path| path.starts_with("keyring"));
    let is_debug_or_trace = matches!(level, log::Level::Debug | log::Level::Trace);
    is_from_keyring || !is_debug_or_trace
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Installs the host logger and registers the `log` facade adapter.
///
/// Only the first call has an effect; later calls are reported on stderr
/// and otherwise ignored.
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
    }

    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}
