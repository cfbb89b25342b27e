//! Logging setup for berth binaries.
mod config;
pub use config::LoggerConfig;

mod error;
pub use error::{LoggerError, LoggerResult};

mod format;
pub use format::LoggerFormat;

mod level;
pub use level::LoggerLevel;

mod timer;
pub use timer::{LogTimer, LoggerTimeZone, init_local_offset};

mod init;

/// Install the global tracing subscriber described by `cfg`.
///
/// With [`LoggerTimeZone::Local`], call [`init_local_offset`] first, before any thread is
/// spawned; otherwise timestamps fall back to UTC.
///
/// Fails with [`LoggerError::AlreadyInitialized`] if a global subscriber is already set.
///
/// # Examples
/// ```rust
/// use berth_observe::{LoggerConfig, LoggerFormat, init_logger};
///
/// let config = LoggerConfig {
///     format: LoggerFormat::Json,
///     ..LoggerConfig::default()
/// };
/// init_logger(&config).expect("logger is installed once");
/// assert!(init_logger(&config).is_err());
///
/// tracing::info!("logger initialized");
/// ```
pub fn init_logger(cfg: &LoggerConfig) -> LoggerResult<()> {
    match cfg.format {
        LoggerFormat::Text => init::text(cfg),
        LoggerFormat::Json => init::json(cfg),
        LoggerFormat::Journald => init::journald(cfg),
    }
}
