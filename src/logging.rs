use flexi_logger::{
    detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming,
};

use crate::config::LoggingConfig;
use crate::error::MigrateError;

const LOG_BASENAME: &str = "ewcs-migrate";
const LOG_ROTATE_BYTES: u64 = 10 * 1024 * 1024;
const LOG_FILES_KEPT: usize = 10;

/// Starts the global logger. `RUST_LOG`, when set, overrides the configured level.
///
/// The returned handle must stay alive for the lifetime of the process; dropping it
/// flushes and shuts down the file writer.
pub fn init(config: &LoggingConfig) -> Result<LoggerHandle, MigrateError> {
    let logger = Logger::try_with_env_or_str(&config.level).map_err(logger_error)?;

    let logger = match &config.directory {
        Some(dir) => logger
            .log_to_file(
                FileSpec::default()
                    .directory(dir)
                    .basename(LOG_BASENAME),
            )
            .rotate(
                Criterion::Size(LOG_ROTATE_BYTES),
                Naming::Timestamps,
                Cleanup::KeepLogFiles(LOG_FILES_KEPT),
            )
            .append()
            .duplicate_to_stderr(Duplicate::Warn),
        None => logger.log_to_stderr(),
    };

    logger.format(detailed_format).start().map_err(logger_error)
}

fn logger_error(err: flexi_logger::FlexiLoggerError) -> MigrateError {
    MigrateError::Error(format!("Failed to initialize logging: {}", err))
}
