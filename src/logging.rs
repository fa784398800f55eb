use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber
///
/// The filter comes from the command line override, then `RUST_LOG`, then
/// the configured level. Logs go to stdout and, when enabled, to a file.
pub fn init(config: &LoggingConfig, level_override: Option<&str>) -> anyhow::Result<()> {
    let filter = match level_override {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))?,
    };

    let file_layer = if config.log_to_file {
        let file = std::fs::File::create(&config.log_file_path)
            .with_context(|| format!("Cannot create log file {}", config.log_file_path))?;
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_writer(Arc::new(file)),
        )
    } else {
        None
    };

    let stdout_layer = fmt::layer().with_file(true).with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;
    Ok(())
}
