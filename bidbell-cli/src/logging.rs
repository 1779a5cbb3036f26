use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{AppError, Result};

/// Used when RUST_LOG is unset.
const DEFAULT_LOG_FILTER: &str = "warn,bidbell=info";

/// Console logging to stderr, plus a daily rolling file when `log_dir` is set.
///
/// Keep the returned guard alive until exit so buffered file output is flushed.
pub fn init_logging(verbose: bool, quiet: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("info,bidbell=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "bidbell.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(verbose)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))?;

    Ok(guard)
}
