//! Tracing subscriber setup for the binary

use std::ffi::OsStr;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;

/// Installs the global subscriber.
///
/// RUST_LOG takes precedence over `config.level`. The returned guard flushes
/// buffered lines on drop and must be held until the program exits.
pub fn init_logging(config: &LogConfig) -> Result<WorkerGuard, TryInitError> {
    let (writer, guard) = match &config.file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let prefix = path.file_name().unwrap_or(OsStr::new("depwatch.log"));
            tracing_appender::non_blocking(tracing_appender::rolling::daily(directory, prefix))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(config.file.is_none());
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry.with(layer.json()).try_init()?;
    } else {
        registry.with(layer).try_init()?;
    }

    Ok(guard)
}
