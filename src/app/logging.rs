//! Usage: Process-wide tracing setup (stderr + optional daily-rolling file, `log` bridge, panic hook).

use crate::shared::error::AppResult;
use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

pub const DEFAULT_FILTER: &str = "info,webview_native_auth_lib=debug";
pub const LOG_FILE_PREFIX: &str = "webview-native-auth.log";

/// Keeps the non-blocking file writer alive; dropping it flushes pending lines.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard")
            .field("file", &self._file.is_some())
            .finish()
    }
}

fn env_filter() -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(DEFAULT_FILTER),
    }
}

/// Installs the global subscriber. Call once, early; a second call fails.
pub fn init(log_dir: Option<&Path>) -> AppResult<LoggingGuard> {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    let (file_layer, file_guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                format!(
                    "SYSTEM_ERROR: failed to create log dir {}: {e}",
                    dir.display()
                )
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default()
        .with(env_filter())
        .with(stderr_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("SYSTEM_ERROR: tracing subscriber already installed: {e}"))?;

    if let Err(err) = tracing_log::LogTracer::init() {
        tracing::debug!("log bridge not installed: {err}");
    }

    install_panic_hook();
    tracing::debug!(
        file_logging = file_guard.is_some(),
        "logging initialized"
    );

    Ok(LoggingGuard { _file: file_guard })
}

fn install_panic_hook() {
    // Payload is not logged; it can carry request data.
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        tracing::error!(location = %location, "PANIC: panicked at {location}");
        previous(panic_info);
    }));
}
