//! Structured logging configuration.
//!
//! - JSON output for production (`LOG_FORMAT=json`), human-readable text
//!   otherwise.
//! - Level filter from `LOG_LEVEL`, falling back to `RUST_LOG`, default
//!   `info`.
//! - Optional rolling file output when `LOG_FILE` is set; `LOG_ROTATION`
//!   selects `daily` (default), `hourly`, or `never`. Pruning of old files
//!   (`LOG_RETENTION`) is left to external log management.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Initialize logging for the given service.
///
/// Returns a guard that must be kept alive for the lifetime of the process
/// when file output is enabled; dropping it flushes and stops the writer.
pub fn init_logging(service_name: &str) -> Option<WorkerGuard> {
    let env_filter = env_filter();
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let (file_layer, guard) = match std::env::var("LOG_FILE") {
        Ok(path) if !path.is_empty() => {
            let appender = file_appender(&path);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    let stdout_layer = if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .flatten_event(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).with_ansi(true).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    tracing::info!(service = service_name, "logging initialized");
    guard
}

fn env_filter() -> EnvFilter {
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        if let Ok(filter) = EnvFilter::try_new(level.to_lowercase()) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn file_appender(path: &str) -> rolling::RollingFileAppender {
    let path = std::path::Path::new(path);
    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "service.log".to_string());

    let rotation = std::env::var("LOG_ROTATION").unwrap_or_default();
    match rotation.to_lowercase().as_str() {
        "hourly" => rolling::hourly(dir, file_name),
        "never" => rolling::never(dir, file_name),
        _ => rolling::daily(dir, file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        drop(filter);
    }
}
