use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_DIR: &str = "logs";

/// Initializes console output plus a daily-rotated JSON log file.
///
/// Span fields (notably `trace_id`) are carried into every JSON line. Keep
/// the returned guard alive until exit so buffered lines get flushed.
pub fn init_logging() -> WorkerGuard {
    let log_dir = std::env::var("INGEST_LOG_DIR").unwrap_or_else(|_| DEFAULT_LOG_DIR.to_string());
    // Ensure logs directory exists
    let _ = fs::create_dir_all(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, "ingest.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_writer);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stdout);

    // Respect RUST_LOG if set; otherwise info for our crate
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("brasil_api_ingest=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}
