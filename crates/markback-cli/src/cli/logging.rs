use std::fs::OpenOptions;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log level filter; defaults to `warn`.
pub const LOG_ENV: &str = "MARKBACK_LOG";
/// When set, logs are appended to this file instead of stderr.
pub const LOG_FILE_ENV: &str = "MARKBACK_LOG_FILE";

pub fn init_logging() {
    let filter = || EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry();

    if let Ok(log_path) = std::env::var(LOG_FILE_ENV) {
        match OpenOptions::new().create(true).append(true).open(&log_path) {
            Ok(file) => {
                let file_layer = fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
                    .with_filter(filter());
                registry.with(file_layer).init();
                return;
            }
            Err(e) => eprintln!("Warning: cannot open log file {}: {}", log_path, e),
        }
    }

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter());
    registry.with(stderr_layer).init();
}
