use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;

/// Initialize tracing with stdout output and, when `dir` is set, a daily
/// rolling file in logfmt or JSON.
///
/// `RUST_LOG` overrides the configured filter. The returned guard flushes the
/// file writer on drop and must be held for the life of the process. Calling
/// this twice is harmless; the second subscriber is simply not installed.
pub fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Console layer (stdout for dev visibility)
    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_level(true);

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            // Log file = {dir}/vrf.log.{date}
            let file_appender = rolling::daily(dir, "vrf.log");
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
            let layer = if config.json {
                fmt::layer()
                    .json()
                    .with_writer(non_blocking_file)
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_level(true)
                    .boxed()
            } else {
                fmt::layer()
                    .with_writer(non_blocking_file)
                    .with_target(false)
                    .with_ansi(false)
                    .with_level(true)
                    .boxed()
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
    guard
}
