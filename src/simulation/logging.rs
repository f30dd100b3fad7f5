use std::io;
use std::path::Path;
use tracing::dispatcher::DefaultGuard;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;
use tracing_subscriber::{fmt, registry};

use crate::simulation::config::Logging;

// This is a helper struct to store the logger guards. When they are dropped, logging can be reset.
#[allow(dead_code)]
pub struct LogGuards {
    log_guard: Option<WorkerGuard>,
    default: DefaultGuard,
}

pub fn init_std_out_logging_thread_local() -> DefaultGuard {
    let collector = tracing_subscriber::registry().with(
        fmt::Layer::new()
            .with_writer(io::stdout)
            .with_filter(LevelFilter::INFO),
    );
    tracing::subscriber::set_default(collector)
}

/// Logging of the thread executing the run with `n_cars` cars. Writes to stdout and, if
/// requested, json lines to `log_cars_{n_cars}.txt` in `dir`.
pub fn init_logging(logging: &Logging, dir: &Path, n_cars: usize) -> LogGuards {
    let (log_layer, log_guard) = if Logging::Info == *logging {
        let log_file_name = format!("log_cars_{n_cars}.txt");
        let log_file_appender = rolling::never(dir, log_file_name);
        let (log_file, log_guard) = non_blocking(log_file_appender);
        let layer = fmt::Layer::new()
            .with_writer(log_file)
            .json()
            .with_ansi(false)
            .with_filter(LevelFilter::INFO);
        (Some(layer), Some(log_guard))
    } else {
        (None, None)
    };

    let console_layer = fmt::layer()
        .with_writer(io::stdout)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(LevelFilter::INFO);

    // If the log layer is None, it is not added.
    let collector = registry().with(log_layer).with(console_layer);

    let default = tracing::subscriber::set_default(collector);

    LogGuards { log_guard, default }
}
