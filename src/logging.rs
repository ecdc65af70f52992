use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, time::ChronoLocal};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::Settings;
use crate::{Error, Result};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Sends every event to the run log file in the output folder and INFO and above to
/// stderr. `RUST_LOG` overrides the default filter.
///
/// The returned guard flushes the file writer on drop, keep it alive for the whole run.
pub fn init(settings: &Settings, verbose: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&settings.output_dir)?;
    let appender = tracing_appender::rolling::never(&settings.output_dir, &settings.log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},chromiumoxide=warn,hyper=warn")));
    let timer = ChronoLocal::new(TIME_FORMAT.to_string());

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_timer(timer.clone());
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer)
        .with_filter(LevelFilter::INFO);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;
    Ok(guard)
}
