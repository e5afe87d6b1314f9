//! Logging setup

use crate::config::LoggingSettings;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log file name prefix inside the configured directory
const LOG_FILE_PREFIX: &str = "transcription-hub.log";

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured filter. When a log
/// directory is set, output is also written to a daily rolling file; keep the
/// returned guard alive so buffered lines are flushed on exit.
pub fn init_logging(settings: &LoggingSettings) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.filter));

    let (file_layer, guard) = match &settings.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();

    match installed {
        Ok(()) => {
            if let Some(directory) = &settings.directory {
                tracing::info!("Logging to {:?}", directory);
            }
            guard
        }
        Err(e) => {
            tracing::debug!("Tracing subscriber already installed: {}", e);
            None
        }
    }
}
