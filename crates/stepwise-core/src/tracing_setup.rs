use std::fs::OpenOptions;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global subscriber.
///
/// `STEPWISE_LOG` sets the filter (default `warn`). When `STEPWISE_LOG_FILE`
/// is set, logs go to that file at debug level instead of stderr so they
/// don't interleave with streamed replies.
pub fn init_tracing(service_name: &str) -> Result<()> {
    let file_logging = std::env::var("STEPWISE_LOG_FILE").ok();
    let filter = EnvFilter::try_from_env("STEPWISE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    if let Some(log_path) = file_logging {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file {}", log_path))?;

        let file_layer = fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(tracing_subscriber::filter::LevelFilter::DEBUG);

        tracing_subscriber::registry()
            .with(file_layer)
            .try_init()
            .context("Tracing subscriber already installed")?;
        tracing::info!(service = service_name, "file logging enabled");
    } else {
        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(stderr_layer)
            .try_init()
            .context("Tracing subscriber already installed")?;
    }
    Ok(())
}
