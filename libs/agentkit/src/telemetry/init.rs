//! Subscriber installation

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use super::config::{LogFormat, LoggingConfig};

fn build_filter(cfg: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `cfg.level`. Returns `false` when a global subscriber
/// was already installed; the existing one is kept.
#[must_use]
pub fn init_logging(cfg: &LoggingConfig) -> bool {
    let filter = build_filter(cfg);
    let registry = tracing_subscriber::registry().with(filter);

    let result = match cfg.format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(cfg.ansi)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init(),
    };

    match result {
        Ok(()) => {
            tracing::debug!(level = %cfg.level, format = ?cfg.format, "Logging initialized");
            true
        }
        Err(_) => false,
    }
}
