//! Tracing initialization.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::settings::LoggingConfig;

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this more
/// than once keeps the first subscriber.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(level = %config.level, format = ?config.format, "tracing initialized");
    }
}
