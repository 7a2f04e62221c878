//! Tracing subscriber setup for binaries.
//!
//! Logs go to stderr so stdout stays clean for JSON output.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{IngestionError, IngestionResult};

/// Install a global subscriber filtered by `log_level`, or `RUST_LOG`, or `info`.
///
/// Fails if the filter does not parse or a global subscriber is already installed.
pub fn init_logging(log_level: Option<&str>, no_color: bool) -> IngestionResult<()> {
    let default_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_str = log_level.unwrap_or(&default_level);

    let env_filter = EnvFilter::try_new(filter_str).map_err(|e| IngestionError::Config {
        message: format!("invalid log filter {filter_str:?}: {e}"),
    })?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(!no_color && std::env::var_os("NO_COLOR").is_none());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| IngestionError::Config {
            message: format!("failed to init logging: {e}"),
        })
}

