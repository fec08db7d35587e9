//! Structured logging for the renderer.
//!
//! Span-based, filterable logging via the `tracing` ecosystem: console output
//! with timestamps and module paths, plus JSON file logging in debug builds
//! for frame post-mortems. Respects the log level from the settings file.

use std::path::Path;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vega_config::Settings;

/// Initialize the tracing subscriber.
///
/// Console output carries module paths and uptime timestamps. In debug
/// builds, a JSON copy of the log is written under `log_dir` so a captured
/// frame can be replayed against its log afterwards. `RUST_LOG` overrides
/// everything; otherwise the settings file's `debug.log_level` wins.
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, settings: Option<&Settings>) {
    let filter_str = match settings {
        Some(settings) if !settings.debug.log_level.is_empty() => settings.debug.log_level.clone(),
        _ => "info".to_string(),
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join("vega.log"))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        tracing::info!("json log file at {}", log_dir.join("vega.log").display());
        return;
    }

    subscriber.init();
}

/// The filter used when neither `RUST_LOG` nor the settings file says
/// otherwise.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new("info")
}
