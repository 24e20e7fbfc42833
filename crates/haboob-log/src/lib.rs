//! Structured logging for the haboob renderer.
//!
//! Installs a `tracing` subscriber with a human-readable console layer and, in
//! debug builds, a JSON file layer. Library crates that emit `log` records are
//! bridged into the same subscriber. The level comes from `RUST_LOG`, then the
//! config's `debug.log_level`, then [`DEFAULT_FILTER`].

use std::fs::File;
use std::path::{Path, PathBuf};

use haboob_config::Config;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config names a level.
pub const DEFAULT_FILTER: &str = "info,wgpu=warn,naga=warn";

/// Name of the JSON log written in debug builds.
pub const LOG_FILE_NAME: &str = "haboob.log";

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - directory for the JSON log file (debug builds only)
/// * `debug_build` - whether to write the file log
/// * `config` - source of the log level when `RUST_LOG` is unset
///
/// ```no_run
/// use haboob_config::Config;
/// use haboob_log::init_logging;
///
/// let config = Config::default();
/// init_logging(Some(std::path::Path::new("./logs")), true, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let filter_str = filter_directives(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = File::create(log_file_path(log_dir))
    {
        subscriber.with(file_layer(log_file)).init();
        return;
    }

    subscriber.init();
}

/// The filter string `init_logging` uses when `RUST_LOG` is unset.
pub fn filter_directives(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.trim().is_empty() => config.debug.log_level.clone(),
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Create an `EnvFilter` with [`DEFAULT_FILTER`].
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(LOG_FILE_NAME)
}

/// JSON lines without ANSI codes, one object per event.
fn file_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true)
        .with_timer(fmt::time::uptime())
        .json()
}
