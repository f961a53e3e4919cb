//! Logging for the NovaDE compositing engine.
//!
//! Built on `tracing`: a console layer (text or JSON) plus an optional
//! daily-rolling file layer through `tracing-appender`.

use crate::config::LoggingConfig;
use crate::error::{CoreError, LoggingError};
use crate::utils;

use once_cell::sync::Lazy;
use std::io::stdout;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Keeps the file writer's guard alive so buffered lines get flushed.
static LOG_WORKER_GUARD: Lazy<Mutex<Option<WorkerGuard>>> = Lazy::new(|| Mutex::new(None));

/// Installs an `EnvFilter`-driven (`RUST_LOG`, default `info`) subscriber
/// writing to `stderr`. Meant for tests, early startup and as the fallback
/// when the configured logging cannot be set up. Does nothing if a global
/// subscriber already exists.
pub fn init_minimal_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    let _ = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .try_init();
}

fn parse_level(level: &str) -> Result<Level, LoggingError> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(LoggingError::InvalidLevel(other.to_string())),
    }
}

/// Creates the daily-rolling file layer, creating the parent directory
/// first.
fn create_file_layer(log_path: &Path, format: &str) -> Result<(BoxedLayer, WorkerGuard), CoreError> {
    let directory = match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    utils::fs::ensure_dir_exists(directory)?;

    let file_name = log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("compositor.log"));
    let file_appender = tracing_appender::rolling::daily(directory, file_name);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let layer = match format {
        "json" => fmt::layer().json().with_writer(non_blocking_writer).with_ansi(false).boxed(),
        _ => fmt::layer().with_writer(non_blocking_writer).with_ansi(false).boxed(),
    };
    Ok((layer, guard))
}

/// Installs the global subscriber described by `config`.
///
/// With `is_reload` set, failing to replace an already installed subscriber
/// is reported on stderr instead of returned, since `tracing` has no way to
/// swap the global default.
pub fn init_logging(config: &LoggingConfig, is_reload: bool) -> Result<(), CoreError> {
    let level = parse_level(&config.level)?;
    let format = config.format.to_lowercase();

    let stdout_layer = match format.as_str() {
        "json" => fmt::layer()
            .json()
            .with_writer(stdout)
            .with_ansi(false)
            .with_filter(EnvFilter::new(level.to_string()))
            .boxed(),
        _ => fmt::layer()
            .with_writer(stdout)
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_filter(EnvFilter::new(level.to_string()))
            .boxed(),
    };

    let mut layers: Vec<BoxedLayer> = vec![stdout_layer];
    let mut new_file_guard = None;
    if let Some(log_path) = &config.file_path {
        let (file_layer, guard) = create_file_layer(log_path, &format)?;
        layers.push(file_layer.with_filter(EnvFilter::new(level.to_string())).boxed());
        new_file_guard = Some(guard);
    }

    let result = Registry::default().with(layers).try_init();

    match LOG_WORKER_GUARD.lock() {
        Ok(mut guard_slot) => *guard_slot = new_file_guard,
        Err(e) => eprintln!("[ERROR] Failed to lock LOG_WORKER_GUARD: {}. Log flushing may be affected.", e),
    }

    match result {
        Ok(()) => Ok(()),
        Err(e) if is_reload => {
            eprintln!("[INFO] Logging reload requested; the previous subscriber stays installed: {}", e);
            Ok(())
        }
        Err(e) => Err(CoreError::Logging(LoggingError::InitializationFailure(format!(
            "Failed to set global tracing subscriber. Was it already initialized? Error: {}",
            e
        )))),
    }
}
