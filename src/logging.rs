//! Tracing bootstrap for applications embedding the adapter.
//!
//! Environment variables take precedence over the config file:
//! - `ADAPTER_TRACE_LEVEL` - filter directive (e.g. `engine_adapter=debug`)
//! - `ADAPTER_TRACE_JSON` - `1` for JSON lines, `0` for compact text
//! - `ADAPTER_TRACE_FILE` - append to this file instead of stderr

use std::env;
use std::sync::OnceLock;

use crate::config::LoggingConfig;

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Install a global tracing subscriber. Returns `false` if one was already set.
pub fn init_tracing(logging_config: &LoggingConfig) -> bool {
    let json = env::var("ADAPTER_TRACE_JSON")
        .ok()
        .map_or_else(|| logging_config.format == "json", |v| v != "0");

    let level = env::var("ADAPTER_TRACE_LEVEL")
        .ok()
        .unwrap_or_else(|| logging_config.level.clone());

    let log_path = env::var("ADAPTER_TRACE_FILE")
        .ok()
        .or_else(|| logging_config.file.clone());

    let (writer, guard) = match log_path {
        Some(path) => match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            Ok(file) => tracing_appender::non_blocking(file),
            Err(e) => {
                eprintln!("ERROR: Unable to open trace file '{path}': {e}");
                tracing_appender::non_blocking(std::io::stderr())
            }
        },
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let filter = tracing_subscriber::EnvFilter::try_new(&level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let base = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_thread_names(true)
        .with_writer(writer)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if json {
        Box::new(base.json().finish())
    } else {
        Box::new(base.compact().finish())
    };

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }
    let _ = TRACE_GUARD.set(guard);
    true
}
