use crate::models::LoggingConfig;
use anyhow::{Context, Result};
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup logging with a daily rotating file appender and optional console output.
///
/// # Arguments
/// * `config` - Log directory, file prefix, verbosity and console switch
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging
/// active. Fails if the directory cannot be created or a global subscriber is
/// already installed.
pub fn setup_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    if !config.log_dir.exists() {
        fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("Failed to create log directory: {}", config.log_dir))?;
    }

    let file_appender = rolling::daily(&config.log_dir, &config.log_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    let registry = tracing_subscriber::registry()
        .with(env_filter(config.debug_mode))
        .with(file_layer);

    if config.console {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_thread_names(true);
        registry
            .with(console_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
    } else {
        registry
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}",
        config.log_dir,
        config.log_prefix,
        config.debug_mode,
        config.console
    );

    Ok(guard)
}

fn env_filter(debug_mode: bool) -> EnvFilter {
    if debug_mode {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    }
}
