//! # Structured Logging Module
//!
//! Environment-aware structured logging. Console output is always on; a JSON
//! file layer is added when `RUNBOOK_LOG_DIR` is set. Log lines are the only
//! place remediation failures surface, so every outcome goes through here.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::OnceLock;

use chrono::Utc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let console_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(build_filter(&log_level));

        let log_dir = std::env::var("RUNBOOK_LOG_DIR").ok().map(PathBuf::from);
        let (file_layer, guard, log_path) = match log_dir.as_deref().map(|dir| file_writer(dir, &environment)) {
            Some(Ok((writer, guard, path))) => {
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(build_filter(&log_level));
                (Some(layer), Some(guard), Some(path))
            }
            Some(Err(e)) => {
                eprintln!("runbook-listener: file logging disabled: {e}");
                (None, None, None)
            }
            None => (None, None, None),
        };

        // A subscriber may already be installed (tests, embedding); keep it
        if tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_file = log_path.as_ref().map(|p| p.display().to_string()),
            "Structured logging initialized"
        );

        guard
    });
}

/// `RUST_LOG` wins over the environment-derived level
fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn file_writer(
    log_dir: &Path,
    environment: &str,
) -> std::io::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard, PathBuf)> {
    fs::create_dir_all(log_dir)?;
    let file_name = log_file_name(environment);
    let appender = tracing_appender::rolling::never(log_dir, &file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((writer, guard, log_dir.join(file_name)))
}

/// `{environment}.{pid}.{timestamp}.log`
fn log_file_name(environment: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    format!("{}.{}.{}.log", environment, process::id(), timestamp)
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("RUNBOOK_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for one remediation attempt
pub fn log_remediation_operation(
    operation: &str,
    service: Option<&str>,
    receipt_handle: &str,
    status: &str,
    exit_status: Option<i32>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        service = service,
        receipt_handle = %receipt_handle,
        status = %status,
        exit_status = exit_status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "REMEDIATION_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
