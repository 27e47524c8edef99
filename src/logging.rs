//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and files
//! for debugging provider fallback, retry and batch runs.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(EnvFilter::new(log_level));

        let log_dir = PathBuf::from("log");
        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");

        // File output is optional; console logging still works on a read-only filesystem
        let file_layer = match fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
                let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
                // The guard flushes on drop; logging lives for the whole process
                std::mem::forget(guard);
                Some(
                    fmt::layer()
                        .with_writer(file_writer)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_ansi(false)
                        .json()
                        .with_filter(EnvFilter::new(log_level)),
                )
            }
            Err(_) => None,
        };

        let file_enabled = file_layer.is_some();
        let subscriber = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_dir.join(&log_filename).display(),
            file_enabled = file_enabled,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("TEXTFLOW_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for provider calls
pub fn log_provider_operation(
    operation: &str,
    provider_id: &str,
    task_kind: &str,
    status: &str,
    attempts: Option<u32>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        provider_id = %provider_id,
        task_kind = %task_kind,
        status = %status,
        attempts = attempts,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🤖 PROVIDER_OPERATION"
    );
}

/// Log structured data for cache operations
pub fn log_cache_operation(operation: &str, key: &str, status: &str, details: Option<&str>) {
    tracing::debug!(
        operation = %operation,
        key = %key,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "💾 CACHE_OPERATION"
    );
}

/// Log structured data for batch progress
pub fn log_batch_operation(
    operation: &str,
    batch_index: usize,
    total_batches: usize,
    completed_units: usize,
    total_units: usize,
    errors: usize,
) {
    tracing::info!(
        operation = %operation,
        batch_index = batch_index,
        total_batches = total_batches,
        completed_units = completed_units,
        total_units = total_units,
        errors = errors,
        timestamp = %Utc::now().to_rfc3339(),
        "📦 BATCH_OPERATION"
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
        "❌ ERROR"
    );
}
