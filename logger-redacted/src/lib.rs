//! Logging bootstrap with automatic patient identifier redaction
//!
//! The reconciliation engine logs device ids, patient ids and alert messages
//! as structured `tracing` fields. Patient identifiers and anything that looks
//! like PHI must never reach a log sink verbatim, so every formatted line is
//! passed through [`PiiRedactor`] by [`RedactingMakeWriter`] before it is
//! written.
//!
//! # Detected Data Types
//!
//! - **Sensitive fields**: `patient_id=P-1042` → `patient_id=ID[Hk3...]`
//! - **Medical Record Numbers**: `MRN123456` → `MRN[REDACTED]`
//! - **Names**: `Patient John Smith` → `Patient [NAME]`
//! - **Email Addresses**: `user@example.com` → `u***@e***`
//! - **Phone Numbers**: `(555) 123-4567` → `(***) ***-****`
//! - **Custom Patterns**: configurable organization-specific patterns
//!
//! # Example
//!
//! ```rust,no_run
//! use logger_redacted::{init, LoggerConfig};
//!
//! let _guard = init(&LoggerConfig::default()).expect("logger");
//! tracing::info!(patient_id = "P-1042", "vitals resolved");
//! // Output: "... vitals resolved patient_id=ID[...]"
//! ```

pub mod config;
pub mod redactor;
pub mod writer;

pub use config::*;
pub use redactor::*;
pub use writer::*;

use std::sync::Arc;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Invalid redaction pattern: {0}")]
    Pattern(String),

    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Keeps the background file writer alive; drop it last
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global `tracing` subscriber described by `config`
///
/// `RUST_LOG` overrides `config.log_level` when set.
pub fn init(config: &LoggerConfig) -> Result<LoggingGuard, LoggerError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| LoggerError::Filter(e.to_string()))?,
    };

    let (base_writer, file_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, format!("{}.log", config.service_name));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(writer), Some(guard))
        }
        None if config.stderr => (BoxMakeWriter::new(std::io::stderr), None),
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let writer = if config.redaction_enabled {
        let redactor = PiiRedactor::new(RedactionConfig {
            hash_for_correlation: config.hash_for_correlation,
            sensitive_fields: config.sensitive_fields.clone(),
            ..Default::default()
        })?;
        BoxMakeWriter::new(RedactingMakeWriter::new(base_writer, Arc::new(redactor)))
    } else {
        base_writer
    };

    let format_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(config.log_dir.is_none() && !config.redaction_enabled)
            .boxed(),
        LogFormat::Bunyan => JsonStorageLayer
            .and_then(BunyanFormattingLayer::new(config.service_name.clone(), writer))
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(format_layer)
        .with(filter)
        .try_init()
        .map_err(|e| LoggerError::AlreadyInitialized(e.to_string()))?;

    tracing::debug!(
        format = ?config.format,
        redaction = config.redaction_enabled,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
