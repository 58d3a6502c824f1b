// Logger configuration
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output encoding for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable single-line output
    #[default]
    Pretty,
    /// Bunyan-compatible JSON, one object per line
    Bunyan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub redaction_enabled: bool,
    /// Replace redacted values with a short hash instead of a fixed mask
    pub hash_for_correlation: bool,
    pub log_level: String,
    pub format: LogFormat,
    /// Structured field names whose values are always redacted
    pub sensitive_fields: Vec<String>,
    /// Write to a daily rolling file in this directory instead of stdout
    pub log_dir: Option<PathBuf>,
    /// Console output goes to stderr, keeping stdout for command output
    pub stderr: bool,
    pub service_name: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            redaction_enabled: true,
            hash_for_correlation: true,
            log_level: "info".to_string(),
            format: LogFormat::Pretty,
            sensitive_fields: vec![
                "patient_id".to_string(),
                "patient_name".to_string(),
                "mrn".to_string(),
            ],
            log_dir: None,
            stderr: false,
            service_name: "wardwatch".to_string(),
        }
    }
}
