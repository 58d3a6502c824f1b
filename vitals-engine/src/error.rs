use error_common::MonitorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Collaborator error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
