use thiserror::Error;

use crate::engine::EngineError;
use crate::store::StoreError;

/// Core error type for Schellar operations.
#[derive(Error, Debug)]
pub enum SchellarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate schedule name '{0}'")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SchellarError {
    fn from(e: serde_json::Error) -> Self {
        SchellarError::Serialization(e.to_string())
    }
}

/// Result type alias using SchellarError.
pub type Result<T> = std::result::Result<T, SchellarError>;
