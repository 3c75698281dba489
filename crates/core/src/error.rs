//! Core error types

use thiserror::Error;

/// Errors raised while building entries or loading configuration
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Importance out of range [1, 5]: {0}")]
    InvalidImportance(i64),

    #[error("Config IO error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Home directory could not be resolved")]
    HomeDirUnavailable,
}
