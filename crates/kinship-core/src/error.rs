use thiserror::Error;

/// Top-level error type for kinship.
#[derive(Error, Debug)]
pub enum KinshipError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid gender code: {0}")]
    InvalidGender(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for KinshipError {
    fn from(err: config::ConfigError) -> Self {
        KinshipError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KinshipError>;
