use thiserror::Error;

/// Main error type for Warden
#[derive(Error, Debug)]
pub enum WardenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Remediation already in progress for {0}")]
    RemediationInFlight(String),

    #[error("Restart command failed: {0}")]
    RestartFailed(String),

    #[error("Timeout error")]
    Timeout,

    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for WardenError {
    fn from(err: serde_json::Error) -> Self {
        WardenError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
