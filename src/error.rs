use std::io;
use thiserror::Error;

/// Custom result type alias for the application
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors raised by the service outside of the per-request fallback chain
#[derive(Debug, Error)]
pub enum ServiceError {
    /// I/O errors
    #[error("IO error: {0}")]
    IO(#[from] io::Error),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration file parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Whether the error was caused by caller input rather than the service
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
