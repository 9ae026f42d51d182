//! Error types for pole_ekf

use thiserror::Error;

/// Main error type for the localization filter
#[derive(Error, Debug)]
pub enum LocalizationError {
    /// Invalid configuration parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Innovation covariance could not be inverted; the observation noise floor is misconfigured
    #[error("Singular innovation covariance ({dim}x{dim})")]
    SingularInnovationCovariance { dim: usize },
    /// Numerical computation produced a non-finite result
    #[error("Numerical error: {0}")]
    NumericalError(String),
    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    /// Visualization error
    #[error("Visualization error: {0}")]
    VisualizationError(String),
}

/// Result type alias for localization operations
pub type LocalizationResult<T> = Result<T, LocalizationError>;
