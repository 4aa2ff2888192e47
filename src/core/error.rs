use thiserror::Error;

/// Centralized error types for the application
///
/// Errors that cross module boundaries are converted to this enum for
/// consistent handling. Uses `thiserror` for automatic conversion and
/// display formatting. Download-pipeline failures have their own taxonomy
/// in [`crate::download::DownloadError`].
#[derive(Error, Debug)]
pub enum AppError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// Malformed extractor output
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stream extraction failures (binary not found, bad exit code, timeout)
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Missing or invalid environment configuration — fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;
