use thiserror::Error;

/// Structured error type for download pipeline runs.
///
/// Every failure mode of a run maps to exactly one variant; the pipeline
/// wrapper turns these into user-facing messages and logs the full detail
/// server-side. `Cancelled` is deliberately separate so it can produce a
/// neutral, non-alarming notice instead of an error-toned one.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Stream extraction failed (network, unsupported video, extractor crash)
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// No stream matched the requested kind/resolution/container
    #[error("no matching stream found")]
    StreamNotFound,

    /// Descriptor size exceeds the configured limit; nothing was transferred
    #[error("file is {size_bytes} bytes, limit is {limit_bytes} bytes")]
    FileTooLarge { size_bytes: u64, limit_bytes: u64 },

    /// The user cancelled the download mid-transfer
    #[error("download cancelled by user")]
    Cancelled,

    /// IO or network failure during the transfer itself
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The finished file could not be handed to the chat transport
    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl DownloadError {
    /// Short subcategory label for logging
    pub fn subcategory(&self) -> &'static str {
        match self {
            DownloadError::Extraction(_) => "extraction",
            DownloadError::StreamNotFound => "stream_not_found",
            DownloadError::FileTooLarge { .. } => "file_too_large",
            DownloadError::Cancelled => "cancelled",
            DownloadError::Transfer(_) => "transfer",
            DownloadError::Delivery(_) => "delivery",
        }
    }

    /// Short, non-leaking message shown to the user.
    ///
    /// Internal detail (paths, extractor stderr, HTTP errors) stays in the
    /// server-side log only. The size limit is user-correctable, so that
    /// one names the numbers.
    pub fn user_message(&self) -> String {
        match self {
            DownloadError::Cancelled => "❌ Download cancelled.".to_string(),
            DownloadError::FileTooLarge { size_bytes, limit_bytes } => format!(
                "⚠️ The file is {:.2} MB, which exceeds the {} MB limit.",
                *size_bytes as f64 / (1024.0 * 1024.0),
                limit_bytes / (1024 * 1024)
            ),
            DownloadError::StreamNotFound => "❌ No suitable stream was found.".to_string(),
            DownloadError::Extraction(_) => "⚠️ Could not read the video information.".to_string(),
            DownloadError::Transfer(_) | DownloadError::Delivery(_) => {
                "⚠️ Something went wrong during the download.".to_string()
            }
        }
    }
}
