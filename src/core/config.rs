use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Configuration constants for the bot

/// Telegram bot token, read once at startup from the BOT_TOKEN environment
/// variable. Empty when unset; `main` refuses to start in that case.
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| env::var("BOT_TOKEN").unwrap_or_default());

/// Cached yt-dlp binary path
/// Read once at startup from YTDL_BIN environment variable or defaults to "yt-dlp"
pub static YTDL_BIN: Lazy<String> = Lazy::new(|| env::var("YTDL_BIN").unwrap_or_else(|_| "yt-dlp".to_string()));

/// Scratch directory for in-flight downloads
/// Read from DOWNLOAD_FOLDER environment variable, created at startup if absent
pub static DOWNLOAD_FOLDER: Lazy<String> =
    Lazy::new(|| env::var("DOWNLOAD_FOLDER").unwrap_or_else(|_| "downloads".to_string()));

/// Log file path, read from LOG_FILE_PATH environment variable
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "tubefetch.log".to_string()));

/// Maximum deliverable file size in megabytes
/// Read from MAX_FILE_SIZE_MB environment variable, defaults to 50
/// (the standard Telegram Bot API upload limit)
pub static MAX_FILE_SIZE_MB: Lazy<u64> = Lazy::new(|| {
    env::var("MAX_FILE_SIZE_MB")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(50)
});

/// Maximum deliverable file size in bytes
pub fn max_file_size_bytes() -> u64 {
    *MAX_FILE_SIZE_MB * 1024 * 1024
}

/// Extraction configuration
pub mod extract {
    use super::Duration;

    /// Timeout for yt-dlp metadata dumps (in seconds)
    pub const YTDLP_TIMEOUT_SECS: u64 = 120; // 2 minutes

    /// yt-dlp command timeout duration
    pub fn ytdlp_timeout() -> Duration {
        Duration::from_secs(YTDLP_TIMEOUT_SECS)
    }
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Timeout for establishing a transfer connection (in seconds)
    ///
    /// Only the connect phase is bounded; a total request timeout would
    /// kill long-running transfers of large files.
    pub const CONNECT_TIMEOUT_SECS: u64 = 30;

    /// Timeout for Telegram API requests (in seconds)
    /// Generous because document uploads of ~50 MB can be slow.
    pub const TELEGRAM_TIMEOUT_SECS: u64 = 300;

    /// Transfer connect timeout duration
    pub fn connect_timeout() -> Duration {
        Duration::from_secs(CONNECT_TIMEOUT_SECS)
    }

    /// Telegram API timeout duration
    pub fn telegram_timeout() -> Duration {
        Duration::from_secs(TELEGRAM_TIMEOUT_SECS)
    }
}

/// Progress message configuration
pub mod progress {
    /// Emit a user-visible update only on multiples of this percentage
    pub const UPDATE_STEP_PERCENT: u8 = 5;
}
