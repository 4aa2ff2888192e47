//! URL and filename validation utilities
//!
//! Security-focused classification of user inputs:
//! - media URL validation (whitelist-based host matching)
//! - title sanitization (filesystem-safe names, no traversal characters)

use lazy_regex::regex_replace_all;
use url::Url;

/// Hosts accepted for download links (exact match or subdomain)
const SUPPORTED_HOSTS: &[&str] = &["youtube.com", "youtu.be", "youtube-nocookie.com"];

/// Classifies free-form text as a supported media URL.
///
/// Pure and deterministic: the same input always yields the same answer,
/// and there is no error path.
///
/// # Security
/// Whitelist approach:
/// - Only HTTP/HTTPS schemes allowed
/// - Only the hosts in [`SUPPORTED_HOSTS`] and their subdomains
///
/// # Examples
/// ```
/// use tubefetch::core::validation::is_supported_media_url;
///
/// assert!(is_supported_media_url("https://youtube.com/watch?v=dQw4w9WgXcQ"));
/// assert!(is_supported_media_url("https://youtu.be/dQw4w9WgXcQ"));
/// assert!(is_supported_media_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
///
/// assert!(!is_supported_media_url("https://evil.com/watch?v=dQw4w9WgXcQ"));
/// assert!(!is_supported_media_url("ftp://youtube.com/video"));
/// assert!(!is_supported_media_url("not a url"));
/// ```
pub fn is_supported_media_url(text: &str) -> bool {
    let parsed = match Url::parse(text.trim()) {
        Ok(url) => url,
        Err(_) => return false,
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }

    let Some(host) = parsed.host_str() else {
        return false;
    };

    SUPPORTED_HOSTS
        .iter()
        .any(|allowed| host == *allowed || host.ends_with(&format!(".{}", allowed)))
}

/// Sanitizes a media title into a filesystem-safe file stem.
///
/// Every character outside `[A-Za-z0-9_-]` is replaced with `_`, which
/// also rules out path separators and traversal sequences.
///
/// # Examples
/// ```
/// use tubefetch::core::validation::sanitize_title;
///
/// assert_eq!(sanitize_title("My Video: Part 1"), "My_Video__Part_1");
/// assert_eq!(sanitize_title("../../etc/passwd"), "______etc_passwd");
/// ```
pub fn sanitize_title(title: &str) -> String {
    regex_replace_all!(r"[^A-Za-z0-9_-]", title, "_").into_owned()
}
