//! Tubefetch - Telegram bot that downloads media from a link chosen
//! through a chat dialogue
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, and input validation
//! - `session`: per-chat session store and conversational state machine
//! - `download`: stream extraction, download pipeline, progress reporting
//! - `telegram`: bot setup, dispatcher schema, and message handlers

pub mod core;
pub mod download;
pub mod session;
pub mod telegram;

// Re-export commonly used types for convenience
pub use crate::core::{config, AppError, AppResult};
pub use crate::download::{DownloadError, Pipeline, ProgressReporter, StreamExtractor};
pub use crate::session::{SessionAction, SessionState, SessionStore};
pub use crate::telegram::{schema, HandlerDeps};
