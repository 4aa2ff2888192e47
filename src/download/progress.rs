//! Throttled progress reporting
//!
//! The transfer loop produces a percent value on every chunk; most of those
//! must never reach Telegram. [`ProgressReporter`] keeps one status-message
//! handle per chat and edits it at most once per
//! [`crate::core::config::progress::UPDATE_STEP_PERCENT`] percentage points.
//! Reporting is best-effort: a deleted or inaccessible status message is
//! never fatal to the download.

use async_trait::async_trait;
use dashmap::DashMap;
use teloxide::prelude::*;
use teloxide::types::MessageId;

use crate::core::config;

/// Where the pipeline sends raw percent events.
///
/// The pipeline only knows this seam; tests substitute a recording sink.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Raw percent event, possibly at arbitrary granularity
    async fn report(&self, chat_id: ChatId, percent: u8);

    /// Drops the chat's registration; must be idempotent
    fn clear(&self, chat_id: ChatId);
}

#[derive(Debug, Clone, Copy)]
struct ProgressEntry {
    message_id: MessageId,
    last_emitted: Option<u8>,
}

/// Decides whether a raw percent event becomes a user-visible update.
///
/// Emits only on multiples of the configured step, and only once per value:
/// chunk events arrive far more often than one per percent.
fn should_emit(last_emitted: Option<u8>, percent: u8) -> bool {
    percent % config::progress::UPDATE_STEP_PERCENT == 0 && last_emitted != Some(percent)
}

/// Maps raw byte-progress events to throttled edits of one status message
/// per chat.
///
/// Entries are added when a download starts and removed unconditionally at
/// pipeline cleanup. Concurrent access is per-chat via [`DashMap`].
pub struct ProgressReporter {
    bot: Bot,
    entries: DashMap<ChatId, ProgressEntry>,
}

impl ProgressReporter {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            entries: DashMap::new(),
        }
    }

    /// Registers the "preparing" status message the updates will edit.
    pub fn register(&self, chat_id: ChatId, message_id: MessageId) {
        self.entries.insert(
            chat_id,
            ProgressEntry {
                message_id,
                last_emitted: None,
            },
        );
    }

    /// Whether the chat currently has a registered status message.
    pub fn is_registered(&self, chat_id: ChatId) -> bool {
        self.entries.contains_key(&chat_id)
    }
}

#[async_trait]
impl ProgressSink for ProgressReporter {
    async fn report(&self, chat_id: ChatId, percent: u8) {
        // Decide and record under the shard lock, edit outside of it.
        let message_id = {
            let Some(mut entry) = self.entries.get_mut(&chat_id) else {
                return;
            };
            if !should_emit(entry.last_emitted, percent) {
                return;
            }
            entry.last_emitted = Some(percent);
            entry.message_id
        };

        if let Err(e) = self
            .bot
            .edit_message_text(chat_id, message_id, format!("📥 Downloading... {}%", percent))
            .await
        {
            // Status message may have been deleted by the user; keep going.
            log::debug!("Progress edit failed for chat {}: {}", chat_id, e);
        }
    }

    fn clear(&self, chat_id: ChatId) {
        self.entries.remove(&chat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter() -> ProgressReporter {
        // Token format is valid but fake; no request is made in these tests.
        ProgressReporter::new(Bot::new("123456:TEST-TOKEN"))
    }

    #[test]
    fn test_should_emit_only_on_step_multiples() {
        assert!(should_emit(None, 0));
        assert!(should_emit(None, 5));
        assert!(should_emit(Some(5), 10));
        assert!(!should_emit(None, 3));
        assert!(!should_emit(None, 99));
    }

    #[test]
    fn test_should_emit_deduplicates_repeats() {
        assert!(should_emit(Some(10), 15));
        assert!(!should_emit(Some(15), 15));
    }

    #[test]
    fn test_register_and_clear_are_idempotent() {
        let reporter = reporter();
        let chat = ChatId(7);

        reporter.register(chat, MessageId(1));
        reporter.register(chat, MessageId(2));
        assert!(reporter.is_registered(chat));

        reporter.clear(chat);
        reporter.clear(chat);
        assert!(!reporter.is_registered(chat));
    }

    #[tokio::test]
    async fn test_report_without_registration_is_a_noop() {
        let reporter = reporter();
        // No entry registered: must return before touching the network.
        reporter.report(ChatId(7), 50).await;
        assert!(!reporter.is_registered(ChatId(7)));
    }
}
