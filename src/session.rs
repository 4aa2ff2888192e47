//! Per-chat download sessions
//!
//! Tracks what each chat is currently doing (awaiting a URL, a format
//! choice, a resolution choice, or downloading) and enforces the valid
//! text-triggered transitions between those states. The decision logic is
//! a pure method on [`Session`] so the whole transition table is testable
//! without a Telegram connection; [`SessionStore`] wraps it in a concurrent
//! map keyed by chat so different chats never contend on a shared lock.

use dashmap::DashMap;
use teloxide::types::ChatId;
use tokio_util::sync::CancellationToken;

use crate::core::validation::is_supported_media_url;

/// Keyword that requests cancellation (also reachable as the /cancel command)
const CANCEL_KEYWORD: &str = "cancel";

/// What kind of media the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// Conversational state of one chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No dialogue in progress
    #[default]
    Idle,
    /// URL received, waiting for "video" or "audio"
    AwaitingFormat,
    /// Format is video, waiting for one of the offered resolution labels
    AwaitingResolution,
    /// A download pipeline run is active for this chat
    Downloading,
}

/// What the message handler should do after a text was fed to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Send the welcome/instructions text
    SendWelcome,
    /// URL accepted; ask whether to download video or audio
    AskFormat,
    /// "video" chosen; enumerate progressive resolutions for this URL
    FetchResolutions { url: String },
    /// Start a download pipeline run
    StartDownload {
        url: String,
        kind: MediaKind,
        resolution: Option<String>,
    },
    /// Text did not match any offered resolution label
    InvalidResolution,
    /// Text is not a supported URL or a known keyword
    InvalidInput,
    /// Cancel requested while downloading; the token is now cancelled and
    /// the pipeline will observe it on its next progress tick
    CancelRequested,
    /// Cancel requested while idle; session was reset
    CancelIdle,
    /// A download is running and the input was not the cancel keyword
    Busy,
}

/// Per-chat conversational state.
///
/// Invariants:
/// - `chosen_resolution` is only set together with `state == Downloading`
///   and `chosen_kind == Some(Video)`.
/// - `available_resolutions` is non-empty whenever
///   `state == AwaitingResolution`.
#[derive(Debug, Default)]
pub struct Session {
    pub state: SessionState,
    pub pending_url: Option<String>,
    pub chosen_kind: Option<MediaKind>,
    /// Offered quality labels, descending, lowercased
    pub available_resolutions: Vec<String>,
    pub chosen_resolution: Option<String>,
    /// Cooperative cancellation token shared with the pipeline run.
    /// Replaced with a fresh token whenever a new URL is accepted.
    pub cancel: CancellationToken,
}

impl Session {
    /// Resets the session back to `Idle`, dropping all dialogue state.
    pub fn reset(&mut self) {
        *self = Session::default();
    }

    /// Feeds one inbound text to the state machine and returns the action
    /// the caller must perform. Input is trimmed and lowercased before
    /// matching; resolution labels match by exact equality after that
    /// normalization.
    pub fn handle_text(&mut self, text: &str) -> SessionAction {
        let text = text.trim().to_lowercase();

        if text == CANCEL_KEYWORD {
            if self.state == SessionState::Downloading {
                // Stay in Downloading; the pipeline observes the token on
                // its next progress tick and resets the session itself.
                self.cancel.cancel();
                return SessionAction::CancelRequested;
            }
            self.reset();
            return SessionAction::CancelIdle;
        }

        if self.state == SessionState::Downloading {
            return SessionAction::Busy;
        }

        if text == "start" {
            return SessionAction::SendWelcome;
        }

        // A fresh supported URL restarts the dialogue from any idle-ish state.
        if is_supported_media_url(&text) {
            self.reset();
            self.state = SessionState::AwaitingFormat;
            self.pending_url = Some(text);
            return SessionAction::AskFormat;
        }

        match self.state {
            SessionState::AwaitingFormat => match text.as_str() {
                "audio" => {
                    let Some(url) = self.pending_url.clone() else {
                        return SessionAction::InvalidInput;
                    };
                    self.chosen_kind = Some(MediaKind::Audio);
                    self.state = SessionState::Downloading;
                    SessionAction::StartDownload {
                        url,
                        kind: MediaKind::Audio,
                        resolution: None,
                    }
                }
                "video" => {
                    let Some(url) = self.pending_url.clone() else {
                        return SessionAction::InvalidInput;
                    };
                    self.chosen_kind = Some(MediaKind::Video);
                    // State stays AwaitingFormat until the resolutions are
                    // known; `offer_resolutions` performs the transition.
                    SessionAction::FetchResolutions { url }
                }
                _ => SessionAction::InvalidInput,
            },
            SessionState::AwaitingResolution => {
                if self.available_resolutions.iter().any(|r| r == &text) {
                    let Some(url) = self.pending_url.clone() else {
                        return SessionAction::InvalidInput;
                    };
                    self.chosen_resolution = Some(text.clone());
                    self.state = SessionState::Downloading;
                    SessionAction::StartDownload {
                        url,
                        kind: MediaKind::Video,
                        resolution: Some(text),
                    }
                } else {
                    SessionAction::InvalidResolution
                }
            }
            SessionState::Idle | SessionState::Downloading => SessionAction::InvalidInput,
        }
    }
}

/// Process-wide mapping from chat identity to session state.
///
/// Backed by a [`DashMap`], so mutations are atomic per chat and chats do
/// not serialize on a single global lock. Callers must not hold a returned
/// guard across an `.await`; every method here releases the shard lock
/// before returning.
#[derive(Debug, Default)]
pub struct SessionStore {
    map: DashMap<ChatId, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes one inbound text through the chat's state machine, creating
    /// a session lazily on first contact.
    pub fn handle_text(&self, chat_id: ChatId, text: &str) -> SessionAction {
        self.map.entry(chat_id).or_default().handle_text(text)
    }

    /// Transitions `AwaitingFormat` to `AwaitingResolution` with the given
    /// non-empty label list. Returns `false` when the session was superseded
    /// while the labels were being fetched (new URL, cancel), in which case
    /// nothing is changed.
    pub fn offer_resolutions(&self, chat_id: ChatId, labels: Vec<String>) -> bool {
        debug_assert!(!labels.is_empty());
        let mut session = self.map.entry(chat_id).or_default();
        if session.state != SessionState::AwaitingFormat || session.chosen_kind != Some(MediaKind::Video) {
            return false;
        }
        session.available_resolutions = labels;
        session.state = SessionState::AwaitingResolution;
        true
    }

    /// Clone of the chat's cancellation token, if a session exists.
    pub fn cancel_token(&self, chat_id: ChatId) -> Option<CancellationToken> {
        self.map.get(&chat_id).map(|s| s.cancel.clone())
    }

    /// Current state of the chat's session (`Idle` when none exists).
    pub fn state(&self, chat_id: ChatId) -> SessionState {
        self.map.get(&chat_id).map(|s| s.state).unwrap_or_default()
    }

    /// Resets the chat's session to `Idle`. Called by the pipeline's
    /// terminal cleanup on every exit path; safe to call repeatedly.
    pub fn reset(&self, chat_id: ChatId) {
        self.map.remove(&chat_id);
    }
}
