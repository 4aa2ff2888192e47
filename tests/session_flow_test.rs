//! End-to-end walks through the per-chat dialogue state machine

use pretty_assertions::assert_eq;
use teloxide::types::ChatId;

use tubefetch::session::{MediaKind, SessionAction, SessionState, SessionStore};

const URL: &str = "https://youtu.be/abc123";

#[test]
fn test_video_download_dialogue() {
    let store = SessionStore::new();
    let chat = ChatId(100);

    // URL submitted: bot asks video/audio.
    assert_eq!(store.handle_text(chat, URL), SessionAction::AskFormat);
    assert_eq!(store.state(chat), SessionState::AwaitingFormat);

    // "video": resolutions must be enumerated for exactly that URL.
    assert_eq!(
        store.handle_text(chat, "video"),
        SessionAction::FetchResolutions { url: URL.to_string() }
    );

    // Extraction found three progressive streams.
    assert!(store.offer_resolutions(chat, vec!["1080p".into(), "720p".into(), "480p".into()]));
    assert_eq!(store.state(chat), SessionState::AwaitingResolution);

    // The user picks one of them: a video pipeline run starts.
    assert_eq!(
        store.handle_text(chat, "720p"),
        SessionAction::StartDownload {
            url: URL.to_string(),
            kind: MediaKind::Video,
            resolution: Some("720p".to_string()),
        }
    );
    assert_eq!(store.state(chat), SessionState::Downloading);

    // Pipeline finished: terminal callback resets the session.
    store.reset(chat);
    assert_eq!(store.state(chat), SessionState::Idle);
}

#[test]
fn test_audio_download_dialogue() {
    let store = SessionStore::new();
    let chat = ChatId(101);

    store.handle_text(chat, URL);
    assert_eq!(
        store.handle_text(chat, "audio"),
        SessionAction::StartDownload {
            url: URL.to_string(),
            kind: MediaKind::Audio,
            resolution: None,
        }
    );
    assert_eq!(store.state(chat), SessionState::Downloading);
}

#[test]
fn test_cancel_mid_download_flows_through_token() {
    let store = SessionStore::new();
    let chat = ChatId(102);

    store.handle_text(chat, URL);
    store.handle_text(chat, "audio");
    let token = store.cancel_token(chat).unwrap();

    // Cancel keyword: token flips, session stays Downloading until the
    // pipeline observes it at its next progress tick.
    assert_eq!(store.handle_text(chat, "cancel"), SessionAction::CancelRequested);
    assert!(token.is_cancelled());
    assert_eq!(store.state(chat), SessionState::Downloading);

    // Pipeline observed the token and ran cleanup.
    store.reset(chat);
    assert_eq!(store.state(chat), SessionState::Idle);
}

#[test]
fn test_second_download_refused_while_busy() {
    let store = SessionStore::new();
    let chat = ChatId(103);

    store.handle_text(chat, URL);
    store.handle_text(chat, "audio");

    // Neither a new URL nor a format choice may start a second run.
    assert_eq!(
        store.handle_text(chat, "https://youtube.com/watch?v=other"),
        SessionAction::Busy
    );
    assert_eq!(store.handle_text(chat, "audio"), SessionAction::Busy);
    assert_eq!(store.state(chat), SessionState::Downloading);
}

#[test]
fn test_invalid_inputs_do_not_change_state() {
    let store = SessionStore::new();
    let chat = ChatId(104);

    assert_eq!(store.handle_text(chat, "what is this"), SessionAction::InvalidInput);
    assert_eq!(store.state(chat), SessionState::Idle);

    store.handle_text(chat, URL);
    assert_eq!(store.handle_text(chat, "gif"), SessionAction::InvalidInput);
    assert_eq!(store.state(chat), SessionState::AwaitingFormat);

    store.handle_text(chat, "video");
    store.offer_resolutions(chat, vec!["720p".into(), "480p".into()]);
    assert_eq!(store.handle_text(chat, "1080p"), SessionAction::InvalidResolution);
    assert_eq!(store.state(chat), SessionState::AwaitingResolution);
    // A listed label still works after the failed attempt.
    assert!(matches!(
        store.handle_text(chat, "480p"),
        SessionAction::StartDownload { .. }
    ));
}

#[test]
fn test_resolution_matching_normalizes_case_and_whitespace() {
    let store = SessionStore::new();
    let chat = ChatId(105);

    store.handle_text(chat, URL);
    store.handle_text(chat, "video");
    store.offer_resolutions(chat, vec!["720p".into()]);

    assert!(matches!(
        store.handle_text(chat, "  720P\n"),
        SessionAction::StartDownload { .. }
    ));
}
