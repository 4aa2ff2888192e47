//! Message routing and dispatcher schema
//!
//! Inbound texts are fed to the per-chat state machine, which returns a
//! [`SessionAction`]; this module performs the Telegram side of each action.
//! Session guards are never held across an `.await` — the state machine
//! decides synchronously, the transport work happens afterwards.

use std::sync::Arc;

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use url::Url;

use crate::download::extract::progressive_resolutions;
use crate::download::progress::ProgressSink;
use crate::download::{Pipeline, ProgressReporter, StreamExtractor};
use crate::session::{MediaKind, SessionAction, SessionStore};
use crate::telegram::bot::Command;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

const WELCOME_TEXT: &str = "🎬 Welcome to the media downloader bot!\n\
                            📥 Send a supported video link.\n\
                            Use /cancel to stop a download.";

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub sessions: Arc<SessionStore>,
    pub reporter: Arc<ProgressReporter>,
    pub extractor: Arc<dyn StreamExtractor>,
    pub pipeline: Arc<Pipeline>,
}

/// Creates the main dispatcher schema for the Telegram bot.
///
/// Returns a handler tree usable with teloxide's Dispatcher; the same
/// schema serves production and integration tests.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_messages = deps;

    dptree::entry()
        .branch(command_handler(deps_commands))
        .branch(message_handler(deps_messages))
}

/// Handler for the /start and /cancel commands
fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("Received command {:?} from chat {}", cmd, msg.chat.id);
                match cmd {
                    Command::Start => reply(&bot, msg.chat.id, WELCOME_TEXT).await,
                    Command::Cancel => {
                        // Same path as the bare "cancel" keyword.
                        let action = deps.sessions.handle_text(msg.chat.id, "cancel");
                        apply_action(&bot, msg.chat.id, action, &deps).await;
                    }
                }
                Ok(())
            }
        },
    ))
}

/// Handler for free-form texts (URLs, format and resolution choices)
fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
        let deps = deps.clone();
        async move {
            let Some(text) = msg.text() else {
                return Ok(());
            };

            let action = deps.sessions.handle_text(msg.chat.id, text);
            apply_action(&bot, msg.chat.id, action, &deps).await;
            Ok(())
        }
    })
}

/// Performs the Telegram side of a state-machine decision.
pub async fn apply_action(bot: &Bot, chat_id: ChatId, action: SessionAction, deps: &HandlerDeps) {
    match action {
        SessionAction::SendWelcome => reply(bot, chat_id, WELCOME_TEXT).await,
        SessionAction::AskFormat => reply(bot, chat_id, "📥 Download it as 'video' or 'audio'?").await,
        SessionAction::FetchResolutions { url } => offer_resolutions(bot, chat_id, &url, deps).await,
        SessionAction::StartDownload { url, kind, resolution } => {
            start_download(bot, chat_id, url, kind, resolution, deps).await;
        }
        SessionAction::InvalidResolution => {
            reply(bot, chat_id, "❌ Invalid resolution. Choose one of the listed options.").await;
        }
        SessionAction::InvalidInput => reply(bot, chat_id, "❌ Invalid link or unknown command.").await,
        SessionAction::CancelRequested => reply(bot, chat_id, "⏹ Cancelling the current download...").await,
        SessionAction::CancelIdle => reply(bot, chat_id, "❌ Download cancelled.").await,
        SessionAction::Busy => {
            reply(bot, chat_id, "⏳ A download is already in progress. Send 'cancel' to stop it.").await;
        }
    }
}

/// Enumerates progressive resolutions for the pending URL and offers them.
async fn offer_resolutions(bot: &Bot, chat_id: ChatId, url: &str, deps: &HandlerDeps) {
    // The text was validated before it became a pending URL.
    let catalog = match Url::parse(url) {
        Ok(parsed) => deps.extractor.resolve_streams(&parsed).await,
        Err(e) => Err(e.into()),
    };

    let catalog = match catalog {
        Ok(catalog) => catalog,
        Err(e) => {
            log::error!("Failed to enumerate resolutions for {}: {}", url, e);
            deps.sessions.reset(chat_id);
            reply(bot, chat_id, "⚠️ Could not read the video information.").await;
            return;
        }
    };

    let labels = progressive_resolutions(&catalog);
    if labels.is_empty() {
        deps.sessions.reset(chat_id);
        reply(bot, chat_id, "⚠️ No resolutions available for this video.").await;
        return;
    }

    let listing = labels.join("\n");
    if !deps.sessions.offer_resolutions(chat_id, labels) {
        // Session superseded while the catalog was being fetched.
        return;
    }

    reply(
        bot,
        chat_id,
        &format!(
            "📺 Available resolutions:\n{}\n\n📌 Reply with the one you want (e.g. 720p, 480p).",
            listing
        ),
    )
    .await;
}

/// Sends the status message, registers it for progress edits, and spawns
/// the pipeline run so the dispatcher is never blocked by a transfer.
async fn start_download(
    bot: &Bot,
    chat_id: ChatId,
    url: String,
    kind: MediaKind,
    resolution: Option<String>,
    deps: &HandlerDeps,
) {
    let status = match bot.send_message(chat_id, "⏳ Preparing download...").await {
        Ok(msg) => msg,
        Err(e) => {
            log::error!("Failed to send status message to chat {}: {}", chat_id, e);
            deps.sessions.reset(chat_id);
            return;
        }
    };
    deps.reporter.register(chat_id, status.id);

    let Some(cancel) = deps.sessions.cancel_token(chat_id) else {
        // Session disappeared between the transition and here.
        deps.reporter.clear(chat_id);
        return;
    };

    let pipeline = Arc::clone(&deps.pipeline);
    tokio::spawn(async move {
        pipeline.run(chat_id, url, kind, resolution, cancel).await;
    });
}

async fn reply(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(e) = bot.send_message(chat_id, text).await {
        log::warn!("Failed to send message to chat {}: {}", chat_id, e);
    }
}
