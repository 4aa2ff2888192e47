use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::dispatching::DefaultKey;
use teloxide::prelude::*;

use tubefetch::core::{config, init_logger};
use tubefetch::download::{Pipeline, ProgressReporter, YtDlpExtractor};
use tubefetch::session::SessionStore;
use tubefetch::telegram::{create_bot, schema, setup_bot_commands, HandlerDeps};

/// Main entry point for the Telegram bot
///
/// # Errors
/// Returns an error if initialization fails (logging, configuration,
/// scratch directory, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();

    init_logger(&config::LOG_FILE_PATH)?;

    if config::BOT_TOKEN.is_empty() {
        log::error!("BOT_TOKEN environment variable is not set");
        anyhow::bail!("BOT_TOKEN environment variable is not set");
    }

    // Scratch directory for in-flight downloads
    fs_err::tokio::create_dir_all(&*config::DOWNLOAD_FOLDER).await?;
    log::info!(
        "Using scratch directory '{}', file size limit {} MB",
        &*config::DOWNLOAD_FOLDER,
        *config::MAX_FILE_SIZE_MB
    );

    let bot = create_bot()?;

    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to set bot commands: {}", e);
    }

    let mut dispatcher = build_dispatcher(bot);
    log::info!("Bot is running");
    dispatcher.dispatch().await;

    Ok(())
}

/// Wires the session store, progress reporter, extractor, and pipeline
/// into the dispatcher schema.
fn build_dispatcher(bot: Bot) -> Dispatcher<Bot, tubefetch::telegram::HandlerError, DefaultKey> {
    let sessions = Arc::new(SessionStore::new());
    let reporter = Arc::new(ProgressReporter::new(bot.clone()));
    let extractor = Arc::new(YtDlpExtractor);
    let pipeline = Arc::new(Pipeline::new(
        bot.clone(),
        extractor.clone(),
        reporter.clone(),
        sessions.clone(),
    ));

    let deps = HandlerDeps {
        sessions,
        reporter,
        extractor,
        pipeline,
    };

    Dispatcher::builder(bot, schema(deps))
        .dependencies(DependencyMap::new())
        .enable_ctrlc_handler()
        .build()
}
