//! Download pipeline
//!
//! Orchestrates one download run per chat: fresh stream extraction, stream
//! selection, size gating, the progress-reporting transfer itself, audio
//! post-processing, delivery, and a cleanup step that runs on every exit
//! path so no failure can leave a session stuck in `Downloading` or a
//! scratch file behind.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::config;
use crate::core::validation::sanitize_title;
use crate::download::error::DownloadError;
use crate::download::extract::{select_audio, select_video, StreamDescriptor, StreamExtractor};
use crate::download::progress::ProgressSink;
use crate::session::{MediaKind, SessionStore};

use fs_err::tokio as fs;

/// Ephemeral state for one active pipeline run.
///
/// Owns the chosen stream descriptor and the destination path, and shares
/// the cancellation token with the owning session. Never outlives the run.
pub struct DownloadTask {
    pub chat_id: ChatId,
    pub descriptor: StreamDescriptor,
    pub dest_path: PathBuf,
    pub cancel: CancellationToken,
    pub sink: Arc<dyn ProgressSink>,
}

impl DownloadTask {
    /// Writes the byte stream to `dest_path`, checking the cancellation
    /// token and forwarding a percent event to the sink on every chunk.
    ///
    /// Cancellation is cooperative: worst-case latency to honor it is one
    /// chunk, never the full transfer. `total_bytes == 0` (size unknown)
    /// disables percent events but not cancellation checks.
    pub async fn transfer<S>(&self, mut stream: S, total_bytes: u64) -> Result<(), DownloadError>
    where
        S: Stream<Item = Result<Bytes, DownloadError>> + Unpin,
    {
        let mut file = fs::File::create(&self.dest_path)
            .await
            .map_err(|e| DownloadError::Transfer(e.to_string()))?;
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            if self.cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }

            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::Transfer(e.to_string()))?;
            written += chunk.len() as u64;

            if total_bytes > 0 {
                let percent = (written.saturating_mul(100) / total_bytes).min(100) as u8;
                self.sink.report(self.chat_id, percent).await;
            }
        }

        file.flush().await.map_err(|e| DownloadError::Transfer(e.to_string()))?;
        Ok(())
    }
}

/// The download pipeline, shared by all chats.
///
/// [`Pipeline::run`] is the entry point used by the message handlers; it
/// wraps [`Pipeline::execute`] with terminal user messaging and the
/// unconditional [`Pipeline::cleanup`].
pub struct Pipeline {
    bot: Bot,
    extractor: Arc<dyn StreamExtractor>,
    sink: Arc<dyn ProgressSink>,
    sessions: Arc<SessionStore>,
    max_file_size_bytes: u64,
}

impl Pipeline {
    pub fn new(
        bot: Bot,
        extractor: Arc<dyn StreamExtractor>,
        sink: Arc<dyn ProgressSink>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            bot,
            extractor,
            sink,
            sessions,
            max_file_size_bytes: config::max_file_size_bytes(),
        }
    }

    /// Overrides the configured size limit.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = bytes;
        self
    }

    /// Runs one complete download for a chat.
    ///
    /// Terminal on every path: sends the outcome message, then always runs
    /// cleanup (scratch file removal, progress deregistration, session
    /// reset to `Idle`).
    pub async fn run(
        &self,
        chat_id: ChatId,
        url: String,
        kind: MediaKind,
        resolution: Option<String>,
        cancel: CancellationToken,
    ) {
        log::info!("Starting {:?} download for chat {}: {}", kind, chat_id, url);

        let mut dest: Option<PathBuf> = None;
        let result = self
            .execute(chat_id, &url, kind, resolution.as_deref(), &cancel, &mut dest)
            .await;

        match &result {
            Ok(path) => {
                log::info!("Delivered {} to chat {}", path.display(), chat_id);
                self.notify(chat_id, "✅ Download complete.").await;
            }
            Err(DownloadError::Cancelled) => {
                log::info!("Download cancelled by chat {}", chat_id);
                self.notify(chat_id, &DownloadError::Cancelled.user_message()).await;
            }
            Err(err) => {
                log::error!("Download failed for chat {} ({}): {}", chat_id, err.subcategory(), err);
                self.notify(chat_id, &err.user_message()).await;
            }
        }

        self.cleanup(chat_id, dest.as_deref()).await;
    }

    /// The fallible pipeline body: extraction through delivery.
    ///
    /// `dest` is filled in as soon as a destination path exists so that the
    /// caller can clean it up regardless of where the body bailed out.
    pub async fn execute(
        &self,
        chat_id: ChatId,
        url: &str,
        kind: MediaKind,
        resolution: Option<&str>,
        cancel: &CancellationToken,
        dest: &mut Option<PathBuf>,
    ) -> Result<PathBuf, DownloadError> {
        let parsed = Url::parse(url).map_err(|e| DownloadError::Extraction(format!("invalid url: {}", e)))?;

        // Fresh extraction on every attempt; catalogs are never reused.
        let catalog = self
            .extractor
            .resolve_streams(&parsed)
            .await
            .map_err(|e| DownloadError::Extraction(e.to_string()))?;

        let descriptor = match kind {
            MediaKind::Video => {
                let label = resolution.ok_or(DownloadError::StreamNotFound)?;
                select_video(&catalog, label)
            }
            MediaKind::Audio => select_audio(&catalog),
        }
        .ok_or(DownloadError::StreamNotFound)?
        .clone();

        // Size gate before any transfer begins.
        if descriptor.size_bytes > self.max_file_size_bytes {
            return Err(DownloadError::FileTooLarge {
                size_bytes: descriptor.size_bytes,
                limit_bytes: self.max_file_size_bytes,
            });
        }

        let stem = sanitize_title(&catalog.title);
        let path = Path::new(&*config::DOWNLOAD_FOLDER).join(format!("{}.{}", stem, descriptor.container));
        *dest = Some(path.clone());

        let task = DownloadTask {
            chat_id,
            descriptor,
            dest_path: path.clone(),
            cancel: cancel.clone(),
            sink: Arc::clone(&self.sink),
        };

        let response = http_client()?
            .get(&task.descriptor.url)
            .send()
            .await
            .map_err(|e| DownloadError::Transfer(e.to_string()))?
            .error_for_status()
            .map_err(|e| DownloadError::Transfer(e.to_string()))?;

        let total_bytes = if task.descriptor.size_bytes > 0 {
            task.descriptor.size_bytes
        } else {
            response.content_length().unwrap_or(0)
        };

        let stream = response
            .bytes_stream()
            .map(|r| r.map_err(|e| DownloadError::Transfer(e.to_string())))
            .boxed();
        task.transfer(stream, total_bytes).await?;

        // Audio post-processing: container label change only, no
        // re-encoding takes place.
        let delivered = if kind == MediaKind::Audio {
            let mp3_path = path.with_extension("mp3");
            fs::rename(&path, &mp3_path)
                .await
                .map_err(|e| DownloadError::Transfer(e.to_string()))?;
            *dest = Some(mp3_path.clone());
            mp3_path
        } else {
            path
        };

        self.bot
            .send_document(chat_id, InputFile::file(delivered.clone()))
            .await
            .map_err(|e| DownloadError::Delivery(e.to_string()))?;

        Ok(delivered)
    }

    /// Unconditional terminal step for a run: best-effort scratch file
    /// removal, progress deregistration, session reset. Failures are logged
    /// and swallowed; calling it twice for the same run is harmless.
    pub async fn cleanup(&self, chat_id: ChatId, dest: Option<&Path>) {
        if let Some(path) = dest {
            match fs::remove_file(path).await {
                Ok(()) => log::debug!("Removed scratch file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        self.sink.clear(chat_id);
        self.sessions.reset(chat_id);
    }

    async fn notify(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.bot.send_message(chat_id, text).await {
            log::warn!("Failed to notify chat {}: {}", chat_id, e);
        }
    }
}

fn http_client() -> Result<reqwest::Client, DownloadError> {
    // Only the connect phase is bounded; a total timeout would abort
    // long-running transfers of large files.
    reqwest::Client::builder()
        .connect_timeout(config::network::connect_timeout())
        .build()
        .map_err(|e| DownloadError::Transfer(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::stream;
    use std::sync::Mutex;

    struct RecordingSink {
        percents: Mutex<Vec<u8>>,
        cleared: Mutex<u32>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                percents: Mutex::new(Vec::new()),
                cleared: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl ProgressSink for RecordingSink {
        async fn report(&self, _chat_id: ChatId, percent: u8) {
            self.percents.lock().unwrap().push(percent);
        }

        fn clear(&self, _chat_id: ChatId) {
            *self.cleared.lock().unwrap() += 1;
        }
    }

    fn task(dir: &tempfile::TempDir, sink: Arc<dyn ProgressSink>, cancel: CancellationToken) -> DownloadTask {
        DownloadTask {
            chat_id: ChatId(1),
            descriptor: StreamDescriptor {
                kind: MediaKind::Audio,
                resolution: None,
                container: "m4a".to_string(),
                size_bytes: 100,
                url: "https://cdn.example/a".to_string(),
            },
            dest_path: dir.path().join("out.m4a"),
            cancel,
            sink,
        }
    }

    fn chunks(parts: Vec<&'static [u8]>) -> impl Stream<Item = Result<Bytes, DownloadError>> + Unpin {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
    }

    #[tokio::test]
    async fn test_transfer_writes_file_and_reports_percent() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();
        let task = task(&dir, sink.clone(), CancellationToken::new());

        let data: Vec<&'static [u8]> = vec![&[0u8; 25], &[0u8; 25], &[0u8; 50]];
        task.transfer(chunks(data), 100).await.unwrap();

        assert_eq!(fs_err::metadata(&task.dest_path).unwrap().len(), 100);
        assert_eq!(*sink.percents.lock().unwrap(), vec![25, 50, 100]);
    }

    #[tokio::test]
    async fn test_transfer_caps_percent_when_size_estimate_is_low() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();
        let task = task(&dir, sink.clone(), CancellationToken::new());

        // Descriptor said 100 bytes but 150 arrive.
        let data: Vec<&'static [u8]> = vec![&[0u8; 150]];
        task.transfer(chunks(data), 100).await.unwrap();

        assert_eq!(*sink.percents.lock().unwrap(), vec![100]);
    }

    #[tokio::test]
    async fn test_transfer_skips_percent_for_unknown_size() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();
        let task = task(&dir, sink.clone(), CancellationToken::new());

        let data: Vec<&'static [u8]> = vec![&[0u8; 10]];
        task.transfer(chunks(data), 0).await.unwrap();

        assert!(sink.percents.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_honors_cancellation_within_one_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();
        let cancel = CancellationToken::new();
        let task = task(&dir, sink.clone(), cancel.clone());

        let token = cancel.clone();
        // Token flips after the first chunk is produced; the second chunk
        // must never be written.
        let stream = stream::iter(vec![0u8, 1])
            .map(move |i| {
                if i == 1 {
                    token.cancel();
                }
                Ok(Bytes::from_static(&[0u8; 50]))
            })
            .boxed();

        let result = task.transfer(stream, 100).await;
        assert!(matches!(result, Err(DownloadError::Cancelled)));
        assert_eq!(*sink.percents.lock().unwrap(), vec![50]);
    }

    #[tokio::test]
    async fn test_transfer_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let task = task(&dir, sink.clone(), cancel);

        let data: Vec<&'static [u8]> = vec![&[0u8; 50]];
        let result = task.transfer(chunks(data), 100).await;

        assert!(matches!(result, Err(DownloadError::Cancelled)));
        assert!(sink.percents.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_propagates_stream_errors() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();
        let task = task(&dir, sink.clone(), CancellationToken::new());

        let stream = stream::iter(vec![
            Ok(Bytes::from_static(&[0u8; 50])),
            Err(DownloadError::Transfer("connection reset".into())),
        ]);

        let result = task.transfer(stream, 100).await;
        assert!(matches!(result, Err(DownloadError::Transfer(_))));
    }
}
