//! Stream extraction
//!
//! Resolves a media URL into the set of downloadable streams with metadata.
//! The [`StreamExtractor`] trait is the collaborator boundary; the shipped
//! implementation shells out to yt-dlp for a single JSON dump per call.
//! Extraction results are a read-only snapshot for one pipeline run and are
//! never cached across runs.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use url::Url;

use crate::core::config;
use crate::core::error::AppError;
use crate::session::MediaKind;

/// One downloadable stream, as reported by the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub kind: MediaKind,
    /// Quality label like "720p"; `None` for audio-only streams
    pub resolution: Option<String>,
    /// Container/format tag, e.g. "mp4", "m4a"
    pub container: String,
    /// Byte size estimate; 0 when the extractor reports none
    pub size_bytes: u64,
    /// Direct media URL the transfer reads from
    pub url: String,
}

/// Snapshot of everything the extractor found for one URL.
#[derive(Debug, Clone, Default)]
pub struct StreamCatalog {
    pub title: String,
    pub video_streams: Vec<StreamDescriptor>,
    pub audio_streams: Vec<StreamDescriptor>,
}

/// Container required for progressive video selection
pub const VIDEO_CONTAINER: &str = "mp4";

/// Resolves a URL into available stream descriptors.
///
/// Implementations must perform a fresh extraction on every call.
#[async_trait]
pub trait StreamExtractor: Send + Sync {
    async fn resolve_streams(&self, url: &Url) -> Result<StreamCatalog, AppError>;
}

/// Distinct progressive-mp4 quality labels, sorted descending by height.
///
/// Progressive means the stream carries both audio and video; sources also
/// offer separate audio-only/video-only streams which are not listed here.
pub fn progressive_resolutions(catalog: &StreamCatalog) -> Vec<String> {
    let mut heights: Vec<u32> = catalog
        .video_streams
        .iter()
        .filter(|s| s.container == VIDEO_CONTAINER)
        .filter_map(|s| parse_height(s.resolution.as_deref()?))
        .collect();
    heights.sort_unstable_by(|a, b| b.cmp(a));
    heights.dedup();
    heights.into_iter().map(|h| format!("{}p", h)).collect()
}

/// Progressive mp4 stream matching the chosen quality label, if any.
pub fn select_video<'a>(catalog: &'a StreamCatalog, resolution: &str) -> Option<&'a StreamDescriptor> {
    catalog
        .video_streams
        .iter()
        .find(|s| s.container == VIDEO_CONTAINER && s.resolution.as_deref() == Some(resolution))
}

/// Best available audio-only stream (largest reported size).
pub fn select_audio(catalog: &StreamCatalog) -> Option<&StreamDescriptor> {
    catalog.audio_streams.iter().max_by_key(|s| s.size_bytes)
}

fn parse_height(label: &str) -> Option<u32> {
    label.strip_suffix('p')?.parse().ok()
}

// ======================== yt-dlp implementation ========================

/// Subset of a single-video `yt-dlp -J` dump we care about
#[derive(Debug, Deserialize)]
struct YtDlpDump {
    title: Option<String>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    url: Option<String>,
    ext: Option<String>,
    /// "none" when the format carries no video track
    vcodec: Option<String>,
    /// "none" when the format carries no audio track
    acodec: Option<String>,
    height: Option<u32>,
    filesize: Option<u64>,
    /// yt-dlp emits this as a float
    filesize_approx: Option<f64>,
}

impl YtDlpFormat {
    fn has_video(&self) -> bool {
        matches!(self.vcodec.as_deref(), Some(c) if c != "none")
    }

    fn has_audio(&self) -> bool {
        matches!(self.acodec.as_deref(), Some(c) if c != "none")
    }

    fn size_bytes(&self) -> u64 {
        self.filesize
            .or_else(|| self.filesize_approx.map(|f| f.round() as u64))
            .unwrap_or(0)
    }
}

/// Extractor backed by the yt-dlp binary.
///
/// Runs `yt-dlp -J --no-playlist <url>` with a timeout and parses the JSON
/// dump into a [`StreamCatalog`].
#[derive(Debug, Default, Clone, Copy)]
pub struct YtDlpExtractor;

#[async_trait]
impl StreamExtractor for YtDlpExtractor {
    async fn resolve_streams(&self, url: &Url) -> Result<StreamCatalog, AppError> {
        let ytdl_bin = &*config::YTDL_BIN;
        log::debug!("Fetching stream catalog for {} via {}", url, ytdl_bin);

        let output = timeout(
            config::extract::ytdlp_timeout(),
            TokioCommand::new(ytdl_bin)
                .args(["-J", "--no-playlist", "--no-warnings", url.as_str()])
                .output(),
        )
        .await
        .map_err(|_| {
            log::error!(
                "yt-dlp timed out after {} seconds for {}",
                config::extract::YTDLP_TIMEOUT_SECS,
                url
            );
            AppError::Extraction("yt-dlp command timed out".to_string())
        })?
        .map_err(|e| {
            log::error!("Failed to execute {}: {}", ytdl_bin, e);
            AppError::Extraction(format!("failed to spawn {}: {}", ytdl_bin, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::error!("yt-dlp failed for {} ({:?}): {}", url, output.status.code(), stderr.trim());
            return Err(AppError::Extraction(format!(
                "yt-dlp exited with {:?}",
                output.status.code()
            )));
        }

        let dump: YtDlpDump = serde_json::from_slice(&output.stdout)?;
        let catalog = catalog_from_dump(dump);

        if catalog.video_streams.is_empty() && catalog.audio_streams.is_empty() {
            return Err(AppError::Extraction("no downloadable streams found".to_string()));
        }

        log::debug!(
            "Catalog for {}: {} video, {} audio streams",
            url,
            catalog.video_streams.len(),
            catalog.audio_streams.len()
        );
        Ok(catalog)
    }
}

fn catalog_from_dump(dump: YtDlpDump) -> StreamCatalog {
    let mut catalog = StreamCatalog {
        title: dump.title.unwrap_or_else(|| "Unknown".to_string()),
        ..Default::default()
    };

    for format in dump.formats {
        let Some(url) = format.url.clone() else { continue };
        let container = format.ext.clone().unwrap_or_default();

        if format.has_video() && format.has_audio() {
            catalog.video_streams.push(StreamDescriptor {
                kind: MediaKind::Video,
                resolution: format.height.map(|h| format!("{}p", h)),
                container,
                size_bytes: format.size_bytes(),
                url,
            });
        } else if format.has_audio() {
            catalog.audio_streams.push(StreamDescriptor {
                kind: MediaKind::Audio,
                resolution: None,
                container,
                size_bytes: format.size_bytes(),
                url,
            });
        }
        // Video-only formats are skipped: they would need muxing with a
        // separate audio stream, which this bot does not do.
    }

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(resolution: &str, container: &str, size: u64) -> StreamDescriptor {
        StreamDescriptor {
            kind: MediaKind::Video,
            resolution: Some(resolution.to_string()),
            container: container.to_string(),
            size_bytes: size,
            url: format!("https://cdn.example/{}", resolution),
        }
    }

    fn audio(size: u64) -> StreamDescriptor {
        StreamDescriptor {
            kind: MediaKind::Audio,
            resolution: None,
            container: "m4a".to_string(),
            size_bytes: size,
            url: format!("https://cdn.example/audio-{}", size),
        }
    }

    #[test]
    fn test_progressive_resolutions_sorted_distinct() {
        let catalog = StreamCatalog {
            title: "t".into(),
            video_streams: vec![
                video("480p", "mp4", 10),
                video("1080p", "mp4", 40),
                video("720p", "mp4", 20),
                video("720p", "mp4", 21), // duplicate label
                video("2160p", "webm", 99), // wrong container, excluded
            ],
            audio_streams: vec![],
        };

        assert_eq!(progressive_resolutions(&catalog), vec!["1080p", "720p", "480p"]);
    }

    #[test]
    fn test_select_video_matches_label_and_container() {
        let catalog = StreamCatalog {
            title: "t".into(),
            video_streams: vec![video("720p", "webm", 1), video("720p", "mp4", 2)],
            audio_streams: vec![],
        };

        let chosen = select_video(&catalog, "720p").unwrap();
        assert_eq!(chosen.container, "mp4");
        assert!(select_video(&catalog, "144p").is_none());
    }

    #[test]
    fn test_select_audio_prefers_largest() {
        let catalog = StreamCatalog {
            title: "t".into(),
            video_streams: vec![],
            audio_streams: vec![audio(100), audio(300), audio(200)],
        };

        assert_eq!(select_audio(&catalog).unwrap().size_bytes, 300);
        assert!(select_audio(&StreamCatalog::default()).is_none());
    }

    #[test]
    fn test_catalog_from_ytdlp_dump() {
        let raw = r#"{
            "title": "Some Clip",
            "formats": [
                {"url": "https://cdn/v720", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a", "height": 720, "filesize": 1000},
                {"url": "https://cdn/v1080", "ext": "mp4", "vcodec": "avc1", "acodec": "none", "height": 1080, "filesize": 5000},
                {"url": "https://cdn/a", "ext": "m4a", "vcodec": "none", "acodec": "mp4a", "filesize_approx": 512.7},
                {"ext": "mp4", "vcodec": "avc1", "acodec": "mp4a", "height": 480}
            ]
        }"#;

        let dump: YtDlpDump = serde_json::from_str(raw).unwrap();
        let catalog = catalog_from_dump(dump);

        assert_eq!(catalog.title, "Some Clip");
        // video-only 1080p and the url-less 480p entry are dropped
        assert_eq!(catalog.video_streams.len(), 1);
        assert_eq!(catalog.video_streams[0].resolution.as_deref(), Some("720p"));
        assert_eq!(catalog.audio_streams.len(), 1);
        assert_eq!(catalog.audio_streams[0].size_bytes, 513);
    }
}
