use std::sync::OnceLock;
use std::time::Duration;

use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{MusicProvider, SourceType, Track};
use crate::error::{MusicError, Result};
use crate::RequesterId;

/// Cliente para interactuar con YouTube vía yt-dlp.
pub struct YouTubeProvider {
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    duration: Option<f64>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
}

impl YouTubeProvider {
    pub fn new() -> Self {
        Self {
            // Limitar requests concurrentes para evitar rate limiting
            rate_limiter: Semaphore::new(3),
        }
    }

    pub fn is_youtube_url(url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        matches!(
            parsed.host_str(),
            Some("www.youtube.com" | "youtube.com" | "youtu.be" | "m.youtube.com" | "music.youtube.com")
        )
    }

    pub fn extract_video_id(url: &str) -> Option<String> {
        static VIDEO_ID: OnceLock<Regex> = OnceLock::new();
        let re = VIDEO_ID.get_or_init(|| {
            Regex::new(r"(?:v=|youtu\.be/|/shorts/)([A-Za-z0-9_-]{11})").expect("regex válida")
        });
        re.captures(url).map(|c| c[1].to_string())
    }

    fn info_to_track(&self, info: YtDlpInfo, requested_by: RequesterId) -> Track {
        let url = info
            .webpage_url
            .or(info.url)
            .unwrap_or_else(|| format!("ytsearch:{}", info.title));

        let mut track = Track::new(info.title, url, SourceType::YouTube, requested_by);
        if let Some(uploader) = info.uploader {
            track = track.with_artist(uploader);
        }
        if let Some(duration) = info.duration {
            track = track.with_duration(Duration::from_secs_f64(duration.max(0.0)));
        }
        if let Some(thumbnail) = info.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }
        track
    }
}

impl Default for YouTubeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MusicProvider for YouTubeProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|_| MusicError::source("youtube", "limitador de peticiones cerrado"))?;

        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch{}:{}", limit.max(1), query);
        let stdout = run_ytdlp(
            "youtube",
            &[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ],
        )
        .await?;

        let mut results = Vec::new();
        for line in stdout.lines() {
            if let Ok(info) = serde_json::from_str::<YtDlpInfo>(line) {
                results.push(self.info_to_track(info, RequesterId::default()));
            }
        }

        Ok(results)
    }

    async fn resolve_stream_url(&self, track: &Track) -> Result<String> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|_| MusicError::source("youtube", "limitador de peticiones cerrado"))?;

        debug!("🎵 Obteniendo URL de stream para: {}", track.url());

        let stdout = run_ytdlp(
            "youtube",
            &[
                "--no-playlist",
                "-f",
                "bestaudio/best",
                "--get-url",
                "--no-warnings",
                track.url(),
            ],
        )
        .await
        .map_err(|err| MusicError::resolution(track.title(), err.to_string()))?;

        let stream_url = stdout.trim().to_string();
        if stream_url.is_empty() {
            return Err(MusicError::resolution(track.title(), "yt-dlp no devolvió URL"));
        }

        Ok(stream_url)
    }

    async fn track_from_url(&self, url: &str, requested_by: RequesterId) -> Result<Option<Track>> {
        if !self.is_valid_url(url) {
            return Ok(None);
        }

        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|_| MusicError::source("youtube", "limitador de peticiones cerrado"))?;

        debug!("📊 Obteniendo info de: {}", url);

        let stdout = run_ytdlp(
            "youtube",
            &["--no-playlist", "--dump-json", "--no-warnings", url],
        )
        .await?;

        let info: YtDlpInfo = serde_json::from_str(stdout.trim())
            .map_err(|err| MusicError::source("youtube", format!("respuesta de yt-dlp inválida: {err}")))?;

        Ok(Some(self.info_to_track(info, requested_by)))
    }

    fn is_valid_url(&self, url: &str) -> bool {
        Self::is_youtube_url(url)
    }

    fn is_configured(&self) -> bool {
        // yt-dlp no requiere credenciales
        true
    }

    fn source_name(&self) -> &'static str {
        "YouTube"
    }

    fn source_type(&self) -> SourceType {
        SourceType::YouTube
    }
}

/// Ejecuta yt-dlp y devuelve su stdout completo.
pub(crate) async fn run_ytdlp(source: &'static str, args: &[&str]) -> Result<String> {
    let output = Command::new("yt-dlp")
        .args(args)
        .output()
        .await
        .map_err(|err| MusicError::source(source, format!("error al ejecutar yt-dlp: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MusicError::source(source, format!("yt-dlp error: {}", stderr.trim())));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_url_detection() {
        assert!(YouTubeProvider::is_youtube_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(YouTubeProvider::is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(YouTubeProvider::is_youtube_url(
            "https://music.youtube.com/watch?v=test"
        ));
        assert!(!YouTubeProvider::is_youtube_url("https://example.com/video"));
        assert!(!YouTubeProvider::is_youtube_url("no es una url"));
    }

    #[test]
    fn test_video_id_extraction() {
        assert_eq!(
            YouTubeProvider::extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            YouTubeProvider::extract_video_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(YouTubeProvider::extract_video_id("https://example.com"), None);
    }
}
