use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::youtube::run_ytdlp;
use super::{MusicProvider, SourceType, Track};
use crate::error::{MusicError, Result};
use crate::RequesterId;

/// Cliente de SoundCloud respaldado por yt-dlp.
///
/// yt-dlp resuelve enlaces y búsquedas (`scsearch`) de SoundCloud sin
/// credenciales; un client id propio solo amplía el acceso.
pub struct SoundCloudProvider {
    #[allow(dead_code)]
    client_id: Option<String>,
    rate_limiter: Semaphore,
}

#[derive(Debug, Deserialize)]
struct ScInfo {
    title: String,
    duration: Option<f64>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
}

impl SoundCloudProvider {
    pub fn new(client_id: Option<String>) -> Self {
        Self {
            client_id,
            rate_limiter: Semaphore::new(2),
        }
    }

    fn info_to_track(info: ScInfo, requested_by: RequesterId) -> Track {
        let url = info
            .webpage_url
            .unwrap_or_else(|| format!("scsearch:{}", info.title));

        let mut track = Track::new(info.title, url, SourceType::SoundCloud, requested_by);
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

#[async_trait]
impl MusicProvider for SoundCloudProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|_| MusicError::source("soundcloud", "limitador de peticiones cerrado"))?;

        info!("🔍 Buscando en SoundCloud: {}", query);

        let search_query = format!("scsearch{}:{}", limit.max(1), query);
        let stdout = run_ytdlp(
            "soundcloud",
            &[
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
            if let Ok(info) = serde_json::from_str::<ScInfo>(line) {
                results.push(Self::info_to_track(info, RequesterId::default()));
            }
        }

        Ok(results)
    }

    async fn resolve_stream_url(&self, track: &Track) -> Result<String> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|_| MusicError::source("soundcloud", "limitador de peticiones cerrado"))?;

        debug!("🎵 Obteniendo URL de stream para: {}", track.url());

        let stdout = run_ytdlp(
            "soundcloud",
            &["-f", "bestaudio/best", "--get-url", "--no-warnings", track.url()],
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
            .map_err(|_| MusicError::source("soundcloud", "limitador de peticiones cerrado"))?;

        let stdout = run_ytdlp("soundcloud", &["--dump-json", "--no-warnings", url]).await?;
        let info: ScInfo = serde_json::from_str(stdout.trim())
            .map_err(|err| MusicError::source("soundcloud", format!("respuesta de yt-dlp inválida: {err}")))?;

        Ok(Some(Self::info_to_track(info, requested_by)))
    }

    fn is_valid_url(&self, url: &str) -> bool {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h == "soundcloud.com" || h.ends_with(".soundcloud.com")))
            .unwrap_or(false)
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn source_name(&self) -> &'static str {
        "soundcloud"
    }

    fn source_type(&self) -> SourceType {
        SourceType::SoundCloud
    }
}
