use async_trait::async_trait;
use tracing::debug;

use super::{MusicProvider, SourceType, Track};
use crate::error::Result;
use crate::RequesterId;

const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".m4a", ".ogg", ".opus", ".wav", ".flac", ".aac", ".webm"];

/// Fuente para enlaces http(s) directos a archivos de audio.
///
/// La URL reproducible es el propio enlace, así que estos tracks son
/// triviales de resolver y el prebuffering los salta.
pub struct DirectUrlProvider;

impl DirectUrlProvider {
    pub fn new() -> Self {
        Self
    }

    fn looks_like_audio(url: &url::Url) -> bool {
        let path = url.path().to_ascii_lowercase();
        AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }

    fn file_name(url: &url::Url) -> String {
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or("audio")
            .to_string()
    }
}

impl Default for DirectUrlProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MusicProvider for DirectUrlProvider {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<Track>> {
        // Los enlaces directos no se buscan, se pegan
        Ok(Vec::new())
    }

    async fn resolve_stream_url(&self, track: &Track) -> Result<String> {
        Ok(track.url().to_string())
    }

    async fn track_from_url(&self, url: &str, requested_by: RequesterId) -> Result<Option<Track>> {
        let Ok(parsed) = url::Url::parse(url) else {
            return Ok(None);
        };
        if !self.is_valid_url(url) {
            return Ok(None);
        }

        debug!("🔗 Enlace directo aceptado: {}", url);

        let track = Track::new(Self::file_name(&parsed), url, SourceType::DirectUrl, requested_by)
            .with_stream_url(url);
        Ok(Some(track))
    }

    fn is_valid_url(&self, url: &str) -> bool {
        url::Url::parse(url)
            .map(|u| matches!(u.scheme(), "http" | "https") && Self::looks_like_audio(&u))
            .unwrap_or(false)
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn source_name(&self) -> &'static str {
        "direct"
    }

    fn source_type(&self) -> SourceType {
        SourceType::DirectUrl
    }
}
