use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{MusicProvider, SourceType, Track};
use crate::error::{MusicError, Result};
use crate::RequesterId;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

/// Cliente de la Web API de Spotify (flujo client-credentials).
///
/// El catálogo no expone streams públicos: la resolución de audio salta a
/// la fuente compañera de video con una búsqueda "artista título". Ese
/// salto entre plataformas es exactamente lo que el prebuffering acelera.
pub struct SpotifyProvider {
    client: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    token: Mutex<Option<CachedToken>>,
    companion: Arc<dyn MusicProvider>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    items: Vec<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    name: String,
    duration_ms: u64,
    artists: Vec<ApiArtist>,
    album: Option<ApiAlbum>,
    external_urls: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiAlbum {
    images: Vec<ApiImage>,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    url: String,
}

impl SpotifyProvider {
    pub fn new(
        client_id: Option<String>,
        client_secret: Option<String>,
        companion: Arc<dyn MusicProvider>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            client_secret,
            token: Mutex::new(None),
            companion,
        }
    }

    pub fn extract_track_id(url: &str) -> Option<String> {
        static TRACK_ID: OnceLock<Regex> = OnceLock::new();
        let re = TRACK_ID
            .get_or_init(|| Regex::new(r"open\.spotify\.com/track/([A-Za-z0-9]+)").expect("regex válida"));
        re.captures(url).map(|c| c[1].to_string())
    }

    /// Obtiene un token de acceso, reutilizando el cacheado mientras siga
    /// vigente.
    async fn access_token(&self) -> Result<String> {
        let mut slot = self.token.lock().await;
        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.value.clone());
            }
        }

        let (Some(id), Some(secret)) = (self.client_id.as_ref(), self.client_secret.as_ref()) else {
            return Err(MusicError::source("spotify", "credenciales no configuradas"));
        };

        debug!("🔑 Renovando token de Spotify");

        let basic = base64::engine::general_purpose::STANDARD.encode(format!("{id}:{secret}"));
        let response = self
            .client
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {basic}"))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|err| MusicError::source("spotify", err.to_string()))?
            .error_for_status()
            .map_err(|err| MusicError::source("spotify", err.to_string()))?;

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| MusicError::source("spotify", err.to_string()))?;

        // Renovar un minuto antes de la expiración real
        let ttl = Duration::from_secs(token.expires_in.saturating_sub(60).max(30));
        let value = token.access_token.clone();
        *slot = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + ttl,
        });

        Ok(value)
    }

    async fn api_get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.access_token().await?;
        self.client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| MusicError::source("spotify", err.to_string()))?
            .error_for_status()
            .map_err(|err| MusicError::source("spotify", err.to_string()))?
            .json()
            .await
            .map_err(|err| MusicError::source("spotify", err.to_string()))
    }

    fn api_track_to_track(&self, api: ApiTrack, requested_by: RequesterId) -> Track {
        let artist = api
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let url = api
            .external_urls
            .get("spotify")
            .cloned()
            .unwrap_or_else(|| format!("https://open.spotify.com/search/{}", api.name));

        let mut track = Track::new(api.name, url, SourceType::Spotify, requested_by)
            .with_duration(Duration::from_millis(api.duration_ms));
        if !artist.is_empty() {
            track = track.with_artist(artist);
        }
        if let Some(image) = api.album.and_then(|a| a.images.into_iter().next()) {
            track = track.with_thumbnail(image.url);
        }
        track
    }
}

#[async_trait]
impl MusicProvider for SpotifyProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        info!("🔍 Buscando en Spotify: {}", query);

        let url = format!(
            "{API_BASE}/search?q={}&type=track&limit={}",
            urlencoding::encode(query),
            limit.clamp(1, 50)
        );
        let response: SearchResponse = self.api_get(&url).await?;

        Ok(response
            .tracks
            .items
            .into_iter()
            .map(|t| self.api_track_to_track(t, RequesterId::default()))
            .collect())
    }

    async fn resolve_stream_url(&self, track: &Track) -> Result<String> {
        // Salto entre plataformas: localizar el equivalente en video y
        // resolver su stream.
        let query = match track.artist() {
            Some(artist) => format!("{} {}", artist, track.title()),
            None => track.title().to_string(),
        };

        debug!("🔀 Resolviendo track de Spotify vía búsqueda: {}", query);

        let matches = self.companion.search(&query, 1).await.map_err(|err| {
            MusicError::resolution(track.title(), format!("búsqueda compañera falló: {err}"))
        })?;

        let Some(equivalent) = matches.into_iter().next() else {
            warn!("⚠️ Sin equivalente reproducible para: {}", query);
            return Err(MusicError::resolution(track.title(), "sin resultados equivalentes"));
        };

        self.companion.resolve_stream_url(&equivalent).await
    }

    async fn track_from_url(&self, url: &str, requested_by: RequesterId) -> Result<Option<Track>> {
        let Some(id) = Self::extract_track_id(url) else {
            return Ok(None);
        };

        let api_track: ApiTrack = self.api_get(&format!("{API_BASE}/tracks/{id}")).await?;
        Ok(Some(self.api_track_to_track(api_track, requested_by)))
    }

    fn is_valid_url(&self, url: &str) -> bool {
        url.contains("open.spotify.com")
    }

    fn is_configured(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    fn source_name(&self) -> &'static str {
        "spotify"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Spotify
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockMusicProvider;

    fn provider(id: Option<&str>, secret: Option<&str>) -> SpotifyProvider {
        SpotifyProvider::new(
            id.map(String::from),
            secret.map(String::from),
            Arc::new(MockMusicProvider::new()),
        )
    }

    #[test]
    fn test_track_id_extraction() {
        assert_eq!(
            SpotifyProvider::extract_track_id("https://open.spotify.com/track/6rqhFgbbKwnb9MLmUQDhG6"),
            Some("6rqhFgbbKwnb9MLmUQDhG6".to_string())
        );
        assert_eq!(
            SpotifyProvider::extract_track_id("https://open.spotify.com/playlist/xyz"),
            None
        );
    }

    #[test]
    fn unconfigured_without_credentials() {
        assert!(!provider(None, None).is_configured());
        assert!(!provider(Some("id"), None).is_configured());
        assert!(provider(Some("id"), Some("secret")).is_configured());
    }

    #[tokio::test]
    async fn resolve_hops_to_companion_provider() {
        let mut companion = MockMusicProvider::new();
        companion.expect_search().times(1).returning(|query, _| {
            assert!(query.contains("Artista"));
            Ok(vec![Track::new(
                "Canción",
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                SourceType::YouTube,
                RequesterId::default(),
            )])
        });
        companion
            .expect_resolve_stream_url()
            .times(1)
            .returning(|_| Ok("https://stream.example.com/audio".to_string()));

        let spotify = SpotifyProvider::new(
            Some("id".into()),
            Some("secret".into()),
            Arc::new(companion),
        );

        let track = Track::new(
            "Canción",
            "https://open.spotify.com/track/abc",
            SourceType::Spotify,
            RequesterId(7),
        )
        .with_artist("Artista");

        let url = spotify.resolve_stream_url(&track).await.unwrap();
        assert_eq!(url, "https://stream.example.com/audio");
    }
}
