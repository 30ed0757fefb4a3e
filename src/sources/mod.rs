pub mod direct_url;
pub mod soundcloud;
pub mod spotify;
pub mod youtube;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{MusicError, Result};
use crate::RequesterId;

pub use direct_url::DirectUrlProvider;
pub use soundcloud::SoundCloudProvider;
pub use spotify::SpotifyProvider;
pub use youtube::YouTubeProvider;

/// Trait común para todas las fuentes de música.
///
/// Las fuentes sin credenciales deben reportar `is_configured() == false`
/// para ser saltadas por el router, nunca fallar.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MusicProvider: Send + Sync {
    /// Busca tracks en la fuente, mejor esfuerzo y orden de relevancia.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>>;

    /// Resuelve la URL de stream reproducible de un track.
    async fn resolve_stream_url(&self, track: &Track) -> Result<String>;

    /// Construye un track a partir de un enlace, si la fuente lo reconoce.
    async fn track_from_url(&self, url: &str, requested_by: RequesterId) -> Result<Option<Track>>;

    /// Verifica si la URL pertenece a esta fuente.
    fn is_valid_url(&self, url: &str) -> bool;

    /// Indica si la fuente tiene credenciales suficientes para operar.
    fn is_configured(&self) -> bool;

    /// Nombre de la fuente.
    fn source_name(&self) -> &'static str;

    /// Plataforma que atiende esta fuente.
    fn source_type(&self) -> SourceType;
}

/// Tipos de fuentes de música.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    YouTube,
    Spotify,
    SoundCloud,
    DirectUrl,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::YouTube => "youtube",
            SourceType::Spotify => "spotify",
            SourceType::SoundCloud => "soundcloud",
            SourceType::DirectUrl => "direct",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Representa un track de música. Inmutable una vez construido; los
/// `with_*` son constructores encadenables, no mutadores.
#[derive(Debug, Clone)]
pub struct Track {
    title: String,
    artist: Option<String>,
    duration: Option<Duration>,
    thumbnail: Option<String>,
    url: String,
    stream_url: Option<String>,
    source_type: SourceType,
    requested_by: RequesterId,
    added_at: DateTime<Utc>,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        source_type: SourceType,
        requested_by: RequesterId,
    ) -> Self {
        Self {
            title: title.into(),
            artist: None,
            duration: None,
            thumbnail: None,
            url: url.into(),
            stream_url: None,
            source_type,
            requested_by,
            added_at: Utc::now(),
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn stream_url(&self) -> Option<&str> {
        self.stream_url.as_deref()
    }
    pub fn source_type(&self) -> SourceType {
        self.source_type
    }
    pub fn requested_by(&self) -> RequesterId {
        self.requested_by
    }
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Un track necesita resolución no trivial cuando su fuente no entrega
    /// un stream directo: extracciones de la plataforma de video/audio o el
    /// salto entre plataformas del catálogo. Los enlaces directos se saltan.
    pub fn needs_resolution(&self) -> bool {
        self.stream_url.is_none() && self.source_type != SourceType::DirectUrl
    }

    // Setters encadenables
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_stream_url(mut self, stream_url: impl Into<String>) -> Self {
        self.stream_url = Some(stream_url.into());
        self
    }

    pub fn with_requested_by(mut self, requested_by: RequesterId) -> Self {
        self.requested_by = requested_by;
        self
    }
}

/// Manager para todas las fuentes de música.
///
/// Enruta por plataforma o por URL entre las fuentes configuradas; las no
/// configuradas se saltan silenciosamente.
pub struct SourceManager {
    providers: Vec<Arc<dyn MusicProvider>>,
}

impl SourceManager {
    pub fn new(config: &Config) -> Self {
        let youtube = Arc::new(YouTubeProvider::new());
        let spotify = SpotifyProvider::new(
            config.spotify_client_id.clone(),
            config.spotify_client_secret.clone(),
            Arc::clone(&youtube) as Arc<dyn MusicProvider>,
        );
        let soundcloud = SoundCloudProvider::new(config.soundcloud_client_id.clone());

        let providers: Vec<Arc<dyn MusicProvider>> = vec![
            Arc::clone(&youtube) as Arc<dyn MusicProvider>,
            Arc::new(spotify),
            Arc::new(soundcloud),
            Arc::new(DirectUrlProvider::new()),
        ];

        Self { providers }
    }

    /// Construye el manager con un conjunto arbitrario de fuentes.
    pub fn with_providers(providers: Vec<Arc<dyn MusicProvider>>) -> Self {
        Self { providers }
    }

    /// Devuelve la fuente configurada que atiende la plataforma dada.
    pub fn provider_for(&self, source_type: SourceType) -> Result<&Arc<dyn MusicProvider>> {
        self.providers
            .iter()
            .find(|p| p.source_type() == source_type && p.is_configured())
            .ok_or(MusicError::UnsupportedPlatform(source_type))
    }

    /// Resuelve la URL de stream de un track, usando la URL directa si ya
    /// la trae y delegando en su fuente en caso contrario.
    pub async fn resolve_stream_url(&self, track: &Track) -> Result<String> {
        if let Some(direct) = track.stream_url() {
            debug!("🎯 Usando URL directa de stream para: {}", track.title());
            return Ok(direct.to_string());
        }

        self.provider_for(track.source_type())?
            .resolve_stream_url(track)
            .await
    }

    /// Busca en las fuentes disponibles, en orden de prioridad, con
    /// fallback a la siguiente si una falla o no devuelve nada.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let mut last_err = None;

        for provider in self.providers.iter().filter(|p| p.is_configured()) {
            if provider.source_type() == SourceType::DirectUrl {
                continue;
            }
            match provider.search(query, limit).await {
                Ok(tracks) if !tracks.is_empty() => return Ok(tracks),
                Ok(_) => {}
                Err(err) => {
                    warn!("⚠️ Búsqueda en {} falló: {}", provider.source_name(), err);
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(err) => Err(err),
            None => Ok(Vec::new()),
        }
    }

    /// Detecta la fuente de una URL y obtiene su track.
    pub async fn track_from_url(&self, url: &str, requested_by: RequesterId) -> Result<Option<Track>> {
        for provider in &self.providers {
            if provider.is_configured() && provider.is_valid_url(url) {
                return provider.track_from_url(url, requested_by).await;
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn track(source_type: SourceType) -> Track {
        Track::new("Prueba", "https://example.com/t", source_type, RequesterId(1))
    }

    #[test]
    fn direct_tracks_do_not_need_resolution() {
        assert!(track(SourceType::YouTube).needs_resolution());
        assert!(track(SourceType::Spotify).needs_resolution());
        assert!(!track(SourceType::DirectUrl).needs_resolution());
        assert!(!track(SourceType::YouTube)
            .with_stream_url("https://cdn.example.com/a.m4a")
            .needs_resolution());
    }

    #[test]
    fn builders_fill_optional_fields() {
        let t = track(SourceType::YouTube)
            .with_artist("Artista")
            .with_duration(Duration::from_secs(180))
            .with_thumbnail("https://example.com/thumb.jpg");
        assert_eq!(t.artist(), Some("Artista"));
        assert_eq!(t.duration(), Some(Duration::from_secs(180)));
        assert_eq!(t.thumbnail(), Some("https://example.com/thumb.jpg"));
    }

    #[tokio::test]
    async fn unconfigured_providers_are_skipped() {
        let mut unconfigured = MockMusicProvider::new();
        unconfigured.expect_source_type().return_const(SourceType::Spotify);
        unconfigured.expect_is_configured().return_const(false);

        let manager =
            SourceManager::with_providers(vec![Arc::new(unconfigured) as Arc<dyn MusicProvider>]);

        let err = manager
            .provider_for(SourceType::Spotify)
            .err()
            .expect("una fuente sin credenciales no debe enrutar");
        assert!(matches!(err, MusicError::UnsupportedPlatform(SourceType::Spotify)));
    }

    #[tokio::test]
    async fn resolve_uses_preknown_stream_url_without_provider() {
        // Sin fuentes registradas: si tocara el provider, fallaría.
        let manager = SourceManager::with_providers(Vec::new());
        let t = track(SourceType::DirectUrl).with_stream_url("https://cdn.example.com/a.mp3");

        let url = manager.resolve_stream_url(&t).await.unwrap();
        assert_eq!(url, "https://cdn.example.com/a.mp3");
    }

    #[tokio::test]
    async fn resolve_routes_to_matching_provider() {
        let mut provider = MockMusicProvider::new();
        provider.expect_source_type().return_const(SourceType::YouTube);
        provider.expect_is_configured().return_const(true);
        provider
            .expect_resolve_stream_url()
            .times(1)
            .returning(|_| Ok("https://stream.example.com/audio".to_string()));

        let manager = SourceManager::with_providers(vec![Arc::new(provider) as Arc<dyn MusicProvider>]);
        let url = manager.resolve_stream_url(&track(SourceType::YouTube)).await.unwrap();
        assert_eq!(url, "https://stream.example.com/audio");
    }
}
