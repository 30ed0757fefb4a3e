use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::guard::RequestGuard;
use crate::audio::queue::{QueueEngine, QueueSnapshot};
use crate::audio::sink::{AudioSink, ConnectionParams, SinkHandle, StreamEnd};
use crate::cache::{CacheStats, PrebufferCache};
use crate::config::Config;
use crate::error::{MusicError, Result};
use crate::sources::{SourceManager, Track};
use crate::SessionId;

/// Estado de reproducción de una sesión.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Connecting,
    Playing,
    Paused,
}

/// Estado interno por sesión; vive bajo el mutex de su sesión, que es el
/// dominio de serialización de todas las transiciones de reproducción.
struct PlayerSession {
    state: PlayerState,
    connection: Option<SinkHandle>,
    /// Generación del stream vigente. Un evento de fin (o una resolución)
    /// de una generación anterior es obsoleto y se descarta.
    generation: u64,
    idle_timer: Option<CancellationToken>,
}

impl PlayerSession {
    fn new() -> Self {
        Self {
            state: PlayerState::Idle,
            connection: None,
            generation: 0,
            idle_timer: None,
        }
    }

    fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.cancel();
        }
    }
}

/// Controlador de reproducción y fachada del núcleo.
///
/// Posee la conexión de audio viva de cada sesión y la máquina de estados
/// Idle → Connecting → Playing ⇄ Paused. Cada sesión se serializa con su
/// propio mutex: operaciones de sesiones distintas nunca se bloquean entre
/// sí. La aplicación construye un `AudioPlayer` y reparte los `SessionId`;
/// no hay registros globales ambientales.
pub struct AudioPlayer {
    sessions: DashMap<SessionId, Arc<Mutex<PlayerSession>>>,
    queues: Arc<QueueEngine>,
    prebuffer: Arc<PrebufferCache>,
    sink: Arc<dyn AudioSink>,
    guard: RequestGuard,
    idle_timeout: tokio::time::Duration,
    prebuffer_trigger_delay: tokio::time::Duration,
}

impl AudioPlayer {
    pub fn new(config: &Config, sources: Arc<SourceManager>, sink: Arc<dyn AudioSink>) -> Self {
        let queues = Arc::new(QueueEngine::new(config.max_queue_size, config.default_volume));
        let prebuffer = Arc::new(PrebufferCache::new(sources, config));

        Self {
            sessions: DashMap::new(),
            queues,
            prebuffer,
            sink,
            guard: RequestGuard::new(),
            idle_timeout: config.idle_timeout(),
            prebuffer_trigger_delay: config.prebuffer_trigger_delay(),
        }
    }

    fn session(&self, session: SessionId) -> Arc<Mutex<PlayerSession>> {
        self.sessions
            .entry(session)
            .or_insert_with(|| Arc::new(Mutex::new(PlayerSession::new())))
            .clone()
    }

    /// Agrega un track a la cola de la sesión.
    ///
    /// Rechaza con [`MusicError::DuplicateRequest`] si una petición
    /// idéntica del mismo usuario sigue en curso y con
    /// [`MusicError::CapacityExceeded`] si la cola está llena. Si ya hay
    /// reproducción activa, dispara el prebuffering de los siguientes
    /// tracks.
    pub async fn add_track(self: &Arc<Self>, session: SessionId, track: Track) -> Result<()> {
        let _permit = self
            .guard
            .try_acquire(session, track.requested_by(), track.url())
            .ok_or(MusicError::DuplicateRequest)?;

        if !self.queues.add_track(session, track.clone()) {
            return Err(MusicError::CapacityExceeded {
                max: self.queues.max_queue_size(),
            });
        }

        info!("➕ [{}] agregado a la cola: {}", session, track.title());

        let slot = self.session(session);
        let mut state = slot.lock().await;
        // material nuevo: una desconexión por inactividad ya no procede
        state.cancel_idle_timer();
        let active = matches!(state.state, PlayerState::Playing | PlayerState::Paused);
        drop(state);

        if active {
            self.trigger_prebuffering(session);
        }

        Ok(())
    }

    /// Inicia la reproducción del track actual de la cola.
    ///
    /// Abre la conexión si no existe y resuelve la URL del track de forma
    /// bloqueante (el caché de prebuffering solo acelera ese camino).
    /// Devuelve `None` si la cola no tiene nada que reproducir.
    pub async fn play(self: &Arc<Self>, session: SessionId, params: ConnectionParams) -> Result<Option<Track>> {
        let slot = self.session(session);
        let mut state = slot.lock().await;

        state.cancel_idle_timer();

        if matches!(state.state, PlayerState::Playing | PlayerState::Paused) {
            debug!("▶️ [{}] ya hay reproducción activa", session);
            return Ok(self.queues.current_track(session));
        }

        if state.connection.is_none() {
            state.state = PlayerState::Connecting;
            debug!("🔌 [{}] abriendo conexión de audio", session);
            match self.sink.open(params).await {
                Ok(handle) => state.connection = Some(handle),
                Err(err) => {
                    error!("❌ [{}] no se pudo abrir la conexión: {}", session, err);
                    state.state = PlayerState::Idle;
                    return Err(err);
                }
            }
        }

        // posicionar el cursor si todavía no apunta a ningún track
        let track = match self.queues.current_track(session) {
            Some(current) => Some(current),
            None => self.queues.advance(session),
        };

        let Some(track) = track else {
            debug!("📭 [{}] cola vacía, nada que reproducir", session);
            state.state = PlayerState::Idle;
            self.arm_idle_timer(session, &mut state);
            return Ok(None);
        };

        self.start_stream(session, &mut state, &track).await?;
        Ok(Some(track))
    }

    /// Pausa la reproducción actual. `false` si no hay nada reproduciéndose.
    pub async fn pause(&self, session: SessionId) -> bool {
        let slot = self.session(session);
        let mut state = slot.lock().await;

        if state.state != PlayerState::Playing {
            return false;
        }
        let Some(handle) = state.connection else {
            return false;
        };

        if let Err(err) = self.sink.pause(handle).await {
            warn!("⚠️ [{}] el sink no pudo pausar: {}", session, err);
            return false;
        }

        state.state = PlayerState::Paused;
        self.queues.set_paused(session, true);
        info!("⏸️ [{}] reproducción pausada", session);
        true
    }

    /// Reanuda una reproducción pausada. `false` si no hay pausa activa.
    pub async fn resume(&self, session: SessionId) -> bool {
        let slot = self.session(session);
        let mut state = slot.lock().await;

        state.cancel_idle_timer();

        if state.state != PlayerState::Paused {
            return false;
        }
        let Some(handle) = state.connection else {
            return false;
        };

        if let Err(err) = self.sink.resume(handle).await {
            warn!("⚠️ [{}] el sink no pudo reanudar: {}", session, err);
            return false;
        }

        state.state = PlayerState::Playing;
        self.queues.set_paused(session, false);
        info!("▶️ [{}] reproducción reanudada", session);
        true
    }

    /// Salta al siguiente track de la cola.
    ///
    /// Detiene el stream actual de inmediato; devuelve el nuevo track o
    /// `None` si la cola quedó agotada (la sesión pasa a Idle con periodo
    /// de gracia).
    pub async fn skip(self: &Arc<Self>, session: SessionId) -> Result<Option<Track>> {
        let slot = self.session(session);
        let mut state = slot.lock().await;

        if !matches!(state.state, PlayerState::Playing | PlayerState::Paused) {
            return Ok(None);
        }

        // invalidar el stream vigente antes de tocarlo: su evento de fin
        // llegará tarde y debe descartarse
        state.generation += 1;
        if let Some(handle) = state.connection {
            let _ = self.sink.stop(handle).await;
        }

        match self.queues.advance(session) {
            Some(next) => {
                info!("⏭️ [{}] saltando a: {}", session, next.title());
                self.start_stream(session, &mut state, &next).await?;
                Ok(Some(next))
            }
            None => {
                info!("⏭️ [{}] cola agotada tras el salto", session);
                state.state = PlayerState::Idle;
                self.arm_idle_timer(session, &mut state);
                Ok(None)
            }
        }
    }

    /// Detiene la reproducción, limpia la cola y cierra la conexión.
    pub async fn stop(&self, session: SessionId) -> Result<()> {
        self.teardown(session, "stop").await
    }

    /// Fuerza la transición a Idle y libera la conexión; para cuando el
    /// canal de voz se queda sin oyentes o vence el periodo de gracia.
    pub async fn disconnect(&self, session: SessionId) -> Result<()> {
        self.teardown(session, "disconnect").await
    }

    async fn teardown(&self, session: SessionId, reason: &str) -> Result<()> {
        let slot = self.session(session);
        let mut state = slot.lock().await;

        state.generation += 1;
        state.cancel_idle_timer();

        if let Some(handle) = state.connection.take() {
            let _ = self.sink.stop(handle).await;
            if let Err(err) = self.sink.close(handle).await {
                warn!("⚠️ [{}] error al cerrar la conexión: {}", session, err);
            }
        }

        self.queues.reset(session);
        state.state = PlayerState::Idle;
        info!("⏹️ [{}] sesión detenida ({})", session, reason);
        Ok(())
    }

    /// Ajusta el volumen de la sesión. Solo surte efecto con reproducción
    /// activa; la puerta la pone la cola.
    pub async fn set_volume(&self, session: SessionId, volume: f32) -> bool {
        let clamped = volume.clamp(0.0, 1.0);
        if !self.queues.set_volume(session, clamped) {
            return false;
        }

        let slot = self.session(session);
        let state = slot.lock().await;
        if let Some(handle) = state.connection {
            let _ = self.sink.set_gain(handle, clamped).await;
        }

        info!("🔊 [{}] volumen ajustado a {}%", session, (clamped * 100.0) as u8);
        true
    }

    /// Programa el calentamiento de los próximos tracks.
    ///
    /// El retraso deliberado deja que el arranque del stream en vivo
    /// consuma su presupuesto de red antes de cualquier resolución
    /// especulativa.
    pub fn trigger_prebuffering(self: &Arc<Self>, session: SessionId) {
        let player = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(player.prebuffer_trigger_delay).await;
            let snapshot = player.queues.snapshot(session);
            player.prebuffer.warm_next(&snapshot);
        });
    }

    /// Vista de la cola de la sesión.
    pub fn get_queue(&self, session: SessionId) -> QueueSnapshot {
        self.queues.snapshot(session)
    }

    /// Track bajo el cursor de la sesión, si hay.
    pub fn current_track(&self, session: SessionId) -> Option<Track> {
        self.queues.current_track(session)
    }

    /// Estadísticas del caché de prebuffering.
    pub fn cache_stats(&self) -> CacheStats {
        self.prebuffer.stats()
    }

    /// Estado actual de la máquina de reproducción de la sesión.
    pub async fn state(&self, session: SessionId) -> PlayerState {
        let slot = self.session(session);
        let state = slot.lock().await;
        state.state
    }

    /// Arranca el stream del track dado sobre la conexión de la sesión.
    /// Se llama con el mutex de sesión tomado; la resolución del track
    /// actual es deliberadamente bloqueante respecto a `play`.
    async fn start_stream(
        self: &Arc<Self>,
        session: SessionId,
        state: &mut PlayerSession,
        track: &Track,
    ) -> Result<()> {
        let Some(handle) = state.connection else {
            state.state = PlayerState::Idle;
            return Err(MusicError::Connection("sin conexión de audio".into()));
        };

        info!("🎵 [{}] reproduciendo: {}", session, track.title());

        let stream_url = match self.prebuffer.resolve_stream_url(track).await {
            Ok(url) => url,
            Err(err) => {
                error!("❌ [{}] resolución falló para {}: {}", session, track.title(), err);
                state.state = PlayerState::Idle;
                self.queues.set_playing(session, false);
                return Err(err);
            }
        };

        let ended = match self.sink.stream_from(handle, &stream_url).await {
            Ok(receiver) => receiver,
            Err(err) => {
                error!("❌ [{}] el sink no pudo iniciar el stream: {}", session, err);
                state.state = PlayerState::Idle;
                self.queues.set_playing(session, false);
                return Err(err);
            }
        };

        let _ = self.sink.set_gain(handle, self.queues.volume(session)).await;

        state.state = PlayerState::Playing;
        state.generation += 1;
        self.queues.set_playing(session, true);
        self.spawn_end_watcher(session, state.generation, ended);
        self.trigger_prebuffering(session);

        Ok(())
    }

    fn spawn_end_watcher(
        self: &Arc<Self>,
        session: SessionId,
        generation: u64,
        ended: oneshot::Receiver<StreamEnd>,
    ) {
        let player = Arc::clone(self);
        tokio::spawn(async move {
            // un sender descartado equivale a perder el transporte
            let end = ended.await.unwrap_or(StreamEnd::Failed);
            player.handle_stream_end(session, generation, end).await;
        });
    }

    async fn handle_stream_end(self: &Arc<Self>, session: SessionId, generation: u64, end: StreamEnd) {
        let slot = self.session(session);
        let mut state = slot.lock().await;

        if state.generation != generation {
            debug!("🌀 [{}] evento de stream obsoleto (gen {}), ignorado", session, generation);
            return;
        }

        match end {
            // skip/stop ya hicieron la transición bajo este mismo mutex
            StreamEnd::Stopped => {}
            StreamEnd::Failed => {
                error!("❌ [{}] el transporte falló durante la reproducción", session);
                self.queues.set_playing(session, false);
                state.state = PlayerState::Idle;
                self.arm_idle_timer(session, &mut state);
            }
            StreamEnd::Finished => match self.queues.advance(session) {
                Some(next) => {
                    debug!("⏭️ [{}] fin natural, encadenando siguiente track", session);
                    if let Err(err) = self.start_stream(session, &mut state, &next).await {
                        error!("❌ [{}] no se pudo encadenar {}: {}", session, next.title(), err);
                        self.arm_idle_timer(session, &mut state);
                    }
                }
                None => {
                    info!("📭 [{}] cola agotada, esperando material nuevo", session);
                    state.state = PlayerState::Idle;
                    self.arm_idle_timer(session, &mut state);
                }
            },
        }
    }

    /// Arma el temporizador de gracia: si la sesión sigue inactiva al
    /// vencer, se desconecta. Cualquier `play`/`resume`/`add_track`
    /// posterior lo cancela.
    fn arm_idle_timer(self: &Arc<Self>, session: SessionId, state: &mut PlayerSession) {
        state.cancel_idle_timer();

        let token = CancellationToken::new();
        state.idle_timer = Some(token.clone());

        let player = Arc::clone(self);
        let timeout = self.idle_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    info!("💤 [{}] inactiva tras el periodo de gracia, desconectando", session);
                    if let Err(err) = player.disconnect(session).await {
                        warn!("⚠️ [{}] error al desconectar por inactividad: {}", session, err);
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;

    use crate::sources::{MusicProvider, SourceType};
    use crate::{ChannelId, RequesterId};

    /// Fuente de prueba: resuelve al instante con una URL derivada.
    struct InstantProvider;

    #[async_trait]
    impl MusicProvider for InstantProvider {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<Track>> {
            Ok(Vec::new())
        }

        async fn resolve_stream_url(&self, track: &Track) -> Result<String> {
            Ok(format!("https://stream.example.com/{}", track.title()))
        }

        async fn track_from_url(&self, _url: &str, _requested_by: RequesterId) -> Result<Option<Track>> {
            Ok(None)
        }

        fn is_valid_url(&self, _url: &str) -> bool {
            false
        }

        fn is_configured(&self) -> bool {
            true
        }

        fn source_name(&self) -> &'static str {
            "instant"
        }

        fn source_type(&self) -> SourceType {
            SourceType::YouTube
        }
    }

    #[derive(Default)]
    struct SinkState {
        current: Option<oneshot::Sender<StreamEnd>>,
        streamed_urls: Vec<String>,
        gain: Option<f32>,
        paused: bool,
        open_connections: u64,
        closed: u64,
    }

    /// Sink de prueba: registra las URLs transmitidas y permite terminar
    /// el stream activo a mano.
    #[derive(Default)]
    struct FakeSink {
        next_handle: AtomicU64,
        state: SyncMutex<SinkState>,
    }

    impl FakeSink {
        fn finish_current(&self) {
            let sender = self.state.lock().current.take();
            if let Some(sender) = sender {
                let _ = sender.send(StreamEnd::Finished);
            }
        }

        fn streamed_urls(&self) -> Vec<String> {
            self.state.lock().streamed_urls.clone()
        }

        fn closed(&self) -> u64 {
            self.state.lock().closed
        }
    }

    #[async_trait]
    impl AudioSink for FakeSink {
        async fn open(&self, _params: ConnectionParams) -> Result<SinkHandle> {
            let raw = self.next_handle.fetch_add(1, Ordering::SeqCst);
            self.state.lock().open_connections += 1;
            Ok(SinkHandle::new(raw))
        }

        async fn stream_from(&self, _handle: SinkHandle, url: &str) -> Result<oneshot::Receiver<StreamEnd>> {
            let (tx, rx) = oneshot::channel();
            let mut state = self.state.lock();
            state.streamed_urls.push(url.to_string());
            state.current = Some(tx);
            state.paused = false;
            Ok(rx)
        }

        async fn set_gain(&self, _handle: SinkHandle, gain: f32) -> Result<()> {
            self.state.lock().gain = Some(gain);
            Ok(())
        }

        async fn pause(&self, _handle: SinkHandle) -> Result<()> {
            self.state.lock().paused = true;
            Ok(())
        }

        async fn resume(&self, _handle: SinkHandle) -> Result<()> {
            self.state.lock().paused = false;
            Ok(())
        }

        async fn stop(&self, _handle: SinkHandle) -> Result<()> {
            let sender = self.state.lock().current.take();
            if let Some(sender) = sender {
                let _ = sender.send(StreamEnd::Stopped);
            }
            Ok(())
        }

        async fn close(&self, _handle: SinkHandle) -> Result<()> {
            self.state.lock().closed += 1;
            Ok(())
        }
    }

    const S1: SessionId = SessionId(500);

    fn params() -> ConnectionParams {
        ConnectionParams {
            session: S1,
            channel: ChannelId(42),
        }
    }

    fn track(name: &str, requester: u64) -> Track {
        Track::new(
            name,
            format!("https://www.youtube.com/watch?v={name}"),
            SourceType::YouTube,
            RequesterId(requester),
        )
    }

    fn player_with(sink: Arc<FakeSink>, config: &Config) -> Arc<AudioPlayer> {
        let sources = Arc::new(SourceManager::with_providers(vec![
            Arc::new(InstantProvider) as Arc<dyn MusicProvider>
        ]));
        Arc::new(AudioPlayer::new(config, sources, sink))
    }

    /// Cede el control hasta que las tareas de fondo (watchers, timers)
    /// alcancen la condición.
    async fn settle(condition: impl Fn() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("las tareas de fondo no alcanzaron el estado esperado");
    }

    #[tokio::test(start_paused = true)]
    async fn add_then_play_streams_the_first_track() {
        let sink = Arc::new(FakeSink::default());
        let player = player_with(Arc::clone(&sink), &Config::default());

        player.add_track(S1, track("a", 1)).await.unwrap();
        let started = player.play(S1, params()).await.unwrap().unwrap();

        assert_eq!(started.title(), "a");
        assert_eq!(player.current_track(S1).unwrap().title(), "a");
        assert_eq!(player.state(S1).await, PlayerState::Playing);
        assert_eq!(sink.streamed_urls(), vec!["https://stream.example.com/a"]);
        assert!(player.get_queue(S1).playing);
    }

    #[tokio::test(start_paused = true)]
    async fn play_on_an_empty_queue_is_a_noop() {
        let sink = Arc::new(FakeSink::default());
        let player = player_with(Arc::clone(&sink), &Config::default());

        let started = player.play(S1, params()).await.unwrap();
        assert!(started.is_none());
        assert_eq!(player.state(S1).await, PlayerState::Idle);
        assert!(sink.streamed_urls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn skip_moves_to_the_next_track_and_keeps_playing() {
        let sink = Arc::new(FakeSink::default());
        let player = player_with(Arc::clone(&sink), &Config::default());

        player.add_track(S1, track("a", 1)).await.unwrap();
        player.add_track(S1, track("b", 1)).await.unwrap();
        player.play(S1, params()).await.unwrap();

        let next = player.skip(S1).await.unwrap().unwrap();

        assert_eq!(next.title(), "b");
        assert_eq!(player.state(S1).await, PlayerState::Playing);
        assert_eq!(player.current_track(S1).unwrap().title(), "b");
        assert_eq!(
            sink.streamed_urls(),
            vec!["https://stream.example.com/a", "https://stream.example.com/b"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn skip_on_the_last_track_goes_idle() {
        let sink = Arc::new(FakeSink::default());
        let player = player_with(Arc::clone(&sink), &Config::default());

        player.add_track(S1, track("a", 1)).await.unwrap();
        player.play(S1, params()).await.unwrap();

        let next = player.skip(S1).await.unwrap();

        assert!(next.is_none());
        assert_eq!(player.state(S1).await, PlayerState::Idle);
        assert!(!player.get_queue(S1).playing);
    }

    #[tokio::test(start_paused = true)]
    async fn natural_end_chains_into_the_next_track() {
        let sink = Arc::new(FakeSink::default());
        let player = player_with(Arc::clone(&sink), &Config::default());

        player.add_track(S1, track("a", 1)).await.unwrap();
        player.add_track(S1, track("b", 1)).await.unwrap();
        player.play(S1, params()).await.unwrap();

        sink.finish_current();
        settle(|| sink.streamed_urls().len() == 2).await;

        assert_eq!(player.current_track(S1).unwrap().title(), "b");
        assert_eq!(player.state(S1).await, PlayerState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_stream_end_does_not_double_advance() {
        let sink = Arc::new(FakeSink::default());
        let player = player_with(Arc::clone(&sink), &Config::default());

        player.add_track(S1, track("a", 1)).await.unwrap();
        player.add_track(S1, track("b", 1)).await.unwrap();
        player.add_track(S1, track("c", 1)).await.unwrap();
        player.play(S1, params()).await.unwrap();

        // el skip entrega Stopped al stream de "a"; ese evento es de una
        // generación superada y no debe avanzar la cola otra vez
        player.skip(S1).await.unwrap();
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        assert_eq!(player.current_track(S1).unwrap().title(), "b");
        assert_eq!(sink.streamed_urls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_gate_on_state() {
        let sink = Arc::new(FakeSink::default());
        let player = player_with(Arc::clone(&sink), &Config::default());

        // sin reproducción: ambos rechazan
        assert!(!player.pause(S1).await);
        assert!(!player.resume(S1).await);

        player.add_track(S1, track("a", 1)).await.unwrap();
        player.play(S1, params()).await.unwrap();

        assert!(player.pause(S1).await);
        assert_eq!(player.state(S1).await, PlayerState::Paused);
        assert!(player.get_queue(S1).paused);
        assert!(!player.pause(S1).await);

        assert!(player.resume(S1).await);
        assert_eq!(player.state(S1).await, PlayerState::Playing);
        assert!(!player.get_queue(S1).paused);
        assert!(!player.resume(S1).await);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_resets_the_queue_and_closes_the_connection() {
        let sink = Arc::new(FakeSink::default());
        let player = player_with(Arc::clone(&sink), &Config::default());

        player.add_track(S1, track("a", 1)).await.unwrap();
        player.add_track(S1, track("b", 1)).await.unwrap();
        player.play(S1, params()).await.unwrap();

        player.stop(S1).await.unwrap();

        assert_eq!(player.state(S1).await, PlayerState::Idle);
        assert!(player.get_queue(S1).is_empty());
        assert_eq!(sink.closed(), 1);

        // el evento Stopped del stream detenido no resucita nada
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(player.state(S1).await, PlayerState::Idle);
        assert_eq!(sink.streamed_urls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn set_volume_requires_active_playback() {
        let sink = Arc::new(FakeSink::default());
        let player = player_with(Arc::clone(&sink), &Config::default());

        assert!(!player.set_volume(S1, 0.8).await);

        player.add_track(S1, track("a", 1)).await.unwrap();
        player.play(S1, params()).await.unwrap();

        assert!(player.set_volume(S1, 0.8).await);
        assert_eq!(sink.state.lock().gain, Some(0.8));
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_overflow_is_reported_to_the_caller() {
        let sink = Arc::new(FakeSink::default());
        let config = Config {
            max_queue_size: 1,
            ..Config::default()
        };
        let player = player_with(Arc::clone(&sink), &config);

        player.add_track(S1, track("a", 1)).await.unwrap();
        match player.add_track(S1, track("b", 1)).await {
            Err(MusicError::CapacityExceeded { max: 1 }) => {}
            other => panic!("se esperaba CapacityExceeded, se obtuvo {other:?}"),
        }
        assert_eq!(player.get_queue(S1).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_grace_period_disconnects_the_session() {
        let sink = Arc::new(FakeSink::default());
        let config = Config {
            idle_timeout_ms: 10_000,
            ..Config::default()
        };
        let player = player_with(Arc::clone(&sink), &config);

        player.add_track(S1, track("a", 1)).await.unwrap();
        player.play(S1, params()).await.unwrap();

        // fin natural con la cola agotada: Idle con gracia, conexión viva
        sink.finish_current();
        settle(|| !player.get_queue(S1).playing).await;
        tokio::time::advance(tokio::time::Duration::from_millis(100)).await;
        assert_eq!(player.state(S1).await, PlayerState::Idle);
        assert_eq!(sink.closed(), 0);

        // vencido el periodo de gracia, la conexión se libera
        tokio::time::advance(tokio::time::Duration::from_millis(11_000)).await;
        settle(|| sink.closed() == 1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn new_material_cancels_the_idle_timer() {
        let sink = Arc::new(FakeSink::default());
        let config = Config {
            idle_timeout_ms: 10_000,
            ..Config::default()
        };
        let player = player_with(Arc::clone(&sink), &config);

        player.add_track(S1, track("a", 1)).await.unwrap();
        player.play(S1, params()).await.unwrap();
        sink.finish_current();
        settle(|| !player.get_queue(S1).playing).await;

        // a mitad de la gracia llega material nuevo
        tokio::time::advance(tokio::time::Duration::from_millis(5_000)).await;
        player.add_track(S1, track("b", 1)).await.unwrap();
        player.play(S1, params()).await.unwrap();

        tokio::time::advance(tokio::time::Duration::from_millis(11_000)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        // la sesión sigue conectada y reproduciendo
        assert_eq!(sink.closed(), 0);
        assert_eq!(player.state(S1).await, PlayerState::Playing);
        assert_eq!(player.current_track(S1).unwrap().title(), "b");
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_do_not_block_each_other() {
        let sink = Arc::new(FakeSink::default());
        let player = player_with(Arc::clone(&sink), &Config::default());
        let s2 = SessionId(501);

        player.add_track(S1, track("a", 1)).await.unwrap();
        player.add_track(s2, track("b", 1)).await.unwrap();

        player.play(S1, params()).await.unwrap();
        player
            .play(
                s2,
                ConnectionParams {
                    session: s2,
                    channel: ChannelId(43),
                },
            )
            .await
            .unwrap();

        assert_eq!(player.state(S1).await, PlayerState::Playing);
        assert_eq!(player.state(s2).await, PlayerState::Playing);
        assert_eq!(player.current_track(S1).unwrap().title(), "a");
        assert_eq!(player.current_track(s2).unwrap().title(), "b");
    }
}
