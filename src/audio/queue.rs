use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::sources::Track;
use crate::SessionId;

/// Cola de reproducción de una sesión.
///
/// Los tracks se conservan en orden de llegada y un cursor marca el track
/// activo: `None` antes de reproducir nada, `Some(len)` una vez agotada la
/// cola. El cursor se satura en `len`, de modo que avances repetidos al
/// final son idempotentes y un agregado posterior queda como siguiente
/// track actual.
#[derive(Debug)]
pub struct SessionQueue {
    tracks: Vec<Track>,
    current: Option<usize>,
    playing: bool,
    paused: bool,
    volume: f32,
    max_size: usize,
}

impl SessionQueue {
    fn new(max_size: usize, volume: f32) -> Self {
        Self {
            tracks: Vec::new(),
            current: None,
            playing: false,
            paused: false,
            volume,
            max_size,
        }
    }

    /// Agrega un track al final. Devuelve `false` si la cola está llena;
    /// nunca trunca ni desplaza.
    pub fn push(&mut self, track: Track) -> bool {
        if self.tracks.len() >= self.max_size {
            return false;
        }
        self.tracks.push(track);
        true
    }

    /// Track bajo el cursor, si apunta dentro de la cola.
    pub fn current_track(&self) -> Option<&Track> {
        self.current.and_then(|i| self.tracks.get(i))
    }

    /// Avanza el cursor. Si queda fuera de rango, apaga `playing` y
    /// devuelve `None`; la cola no se modifica.
    pub fn advance(&mut self) -> Option<Track> {
        let next = self.current.map_or(0, |i| i.saturating_add(1));
        if next < self.tracks.len() {
            self.current = Some(next);
            Some(self.tracks[next].clone())
        } else {
            self.current = Some(self.tracks.len());
            self.playing = false;
            self.paused = false;
            None
        }
    }

    /// Vacía la cola y resetea el cursor. El volumen se preserva.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.current = None;
        self.playing = false;
        self.paused = false;
    }

    /// Cambia el volumen. Solo tiene sentido con reproducción activa; en
    /// cualquier otro estado es un no-op que devuelve `false`.
    pub fn set_volume(&mut self, volume: f32) -> bool {
        if !self.playing {
            return false;
        }
        self.volume = volume.clamp(0.0, 1.0);
        true
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current.filter(|i| *i < self.tracks.len())
    }

    fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
        self.paused = false;
        debug_assert!(
            !self.playing || self.current_track().is_some(),
            "playing sin track bajo el cursor"
        );
    }

    fn set_paused(&mut self, paused: bool) {
        if self.playing {
            self.paused = paused;
        }
    }
}

/// Vista de solo lectura de una cola, para la capa de comandos y el
/// prebuffering.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub tracks: Vec<Track>,
    pub current: Option<usize>,
    pub playing: bool,
    pub paused: bool,
    pub volume: f32,
}

impl QueueSnapshot {
    pub fn current_track(&self) -> Option<&Track> {
        self.current.and_then(|i| self.tracks.get(i))
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Registro de colas por sesión.
///
/// Las colas se crean de forma perezosa en el primer acceso y viven
/// durante todo el proceso; `reset` las vacía pero nunca las destruye.
pub struct QueueEngine {
    queues: DashMap<SessionId, Arc<RwLock<SessionQueue>>>,
    max_queue_size: usize,
    default_volume: f32,
}

impl QueueEngine {
    pub fn new(max_queue_size: usize, default_volume: f32) -> Self {
        Self {
            queues: DashMap::new(),
            max_queue_size,
            default_volume,
        }
    }

    fn queue(&self, session: SessionId) -> Arc<RwLock<SessionQueue>> {
        self.queues
            .entry(session)
            .or_insert_with(|| {
                Arc::new(RwLock::new(SessionQueue::new(self.max_queue_size, self.default_volume)))
            })
            .clone()
    }

    /// Agrega un track a la cola de la sesión. `false` si está llena.
    pub fn add_track(&self, session: SessionId, track: Track) -> bool {
        let queue = self.queue(session);
        let mut q = queue.write();
        let accepted = q.push(track);
        if accepted {
            info!("➕ [{}] track agregado, cola con {} elementos", session, q.len());
        } else {
            debug!("🚫 [{}] cola llena ({} máx), agregado rechazado", session, self.max_queue_size);
        }
        accepted
    }

    /// Vista de la cola; crea una vacía en el primer acceso, nunca falla.
    pub fn snapshot(&self, session: SessionId) -> QueueSnapshot {
        let queue = self.queue(session);
        let q = queue.read();
        QueueSnapshot {
            tracks: q.tracks.clone(),
            current: q.current_index(),
            playing: q.playing,
            paused: q.paused,
            volume: q.volume,
        }
    }

    pub fn current_track(&self, session: SessionId) -> Option<Track> {
        let queue = self.queue(session);
        let q = queue.read();
        q.current_track().cloned()
    }

    pub fn advance(&self, session: SessionId) -> Option<Track> {
        let queue = self.queue(session);
        let advanced = queue.write().advance();
        advanced
    }

    pub fn reset(&self, session: SessionId) {
        let queue = self.queue(session);
        queue.write().reset();
        debug!("🗑️ [{}] cola reseteada", session);
    }

    pub fn set_volume(&self, session: SessionId, volume: f32) -> bool {
        let queue = self.queue(session);
        let ok = queue.write().set_volume(volume);
        ok
    }

    pub fn volume(&self, session: SessionId) -> f32 {
        let queue = self.queue(session);
        let volume = queue.read().volume();
        volume
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    pub(crate) fn set_playing(&self, session: SessionId, playing: bool) {
        let queue = self.queue(session);
        queue.write().set_playing(playing);
    }

    pub(crate) fn set_paused(&self, session: SessionId, paused: bool) {
        let queue = self.queue(session);
        queue.write().set_paused(paused);
    }
}
