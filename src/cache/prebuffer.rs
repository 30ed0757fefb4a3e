use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

use super::CacheStats;
use crate::audio::queue::QueueSnapshot;
use crate::config::Config;
use crate::error::{MusicError, Result};
use crate::sources::{SourceManager, Track};

/// Resolución compartida: todos los interesados en la misma clave esperan
/// el mismo futuro en lugar de duplicar la llamada de red.
type SharedResolution = Shared<BoxFuture<'static, std::result::Result<String, Arc<MusicError>>>>;

#[derive(Clone)]
enum CacheEntry {
    Resolved(String),
    InFlight(SharedResolution),
}

/// Caché especulativo de URLs de stream, compartido entre sesiones.
///
/// Claves `plataforma:url-fuente`. La única vía de escritura es el propio
/// caché; las entradas fallidas se eliminan (sin caché negativo) y el
/// resultado de una resolución cuya entrada ya no existe se descarta.
pub struct PrebufferCache {
    entries: DashMap<String, CacheEntry>,
    /// Orden de inserción para la evicción más-antiguo-primero.
    order: Mutex<VecDeque<String>>,
    last_warm: Mutex<Option<Instant>>,
    sources: Arc<SourceManager>,
    max_entries: usize,
    eviction_margin: usize,
    lookahead: usize,
    cooldown: Duration,
    spacing: Duration,
}

fn cache_key(track: &Track) -> String {
    format!("{}:{}", track.source_type(), track.url())
}

impl PrebufferCache {
    pub fn new(sources: Arc<SourceManager>, config: &Config) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            last_warm: Mutex::new(None),
            sources,
            max_entries: config.prebuffer_cache_size,
            eviction_margin: config.prebuffer_eviction_margin,
            lookahead: config.prebuffer_lookahead,
            cooldown: config.prebuffer_cooldown(),
            spacing: config.prebuffer_spacing(),
        }
    }

    /// Resuelve la URL reproducible de un track.
    ///
    /// Orden: entrada resuelta → resolución en curso → resolución fresca.
    /// Un fallo de la resolución en curso (que nació en segundo plano) no
    /// se propaga: se cae a la resolución fresca, que es a la vez el único
    /// reintento. La resolución fresca también se registra como en-curso
    /// para que llamadores concurrentes converjan en una sola llamada al
    /// proveedor.
    pub async fn resolve_stream_url(self: &Arc<Self>, track: &Track) -> Result<String> {
        if !track.needs_resolution() {
            return self.sources.resolve_stream_url(track).await;
        }

        let key = cache_key(track);
        match self.lookup(&key) {
            Some(CacheEntry::Resolved(url)) => {
                debug!("✅ Prebuffer hit: {}", key);
                return Ok(url);
            }
            Some(CacheEntry::InFlight(pending)) => {
                debug!("⏳ Esperando resolución en curso: {}", key);
                match pending.await {
                    Ok(url) => return Ok(url),
                    Err(err) => {
                        debug!("♻️ Resolución especulativa falló ({}), resolviendo en directo", err);
                    }
                }
            }
            None => {}
        }

        let fresh = self.start_resolution(track.clone());
        fresh.await.map_err(|err| match err.as_ref() {
            MusicError::UnsupportedPlatform(platform) => MusicError::UnsupportedPlatform(*platform),
            other => MusicError::resolution(track.title(), other.to_string()),
        })
    }

    /// Calienta los próximos tracks de la cola en segundo plano.
    ///
    /// No bloquea al llamador. Dentro de la ventana de enfriamiento es un
    /// no-op: el stream en vivo tiene prioridad sobre cualquier ráfaga de
    /// resoluciones. Solo se consideran los tracks que siguen al cursor y
    /// cuya resolución no es trivial.
    pub fn warm_next(self: &Arc<Self>, snapshot: &QueueSnapshot) {
        {
            let mut last = self.last_warm.lock();
            let now = Instant::now();
            if let Some(previous) = *last {
                if now.duration_since(previous) < self.cooldown {
                    debug!("🧊 Prebuffering en enfriamiento, ignorado");
                    return;
                }
            }
            *last = Some(now);
        }

        let start = snapshot.current.map_or(0, |i| i + 1);
        let candidates: Vec<Track> = snapshot
            .tracks
            .iter()
            .skip(start)
            .take(self.lookahead)
            .filter(|t| t.needs_resolution())
            .filter(|t| !self.entries.contains_key(&cache_key(t)))
            .cloned()
            .collect();

        if candidates.is_empty() {
            return;
        }

        debug!("🔮 Prebuffering de {} candidato(s)", candidates.len());

        let cache = Arc::clone(self);
        tokio::spawn(async move {
            for (i, track) in candidates.into_iter().enumerate() {
                // espaciar los arranques evita una ráfaga de resoluciones
                if i > 0 {
                    sleep(cache.spacing).await;
                }
                let _ = cache.start_resolution(track);
            }
        });
    }

    /// Estadísticas actuales; sin efectos secundarios.
    pub fn stats(&self) -> CacheStats {
        let mut resolved = 0;
        let mut in_flight = 0;
        for entry in self.entries.iter() {
            match entry.value() {
                CacheEntry::Resolved(_) => resolved += 1,
                CacheEntry::InFlight(_) => in_flight += 1,
            }
        }
        CacheStats {
            entries: self.entries.len(),
            resolved,
            in_flight,
        }
    }

    fn lookup(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Registra una resolución en curso para la clave del track y devuelve
    /// el futuro compartido. Si otra resolución ganó la carrera, devuelve
    /// la suya. El propio futuro asienta el resultado: escribe la entrada
    /// resuelta o la elimina al fallar, de modo que al completarse la vista
    /// del caché ya es consistente.
    fn start_resolution(self: &Arc<Self>, track: Track) -> SharedResolution {
        let key = cache_key(&track);

        let resolution: SharedResolution = {
            let cache = Arc::clone(self);
            let key = key.clone();
            async move {
                match cache.sources.resolve_stream_url(&track).await {
                    Ok(url) => {
                        // si la entrada fue evicta mientras tanto, el
                        // resultado se descarta sin resucitar nada
                        if let Some(mut entry) = cache.entries.get_mut(&key) {
                            *entry = CacheEntry::Resolved(url.clone());
                        }
                        Ok(url)
                    }
                    Err(err) => {
                        warn!("⚠️ Prebuffer falló para {}: {}", key, err);
                        cache.entries.remove(&key);
                        Err(Arc::new(err))
                    }
                }
            }
            .boxed()
            .shared()
        };

        match self.entries.entry(key.clone()) {
            Entry::Occupied(existing) => {
                return match existing.get() {
                    CacheEntry::Resolved(url) => {
                        let url = url.clone();
                        async move { Ok(url) }.boxed().shared()
                    }
                    CacheEntry::InFlight(pending) => pending.clone(),
                };
            }
            Entry::Vacant(slot) => {
                slot.insert(CacheEntry::InFlight(resolution.clone()));
            }
        }

        self.order.lock().push_back(key);
        self.evict_if_over_capacity();

        // conductor: garantiza que la resolución progresa aunque todos los
        // interesados en primer plano se hayan cancelado
        let driver = resolution.clone();
        tokio::spawn(async move {
            let _ = driver.await;
        });

        resolution
    }

    /// Evicción más-antiguo-primero: al superar la capacidad por el margen
    /// configurado, recorta hasta volver a la capacidad.
    fn evict_if_over_capacity(&self) {
        if self.entries.len() <= self.max_entries + self.eviction_margin {
            return;
        }

        let mut order = self.order.lock();
        let mut evicted = 0usize;
        while self.entries.len() > self.max_entries {
            // claves ya eliminadas por fallo siguen en la lista; saltarlas
            let Some(key) = order.pop_front() else {
                break;
            };
            if self.entries.remove(&key).is_some() {
                evicted += 1;
            }
        }

        if evicted > 0 {
            debug!("🗑️ Prebuffer evictó {} entrada(s) antiguas", evicted);
        }
    }
}
