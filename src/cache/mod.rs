//! # Cache Module
//!
//! Prebuffering de URLs de stream para Open Groove.
//!
//! Resolver la URL reproducible de un track cuesta una o varias llamadas
//! de red (extracción de yt-dlp, salto catálogo→video). Este módulo las
//! adelanta en segundo plano para los próximos tracks de la cola, de modo
//! que el cambio de track no tenga hueco audible.
//!
//! ## Garantías
//!
//! - **Deduplicación**: peticiones concurrentes por la misma clave
//!   convergen en una única resolución compartida
//! - **Contención**: un fallo en segundo plano nunca llega al llamador;
//!   solo se nota como miss y se resuelve en directo al reproducir
//! - **Presupuesto de red**: ventana de enfriamiento entre oleadas y
//!   espaciado entre candidatos para no competir con el stream en vivo
//! - **Memoria acotada**: evicción de las entradas más antiguas al superar
//!   la capacidad configurada

pub mod prebuffer;

pub use prebuffer::PrebufferCache;

/// Estadísticas del caché de prebuffering; solo observabilidad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Entradas totales (resueltas + en vuelo).
    pub entries: usize,
    /// Entradas con URL de stream ya resuelta.
    pub resolved: usize,
    /// Resoluciones todavía en curso.
    pub in_flight: usize,
}
