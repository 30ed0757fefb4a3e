//! Taxonomía de errores del núcleo de reproducción.
//!
//! El núcleo nunca produce texto de cara al usuario final; las capas de
//! comandos traducen estas variantes a mensajes. Los fallos del
//! prebuffering en segundo plano no aparecen aquí: se registran y se
//! descartan sin llegar a ningún llamador en primer plano.

use thiserror::Error;

use crate::sources::SourceType;

/// Alias de resultado para las operaciones del núcleo.
pub type Result<T> = std::result::Result<T, MusicError>;

#[derive(Debug, Error)]
pub enum MusicError {
    /// La cola de la sesión alcanzó su capacidad; el agregado se rechaza,
    /// nunca se trunca.
    #[error("la cola está llena (máximo {max} canciones)")]
    CapacityExceeded { max: usize },

    /// El proveedor no pudo producir una URL de stream reproducible.
    #[error("no se pudo resolver stream para '{title}': {reason}")]
    Resolution { title: String, reason: String },

    /// Ninguna fuente configurada atiende la plataforma del track.
    #[error("plataforma sin proveedor configurado: {0}")]
    UnsupportedPlatform(SourceType),

    /// El sink de audio falló al abrir la conexión o al transmitir.
    #[error("conexión de audio falló: {0}")]
    Connection(String),

    /// Una petición idéntica (misma sesión, usuario y consulta) ya está en
    /// curso; se rechaza en lugar de encolarse.
    #[error("ya hay una petición idéntica en curso")]
    DuplicateRequest,

    /// Fallo genérico de una fuente externa (búsqueda o metadata).
    #[error("la fuente {provider} falló: {reason}")]
    Source { provider: &'static str, reason: String },
}

impl MusicError {
    pub fn resolution(title: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            title: title.into(),
            reason: reason.into(),
        }
    }

    pub fn source(provider: &'static str, reason: impl Into<String>) -> Self {
        Self::Source {
            provider,
            reason: reason.into(),
        }
    }
}
