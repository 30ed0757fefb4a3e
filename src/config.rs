use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error de carga o validación de configuración.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("valor inválido para {var}: {reason}")]
    Invalid { var: String, reason: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Prebuffering
    pub prebuffer_cache_size: usize,
    pub prebuffer_eviction_margin: usize,
    pub prebuffer_lookahead: usize,
    pub prebuffer_cooldown_ms: u64,
    pub prebuffer_spacing_ms: u64,
    pub prebuffer_trigger_delay_ms: u64,

    // Conexión
    pub idle_timeout_ms: u64,

    // APIs (Opcionales)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub soundcloud_client_id: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Audio
            default_volume: env_parse("DEFAULT_VOLUME", 0.5)?,
            max_queue_size: env_parse("MAX_QUEUE_SIZE", 100)?,

            // Prebuffering (valores afinados para no perturbar el stream en vivo)
            prebuffer_cache_size: env_parse("PREBUFFER_CACHE_SIZE", 50)?,
            prebuffer_eviction_margin: env_parse("PREBUFFER_EVICTION_MARGIN", 10)?,
            prebuffer_lookahead: env_parse("PREBUFFER_LOOKAHEAD", 2)?,
            prebuffer_cooldown_ms: env_parse("PREBUFFER_COOLDOWN_MS", 1_000)?,
            prebuffer_spacing_ms: env_parse("PREBUFFER_SPACING_MS", 500)?,
            prebuffer_trigger_delay_ms: env_parse("PREBUFFER_TRIGGER_DELAY_MS", 2_000)?,

            // Conexión
            idle_timeout_ms: env_parse("IDLE_TIMEOUT_MS", 300_000)?, // 5 minutos

            // APIs
            spotify_client_id: env_opt("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: env_opt("SPOTIFY_CLIENT_SECRET"),
            soundcloud_client_id: env_opt("SOUNDCLOUD_CLIENT_ID"),
        };

        config.validate()?;

        Ok(config)
    }

    /// Valida los valores de configuración antes de usarlos.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            return Err(invalid(
                "DEFAULT_VOLUME",
                format!("debe estar entre 0.0 y 1.0, recibido: {}", self.default_volume),
            ));
        }

        if self.max_queue_size == 0 {
            return Err(invalid("MAX_QUEUE_SIZE", "debe ser mayor que 0"));
        }

        if self.prebuffer_cache_size == 0 {
            return Err(invalid("PREBUFFER_CACHE_SIZE", "debe ser mayor que 0"));
        }

        if self.prebuffer_lookahead == 0 {
            return Err(invalid("PREBUFFER_LOOKAHEAD", "debe ser mayor que 0"));
        }

        if self.idle_timeout_ms == 0 {
            return Err(invalid("IDLE_TIMEOUT_MS", "debe ser mayor que 0"));
        }

        Ok(())
    }

    /// Resumen seguro de la configuración para los logs (sin credenciales).
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Audio: {}% vol, {} queue max\n  \
            Prebuffer: {} entries (+{} margin), lookahead {}, cooldown {}ms, spacing {}ms, trigger {}ms\n  \
            Idle timeout: {}s\n  \
            Providers: spotify={}, soundcloud={}",
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.prebuffer_cache_size,
            self.prebuffer_eviction_margin,
            self.prebuffer_lookahead,
            self.prebuffer_cooldown_ms,
            self.prebuffer_spacing_ms,
            self.prebuffer_trigger_delay_ms,
            self.idle_timeout_ms / 1_000,
            self.spotify_client_id.is_some() && self.spotify_client_secret.is_some(),
            self.soundcloud_client_id.is_some(),
        )
    }

    pub fn prebuffer_cooldown(&self) -> Duration {
        Duration::from_millis(self.prebuffer_cooldown_ms)
    }

    pub fn prebuffer_spacing(&self) -> Duration {
        Duration::from_millis(self.prebuffer_spacing_ms)
    }

    pub fn prebuffer_trigger_delay(&self) -> Duration {
        Duration::from_millis(self.prebuffer_trigger_delay_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Valores por defecto, elegidos para no competir con el stream en vivo.
impl Default for Config {
    fn default() -> Self {
        Self {
            default_volume: 0.5,
            max_queue_size: 100,
            prebuffer_cache_size: 50,
            prebuffer_eviction_margin: 10,
            prebuffer_lookahead: 2,
            prebuffer_cooldown_ms: 1_000,
            prebuffer_spacing_ms: 500,
            prebuffer_trigger_delay_ms: 2_000,
            idle_timeout_ms: 300_000,
            spotify_client_id: None,
            spotify_client_secret: None,
            soundcloud_client_id: None,
        }
    }
}

fn env_parse<T>(var: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e: T::Err| invalid(var, e.to_string())),
        _ => Ok(default),
    }
}

fn env_opt(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn invalid(var: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var: var.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_queue_size, 100);
        assert_eq!(config.prebuffer_cache_size, 50);
        assert_eq!(config.idle_timeout_ms, 300_000);
    }

    #[test]
    fn volume_out_of_range_is_rejected() {
        let config = Config {
            default_volume: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn summary_has_no_credentials() {
        let config = Config {
            spotify_client_id: Some("id-secreta".into()),
            spotify_client_secret: Some("clave-secreta".into()),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("id-secreta"));
        assert!(!summary.contains("clave-secreta"));
    }
}
