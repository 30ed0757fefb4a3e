use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::{ChannelId, SessionId};

/// Parámetros para abrir una conexión de audio saliente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionParams {
    pub session: SessionId,
    pub channel: ChannelId,
}

/// Handle opaco de una conexión abierta; el sink lo mapea a su estado
/// interno.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkHandle(u64);

impl SinkHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Desenlace de un stream activo. Terminar de forma natural nunca es un
/// error y debe distinguirse de un fallo de transporte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// El stream llegó a su fin natural; toca encadenar el siguiente.
    Finished,
    /// El stream fue detenido explícitamente (skip/stop).
    Stopped,
    /// El transporte falló a mitad de la reproducción.
    Failed,
}

/// Capacidad de salida de audio consumida por el controlador.
///
/// El códec, el handshake de voz y el envío de frames viven del otro lado
/// de esta interfaz; el núcleo solo conoce URLs reproducibles y handles.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Abre una conexión de audio hacia el canal indicado.
    async fn open(&self, params: ConnectionParams) -> Result<SinkHandle>;

    /// Comienza a transmitir desde la URL dada. El receiver devuelto se
    /// resuelve una única vez con el desenlace del stream.
    async fn stream_from(&self, handle: SinkHandle, url: &str) -> Result<oneshot::Receiver<StreamEnd>>;

    /// Ajusta la ganancia del stream activo sin interrumpirlo.
    async fn set_gain(&self, handle: SinkHandle, gain: f32) -> Result<()>;

    /// Pausa el stream activo preservando la posición.
    async fn pause(&self, handle: SinkHandle) -> Result<()>;

    /// Reanuda un stream pausado.
    async fn resume(&self, handle: SinkHandle) -> Result<()>;

    /// Detiene el stream activo; el receiver pendiente recibe `Stopped`.
    async fn stop(&self, handle: SinkHandle) -> Result<()>;

    /// Cierra la conexión y libera sus recursos.
    async fn close(&self, handle: SinkHandle) -> Result<()>;
}
