use std::sync::Arc;

use dashmap::DashSet;

use crate::{RequesterId, SessionId};

/// Clave de una petición en curso: misma sesión, mismo usuario y misma
/// consulta significan la misma petición.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RequestKey {
    session: SessionId,
    requester: RequesterId,
    query: String,
}

/// Supresor de comandos duplicados en vuelo.
///
/// Un reintento del usuario mientras su petición original sigue en curso
/// se rechaza, no se encola. La liberación va atada al `Drop` del permiso,
/// así que está garantizada también ante errores y pánicos.
#[derive(Debug, Default, Clone)]
pub struct RequestGuard {
    in_flight: Arc<DashSet<RequestKey>>,
}

impl RequestGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intenta registrar la petición. `None` si una idéntica sigue en
    /// curso.
    pub fn try_acquire(
        &self,
        session: SessionId,
        requester: RequesterId,
        query: &str,
    ) -> Option<RequestPermit> {
        let key = RequestKey {
            session,
            requester,
            query: query.to_string(),
        };

        if self.in_flight.insert(key.clone()) {
            Some(RequestPermit {
                in_flight: Arc::clone(&self.in_flight),
                key,
            })
        } else {
            None
        }
    }
}

/// Permiso de una petición en curso; al soltarse libera la clave.
#[derive(Debug)]
pub struct RequestPermit {
    in_flight: Arc<DashSet<RequestKey>>,
    key: RequestKey,
}

impl Drop for RequestPermit {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}
