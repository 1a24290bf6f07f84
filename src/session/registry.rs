//! Session registry: the map from session id to live transport.

use super::transport::{Transport, TransportConfig};
use super::types::SessionId;
use crate::error::SessionError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A live session as owned by the registry.
#[derive(Clone)]
pub struct Session {
    pub id: SessionId,
    pub transport: Arc<Transport>,
    pub created_at: DateTime<Utc>,
}

type SessionMap = HashMap<SessionId, Session>;

/// Lets a transport remove itself after a fatal error without keeping the
/// registry alive.
#[derive(Clone)]
pub(crate) struct Evictor {
    sessions: Weak<RwLock<SessionMap>>,
}

impl Evictor {
    /// An evictor bound to no registry.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            sessions: Weak::new(),
        }
    }

    pub(crate) async fn evict(&self, id: &SessionId) {
        let Some(sessions) = self.sessions.upgrade() else {
            return;
        };
        if sessions.write().await.remove(id).is_some() {
            warn!(session_id = %id, "Evicted failed session");
        }
    }
}

/// Concurrent session table.
///
/// Cloning yields another handle to the same table. Independent registries
/// can coexist in one process.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<SessionMap>>,
    transport_config: TransportConfig,
}

impl SessionRegistry {
    pub fn new(transport_config: TransportConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            transport_config,
        }
    }

    /// Mint a session id and register a fresh, uninitialized transport for it.
    pub async fn create(&self) -> Result<(SessionId, Arc<Transport>), SessionError> {
        self.insert(SessionId::random()).await
    }

    async fn insert(&self, id: SessionId) -> Result<(SessionId, Arc<Transport>), SessionError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(SessionError::IdCollision(id));
        }
        let evictor = Evictor {
            sessions: Arc::downgrade(&self.sessions),
        };
        let transport = Arc::new(Transport::new(id, self.transport_config.clone(), evictor));
        sessions.insert(
            id,
            Session {
                id,
                transport: Arc::clone(&transport),
                created_at: transport.created_at(),
            },
        );
        info!(session_id = %id, live_sessions = sessions.len(), "Created session");
        Ok((id, transport))
    }

    pub async fn lookup(&self, id: &SessionId) -> Option<Arc<Transport>> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|session| Arc::clone(&session.transport))
    }

    /// Remove a session and close its transport. Returns false if the id was
    /// not registered.
    pub async fn remove(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                // Already closed by a teardown exchange in the common case.
                let _ = session.transport.close().await;
                info!(session_id = %id, "Removed session");
                true
            }
            None => {
                debug!(session_id = %id, "Remove of unknown session");
                false
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove and close sessions idle for longer than `max_idle`.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let expired: Vec<Session> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, s)| s.transport.is_idle(max_idle))
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        }; // registry lock dropped before closing transports

        for session in &expired {
            warn!(
                session_id = %session.id,
                idle_secs = session.transport.idle_for().as_secs(),
                "Reaping idle session"
            );
            let _ = session.transport.close().await;
        }
        expired.len()
    }

    /// Close every live session. Used at process shutdown.
    pub async fn drain(&self) -> usize {
        let drained: Vec<Session> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, session)| session).collect()
        };
        for session in &drained {
            let _ = session.transport.close().await;
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "Closed all sessions");
        }
        drained.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}
