use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::realtime::session::SessionId;

/// What the worker knows about one open session.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub connected_at: DateTime<Utc>,
    pub remote: Option<SocketAddr>,
}

/// Open sessions of this worker, plus the id sequence.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
    seq: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            seq: AtomicU64::new(1),
        }
    }

    /// Allocate the next id; ids are never reused within a worker.
    pub fn next_id(&self) -> SessionId {
        SessionId(self.seq.fetch_add(1, Ordering::Relaxed))
    }

    pub fn insert(&self, id: SessionId, entry: SessionEntry) {
        self.sessions.insert(id, entry);
    }

    /// Insert and hand back a guard that removes the entry when dropped.
    pub fn enter(self: &Arc<Self>, id: SessionId, entry: SessionEntry) -> SessionGuard {
        self.insert(id, entry);
        SessionGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    pub fn remove(&self, id: SessionId) -> Option<SessionEntry> {
        self.sessions.remove(&id).map(|(_, e)| e)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Registry membership of one session. The entry goes away with the guard,
/// including on early returns and unwinding.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: SessionId,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Remove the entry now and return what was recorded.
    pub fn leave(self) -> Option<SessionEntry> {
        self.registry.remove(self.id)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
