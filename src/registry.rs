//! Room id → active session.

use crate::session::Session;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Thread-safe session storage, at most one active session per room.
#[derive(Clone, Default)]
pub struct Registry {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `session` unless its room already has an active one.
    /// Returns false and leaves the existing session untouched on conflict.
    pub async fn create(&self, session: Arc<Session>) -> bool {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&session.room_id) {
            if existing.is_active() {
                return false;
            }
            // Finished but not yet deregistered; its own removal will no-op.
            debug!(room_id = %session.room_id, "replacing finished session");
        }
        sessions.insert(session.room_id.clone(), session);
        true
    }

    pub async fn lookup(&self, room_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(room_id).cloned()
    }

    /// Deregister a session that has left `Active`. Only the exact session
    /// instance is removed; a newer session for the same room stays.
    pub async fn remove(&self, session: &Session) -> bool {
        if session.is_active() {
            return false;
        }
        let mut sessions = self.sessions.write().await;
        match sessions.get(&session.room_id) {
            Some(current) if current.id == session.id => {
                sessions.remove(&session.room_id);
                true
            }
            _ => false,
        }
    }

    pub async fn list(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }
}
