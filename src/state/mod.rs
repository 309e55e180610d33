//! Session state store
//!
//! Holds one `ConversationState` per session behind its own mutex. A turn
//! holds the session lock for its whole duration; a second turn arriving
//! meanwhile is rejected instead of queued.

use crate::error::AgentError;
use crate::memory::ConversationState;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

/// Exclusive access to one session's state for the duration of a turn.
pub type SessionGuard = OwnedMutexGuard<ConversationState>;

/// Trait for session persistence
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Lock the session for a turn, creating it if unknown.
    async fn acquire(&self, session_id: &str, customer_id: &str) -> Result<SessionGuard>;

    /// Drop the session's state. Returns whether it existed.
    async fn abandon(&self, session_id: &str) -> Result<bool>;

    /// Remove idle sessions. Sessions with a turn in flight are kept.
    async fn evict_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// In-memory session store
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<Mutex<ConversationState>>>>>,
    idle_ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 60))
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn acquire(&self, session_id: &str, customer_id: &str) -> Result<SessionGuard> {
        let slot = {
            let existing = self.sessions.read().await.get(session_id).cloned();
            match existing {
                Some(slot) => slot,
                None => {
                    let mut sessions = self.sessions.write().await;
                    sessions
                        .entry(session_id.to_string())
                        .or_insert_with(|| {
                            debug!(session_id = session_id, "Starting new session");
                            Arc::new(Mutex::new(ConversationState::new(session_id, customer_id)))
                        })
                        .clone()
                }
            }
        };

        let guard = slot
            .try_lock_owned()
            .map_err(|_| AgentError::SessionBusy(session_id.to_string()))?;

        if guard.customer_id != customer_id {
            return Err(AgentError::SessionMismatch(session_id.to_string()));
        }

        Ok(guard)
    }

    async fn abandon(&self, session_id: &str) -> Result<bool> {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            info!(session_id = session_id, "Session abandoned");
        }
        Ok(removed)
    }

    async fn evict_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, slot| match slot.try_lock() {
            Ok(state) => !state.is_expired(now, self.idle_ttl),
            // turn in flight
            Err(_) => true,
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted = evicted, remaining = sessions.len(), "Expired sessions evicted");
        }
        Ok(evicted)
    }
}
