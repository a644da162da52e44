//! Session registry: the single source of truth for containers owned by
//! this server.
//!
//! The registry backs idle eviction and the operational endpoints. It is
//! a concurrent map plus a single periodic sweep task; per-session state
//! uses atomics, so no lock is held across await points.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use super::Session;

/// Snapshot of one live session, as exposed by the operational API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub id: String,
    /// Full image reference the container runs.
    pub image: String,
    /// Creation time, unix milliseconds.
    #[serde(rename = "createdAt")]
    pub created_at: u64,
    /// Last inbound client activity, unix milliseconds.
    #[serde(rename = "lastActivity")]
    pub last_activity: u64,
}

/// Thread-safe registry of container-backed sessions.
pub struct SessionRegistry {
    /// Map of session ID to session.
    sessions: DashMap<String, Arc<Session>>,

    /// Inactivity span after which a session is evicted.
    idle_timeout: Duration,
}

impl SessionRegistry {
    /// Create a registry with the given idle timeout.
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
        }
    }

    /// Register a new session. The idle deadline starts at registration.
    pub fn register(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.sessions
            .insert(session.id().to_string(), Arc::clone(&session));

        tracing::info!(
            session_id = %session.id(),
            image = %session.image(),
            "Registered container session"
        );

        session
    }

    /// Refresh a session's activity timestamp, rescheduling its idle
    /// deadline. Unknown ids are a no-op (the session may have been
    /// evicted while the message was in flight).
    pub fn touch(&self, session_id: &str) {
        if let Some(session) = self.sessions.get(session_id) {
            session.touch();
        }
    }

    /// Snapshot every live session.
    pub fn list(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|entry| {
                let s = entry.value();
                SessionSummary {
                    id: s.id().to_string(),
                    image: s.image().to_string(),
                    created_at: s.created_at_ms(),
                    last_activity: s.last_activity_ms(),
                }
            })
            .collect()
    }

    /// Force-terminate a session and drop it from the registry.
    ///
    /// Returns `true` if the session existed. Killing an already-gone
    /// session is a no-op, not an error: the entry is removed before any
    /// engine call, so concurrent teardown paths cannot double-kill.
    pub async fn kill_and_remove(&self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some((_, session)) => {
                session.destroy().await;
                tracing::info!(session_id = %session_id, "Session killed and removed");
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Evict every session whose idle span exceeds the timeout.
    ///
    /// Returns the number of sessions evicted.
    pub async fn sweep(&self) -> usize {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for() >= self.idle_timeout)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for id in expired {
            if self.kill_and_remove(&id).await {
                tracing::info!(session_id = %id, "Evicted idle session");
                evicted += 1;
            }
        }

        evicted
    }

    /// Start the background sweep task.
    ///
    /// # Arguments
    /// * `interval` - How often to check idle deadlines. Must be
    ///   comfortably below the idle timeout; tests run it at millisecond
    ///   cadence.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                registry.sweep().await;
            }
        });
    }

    /// Kill every session. Called on server shutdown so no containers are
    /// orphaned.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.kill_and_remove(&id).await;
        }
    }
}
