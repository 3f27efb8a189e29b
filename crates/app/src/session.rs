//! Per-connection session state and the registry tracking live sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use uuid::Uuid;

use voxlink_foundation::HealthCheck;

/// Sessions past this count mark the registry unhealthy; nothing is
/// rejected, the health monitor just starts complaining.
const SESSION_HIGH_WATER: usize = 64;

/// State of one duplex connection. Created on connect, dropped on
/// disconnect or unrecoverable error; nothing outlives the connection.
pub struct SessionState {
    pub user_id: String,
    pub connection_id: Uuid,
    pub started_at: Instant,
    wake_word_active: AtomicBool,
}

impl SessionState {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            connection_id: Uuid::new_v4(),
            started_at: Instant::now(),
            wake_word_active: AtomicBool::new(false),
        }
    }

    /// Mark the session active. One-way: there is no way to clear the
    /// flag within a session. Returns true only for the transition.
    pub fn activate(&self) -> bool {
        !self.wake_word_active.fetch_or(true, Ordering::SeqCst)
    }

    pub fn is_wake_active(&self) -> bool {
        self.wake_word_active.load(Ordering::SeqCst)
    }
}

/// Live sessions keyed by connection identity. Sessions share nothing
/// with each other; the registry exists for accounting and health only.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<SessionState>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: &str) -> Arc<SessionState> {
        let session = Arc::new(SessionState::new(user_id));
        self.sessions
            .write()
            .insert(session.connection_id, Arc::clone(&session));
        tracing::info!(
            user_id = %session.user_id,
            connection_id = %session.connection_id,
            "Session registered"
        );
        session
    }

    pub fn remove(&self, connection_id: &Uuid) {
        if self.sessions.write().remove(connection_id).is_some() {
            tracing::info!(connection_id = %connection_id, "Session removed");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn get(&self, connection_id: &Uuid) -> Option<Arc<SessionState>> {
        self.sessions.read().get(connection_id).cloned()
    }
}

pub struct RegistryHealth {
    registry: Arc<SessionRegistry>,
}

impl RegistryHealth {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

impl HealthCheck for RegistryHealth {
    fn check(&self) -> Result<(), String> {
        let count = self.registry.len();
        if count > SESSION_HIGH_WATER {
            return Err(format!("{} live sessions (high water {})", count, SESSION_HIGH_WATER));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "session-registry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_flag_only_transitions_once() {
        let session = SessionState::new("alice");
        assert!(!session.is_wake_active());
        assert!(session.activate());
        assert!(session.is_wake_active());
        // Re-activation reports no transition, and the flag stays set.
        assert!(!session.activate());
        assert!(session.is_wake_active());
    }

    #[test]
    fn registry_tracks_register_and_remove() {
        let registry = SessionRegistry::new();
        let a = registry.register("alice");
        let b = registry.register("bob");
        assert_eq!(registry.len(), 2);
        assert!(registry.get(&a.connection_id).is_some());

        registry.remove(&a.connection_id);
        assert_eq!(registry.len(), 1);
        registry.remove(&a.connection_id); // second remove is a no-op
        assert_eq!(registry.len(), 1);
        registry.remove(&b.connection_id);
        assert!(registry.is_empty());
    }

    #[test]
    fn sessions_for_the_same_user_are_distinct() {
        let registry = SessionRegistry::new();
        let first = registry.register("alice");
        let second = registry.register("alice");
        assert_ne!(first.connection_id, second.connection_id);
        first.activate();
        assert!(!second.is_wake_active());
    }

    #[test]
    fn registry_health_trips_past_high_water() {
        let registry = Arc::new(SessionRegistry::new());
        let health = RegistryHealth::new(Arc::clone(&registry));
        assert!(health.check().is_ok());
        for _ in 0..=SESSION_HIGH_WATER {
            registry.register("load");
        }
        assert!(health.check().is_err());
    }
}
