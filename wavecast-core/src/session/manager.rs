//! Session registry and idle reaper.
//!
//! Owns every live session keyed by id, with idempotent create/get/delete
//! and a periodic sweep that removes sessions idle past a configured
//! timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{info, warn};

use super::{AudioMetadata, Session, TranscriptionConfig};

/// Sessions idle longer than this are reaped (default 30 min).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 60);
/// Reaper sweep interval (default 60s).
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Owns every live [`Session`], keyed by session id.
///
/// Sessions are wrapped in `parking_lot::Mutex` individually so the
/// dispatcher holding one session's lock never blocks lookups of another.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<parking_lot::Mutex<Session>>>>,
    max_age: Duration,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE)
    }
}

impl SessionManager {
    pub fn new(max_age: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_age,
        }
    }

    /// Create a session if `session_id` is unseen; otherwise return the
    /// existing one unchanged. Creation is idempotent per id.
    pub fn get_or_create(
        &self,
        session_id: &str,
        metadata: AudioMetadata,
        config: TranscriptionConfig,
    ) -> Arc<parking_lot::Mutex<Session>> {
        if let Some(existing) = self.sessions.read().get(session_id) {
            return existing.clone();
        }

        let mut sessions = self.sessions.write();
        // Re-check under the write lock: another caller may have created
        // it between the read-lock check above and acquiring this one.
        if let Some(existing) = sessions.get(session_id) {
            return existing.clone();
        }

        let session = Arc::new(parking_lot::Mutex::new(Session::new(
            session_id.to_string(),
            metadata,
            config,
        )));
        sessions.insert(session_id.to_string(), session.clone());
        info!(session_id, "session created");
        session
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<parking_lot::Mutex<Session>>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Remove a session, returning whether it existed.
    pub fn delete(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id).is_some();
        if removed {
            info!(session_id, "session removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Remove every session whose `last_activity` is older than `max_age`.
    /// Returns the ids removed.
    pub fn reap_idle(&self) -> Vec<String> {
        let now = Utc::now();
        let max_age_secs = self.max_age.as_secs() as i64;

        let stale: Vec<String> = {
            let sessions = self.sessions.read();
            sessions
                .iter()
                .filter(|(_, session)| session.lock().age_seconds(now) > max_age_secs)
                .map(|(id, _)| id.clone())
                .collect()
        };

        if stale.is_empty() {
            return stale;
        }

        let mut sessions = self.sessions.write();
        for id in &stale {
            sessions.remove(id);
        }
        warn!(count = stale.len(), "reaped idle sessions");
        stale
    }
}

/// Spawn the periodic reaper task. Runs until the returned `JoinHandle`
/// is aborted or the process exits.
pub fn spawn_reaper(
    manager: Arc<SessionManager>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            manager.reap_idle();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{AudioMetadata, TranscriptionConfig};

    fn manager_with_max_age(max_age: Duration) -> SessionManager {
        SessionManager::new(max_age)
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let manager = SessionManager::default();
        let a = manager.get_or_create("s1", AudioMetadata::default(), TranscriptionConfig::default());
        let b = manager.get_or_create("s1", AudioMetadata::default(), TranscriptionConfig::default());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn get_returns_none_for_unknown() {
        let manager = SessionManager::default();
        assert!(manager.get("ghost").is_none());
    }

    #[test]
    fn delete_removes_and_reports_existence() {
        let manager = SessionManager::default();
        manager.get_or_create("s1", AudioMetadata::default(), TranscriptionConfig::default());
        assert!(manager.delete("s1"));
        assert!(!manager.delete("s1"));
        assert!(manager.is_empty());
    }

    #[test]
    fn reap_idle_removes_only_stale_sessions() {
        let manager = manager_with_max_age(Duration::from_secs(30));
        let session = manager.get_or_create("stale", AudioMetadata::default(), TranscriptionConfig::default());
        session.lock().last_activity = Utc::now() - chrono::Duration::seconds(31);
        let removed = manager.reap_idle();
        assert_eq!(removed, vec!["stale".to_string()]);
        assert!(manager.is_empty());
    }

    #[test]
    fn reap_idle_is_strictly_greater_than_max_age() {
        let manager = manager_with_max_age(Duration::from_secs(30));
        let session = manager.get_or_create("boundary", AudioMetadata::default(), TranscriptionConfig::default());
        session.lock().last_activity = Utc::now() - chrono::Duration::seconds(30);
        let removed = manager.reap_idle();
        assert!(removed.is_empty(), "age exactly equal to max_age must not be reaped");
    }

    #[test]
    fn reap_idle_keeps_fresh_sessions() {
        let manager = manager_with_max_age(Duration::from_secs(3600));
        manager.get_or_create("fresh", AudioMetadata::default(), TranscriptionConfig::default());
        let removed = manager.reap_idle();
        assert!(removed.is_empty());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_reaper_reaps_on_schedule() {
        let manager = Arc::new(manager_with_max_age(Duration::from_secs(30)));
        let session = manager.get_or_create("s1", AudioMetadata::default(), TranscriptionConfig::default());
        session.lock().last_activity = Utc::now() - chrono::Duration::seconds(31);

        let handle = spawn_reaper(manager.clone(), Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        assert!(manager.is_empty());
        handle.abort();
    }
}
