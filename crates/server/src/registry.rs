//! Session registry
//!
//! Tracks live connections and enforces the concurrent-session cap.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;

/// Registry of live sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Instant>>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Register a new session; fails when the cap is reached.
    pub fn try_register(&self) -> Option<String> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            return None;
        }
        let id = uuid::Uuid::new_v4().to_string();
        sessions.insert(id.clone(), Instant::now());
        tracing::info!(session_id = %id, active = sessions.len(), "session registered");
        Some(id)
    }

    pub fn remove(&self, id: &str) {
        let mut sessions = self.sessions.write();
        if sessions.remove(id).is_some() {
            tracing::info!(session_id = %id, active = sessions.len(), "session removed");
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }
}
