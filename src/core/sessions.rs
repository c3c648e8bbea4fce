// src/core/sessions.rs

//! Session token registry backing `/api/login`/`checkLogin`/`logout`:
//! a sliding-expiry token store with a background task that sweeps
//! expired entries.

use crate::core::metrics::SESSIONS_ACTIVE;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::info;

const SESSION_TTL: ChronoDuration = ChronoDuration::hours(1);
const CLEAN_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Mints a fresh 48-hex-byte session token.
    pub fn create(&self) -> String {
        let mut bytes = [0u8; 48];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let mut guard = self.sessions.lock();
        guard.insert(token.clone(), Utc::now() + SESSION_TTL);
        SESSIONS_ACTIVE.set(guard.len() as f64);
        token
    }

    /// `true` iff `token` is known and unexpired; sliding its expiry
    /// forward on every successful check.
    pub fn touch(&self, token: &str) -> bool {
        let mut guard = self.sessions.lock();
        match guard.get_mut(token) {
            Some(expiry) if *expiry > Utc::now() => {
                *expiry = Utc::now() + SESSION_TTL;
                true
            }
            Some(_) => {
                guard.remove(token);
                false
            }
            None => false,
        }
    }

    pub fn revoke(&self, token: &str) {
        let mut guard = self.sessions.lock();
        guard.remove(token);
        SESSIONS_ACTIVE.set(guard.len() as f64);
    }

    fn sweep_expired(&self) {
        let now = Utc::now();
        let mut guard = self.sessions.lock();
        let before = guard.len();
        guard.retain(|_, expiry| *expiry > now);
        if guard.len() != before {
            info!(removed = before - guard.len(), "swept expired sessions");
        }
        SESSIONS_ACTIVE.set(guard.len() as f64);
    }

    /// Spawns the background cleaner that sweeps expired sessions once a
    /// minute, for the lifetime of the process.
    pub fn spawn_cleaner(&self) {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(CLEAN_INTERVAL);
            loop {
                ticker.tick().await;
                registry.sweep_expired();
            }
        });
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_token_touches_true_until_revoked() {
        let registry = SessionRegistry::new();
        let token = registry.create();
        assert!(registry.touch(&token));
        registry.revoke(&token);
        assert!(!registry.touch(&token));
    }

    #[test]
    fn unknown_token_never_touches() {
        let registry = SessionRegistry::new();
        assert!(!registry.touch("not-a-real-token"));
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let registry = SessionRegistry::new();
        let live = registry.create();
        {
            let mut guard = registry.sessions.lock();
            guard.insert("stale".to_string(), Utc::now() - ChronoDuration::seconds(1));
        }
        registry.sweep_expired();
        assert!(registry.touch(&live));
        assert!(!registry.touch("stale"));
    }
}
