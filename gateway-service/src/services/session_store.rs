//! Server-side session storage.
//!
//! Sessions hold the OAuth artifacts the BFF flow produces; the browser only
//! ever sees the opaque session id. The trait keeps the backend swappable
//! (an external store would slot in behind it); the demo runs on an
//! in-process map.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;

use crate::models::session::BrowserSession;
use service_core::error::AppError;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<BrowserSession>, AppError>;
    async fn save(&self, session: BrowserSession) -> Result<(), AppError>;
    async fn delete(&self, session_id: &str) -> Result<(), AppError>;
    /// Administrative reset only.
    async fn clear_all(&self) -> Result<(), AppError>;
    /// Drop sessions idle past their TTL; returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, AppError>;
    async fn active_count(&self) -> usize;
}

pub struct InMemorySessionStore {
    sessions: DashMap<String, BrowserSession>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: Duration::minutes(ttl_minutes.max(1)),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<BrowserSession>, AppError> {
        let now = Utc::now();
        match self.sessions.get(session_id) {
            Some(entry) if entry.is_expired(now, self.ttl) => {
                drop(entry);
                self.sessions.remove(session_id);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.clone())),
            None => Ok(None),
        }
    }

    async fn save(&self, mut session: BrowserSession) -> Result<(), AppError> {
        session.touch();
        self.sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), AppError> {
        self.sessions.remove(session_id);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), AppError> {
        self.sessions.clear();
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, AppError> {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !session.is_expired(now, self.ttl));
        Ok(before - self.sessions.len())
    }

    async fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let store = InMemorySessionStore::new(60);
        let mut session = BrowserSession::new("sid-1");
        session.begin_authorization("state".into(), "verifier".into());

        store.save(session).await.unwrap();
        let loaded = store.load("sid-1").await.unwrap().unwrap();
        assert_eq!(loaded.csrf_state.as_deref(), Some("state"));
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let store = InMemorySessionStore::new(60);
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped_on_load() {
        let store = InMemorySessionStore::new(1);
        let mut session = BrowserSession::new("sid-1");
        session.last_seen_utc = Utc::now() - Duration::minutes(5);
        // Bypass save() so the stale last_seen survives.
        store.sessions.insert("sid-1".to_string(), session);

        assert!(store.load("sid-1").await.unwrap().is_none());
        assert_eq!(store.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_clear_all_wipes_everything() {
        let store = InMemorySessionStore::new(60);
        store.save(BrowserSession::new("a")).await.unwrap();
        store.save(BrowserSession::new("b")).await.unwrap();

        store.clear_all().await.unwrap();
        assert_eq!(store.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_purge_expired_counts_removed() {
        let store = InMemorySessionStore::new(1);
        let mut stale = BrowserSession::new("stale");
        stale.last_seen_utc = Utc::now() - Duration::minutes(10);
        store.sessions.insert("stale".to_string(), stale);
        store.save(BrowserSession::new("fresh")).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.active_count().await, 1);
    }
}
