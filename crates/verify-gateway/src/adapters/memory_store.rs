//! In-memory [`VerificationStore`] for tests and local runs.
//!
//! Follows the same rules as the MySQL statements: a session record is
//! updated only while its code is unset, and a user record only matches
//! inside the freshness window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    AuthCode, MatchedRecord, SessionToken, StoreError, UserId, VerificationRecord,
};
use crate::ports::{SystemTimeSource, TimeSource, VerificationStore};

pub struct InMemoryVerificationStore {
    sessions: RwLock<HashMap<String, VerificationRecord>>,
    users: RwLock<Vec<VerificationRecord>>,
    freshness_window: Duration,
    clock: Arc<dyn TimeSource>,
    available: AtomicBool,
    calls: AtomicUsize,
}

impl InMemoryVerificationStore {
    pub fn new(freshness_window: Duration) -> Self {
        Self::with_clock(freshness_window, Arc::new(SystemTimeSource))
    }

    pub fn with_clock(freshness_window: Duration, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            users: RwLock::new(Vec::new()),
            freshness_window,
            clock,
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    /// Seed a pending session record (code unset).
    pub fn insert_session(&self, state: impl Into<String>) {
        let key = state.into();
        let record = VerificationRecord {
            key: key.clone(),
            code: None,
            email: None,
            created_at: self.clock.now(),
        };
        self.sessions.write().insert(key, record);
    }

    /// Seed a user record as written when the email was sent.
    pub fn insert_user_code(
        &self,
        user_id: impl Into<String>,
        email: impl Into<String>,
        code: impl Into<String>,
        created_at: DateTime<Utc>,
    ) {
        self.users.write().push(VerificationRecord {
            key: user_id.into(),
            code: Some(code.into()),
            email: Some(email.into()),
            created_at,
        });
    }

    /// Code stored on a session record, if any.
    pub fn session_code(&self, state: &str) -> Option<String> {
        self.sessions.read().get(state).and_then(|r| r.code.clone())
    }

    /// Simulate the store going away. Every call fails with a connection
    /// error while unavailable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of store calls made so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin_call(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Connection("store offline".into()))
        }
    }

    fn is_fresh(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let Ok(window) = chrono::Duration::from_std(self.freshness_window) else {
            return true;
        };
        created_at <= now && now - created_at <= window
    }
}

#[async_trait]
impl VerificationStore for InMemoryVerificationStore {
    async fn mark_code_received(
        &self,
        state: &SessionToken,
        code: &AuthCode,
    ) -> Result<u64, StoreError> {
        self.begin_call()?;
        let mut sessions = self.sessions.write();
        match sessions.get_mut(state.as_str()) {
            Some(record) if record.code.is_none() => {
                record.code = Some(code.as_str().to_string());
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn find_fresh_record(
        &self,
        user: &UserId,
        code: &AuthCode,
    ) -> Result<Option<MatchedRecord>, StoreError> {
        self.begin_call()?;
        let now = self.clock.now();
        let users = self.users.read();
        let matched = users
            .iter()
            .filter(|r| r.key == user.as_str())
            .filter(|r| r.code.as_deref() == Some(code.as_str()))
            .filter(|r| self.is_fresh(r.created_at, now))
            .max_by_key(|r| r.created_at)
            .map(|r| MatchedRecord {
                user_id: r.key.clone(),
                email: r.email.clone().unwrap_or_default(),
            });
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::validator;

    const WINDOW: Duration = Duration::from_secs(30 * 60);

    struct FixedClock(DateTime<Utc>);

    impl TimeSource for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn state() -> SessionToken {
        validator::session_token(Some("abcd1234abcd1234")).unwrap()
    }

    fn code(raw: &str) -> AuthCode {
        validator::oauth_code(Some(raw)).unwrap()
    }

    #[tokio::test]
    async fn test_session_update_happens_once() {
        let store = InMemoryVerificationStore::new(WINDOW);
        store.insert_session("abcd1234abcd1234");

        assert_eq!(store.mark_code_received(&state(), &code("first")).await.unwrap(), 1);
        assert_eq!(store.mark_code_received(&state(), &code("second")).await.unwrap(), 0);
        assert_eq!(store.session_code("abcd1234abcd1234").as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_unknown_session_affects_nothing() {
        let store = InMemoryVerificationStore::new(WINDOW);
        assert_eq!(store.mark_code_received(&state(), &code("abc")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_user_lookup_respects_window() {
        let now = Utc::now();
        let store = InMemoryVerificationStore::with_clock(WINDOW, Arc::new(FixedClock(now)));
        let user = validator::user_id(Some("12345678")).unwrap();
        let fresh = validator::strict_code(Some("abcd1234abcd1234")).unwrap();
        let stale = validator::strict_code(Some("zzzz1234zzzz1234")).unwrap();

        store.insert_user_code("12345678", "a@dsu.edu", fresh.as_str(), now - chrono::Duration::minutes(5));
        store.insert_user_code("12345678", "a@dsu.edu", stale.as_str(), now - chrono::Duration::minutes(31));

        let found = store.find_fresh_record(&user, &fresh).await.unwrap().unwrap();
        assert_eq!(found.user_id, "12345678");
        assert_eq!(found.email, "a@dsu.edu");
        assert!(store.find_fresh_record(&user, &stale).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_picks_most_recent_match() {
        let now = Utc::now();
        let store = InMemoryVerificationStore::with_clock(WINDOW, Arc::new(FixedClock(now)));
        let user = validator::user_id(Some("12345678")).unwrap();
        let c = validator::strict_code(Some("abcd1234abcd1234")).unwrap();

        store.insert_user_code("12345678", "old@dsu.edu", c.as_str(), now - chrono::Duration::minutes(20));
        store.insert_user_code("12345678", "new@dsu.edu", c.as_str(), now - chrono::Duration::minutes(2));

        let found = store.find_fresh_record(&user, &c).await.unwrap().unwrap();
        assert_eq!(found.email, "new@dsu.edu");
    }

    #[tokio::test]
    async fn test_offline_store_fails_and_counts() {
        let store = InMemoryVerificationStore::new(WINDOW);
        store.set_available(false);
        let err = store.mark_code_received(&state(), &code("abc")).await.unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
        assert_eq!(store.call_count(), 1);
    }
}
