//! Login sessions and the OAuth2 state bindings that correlate callbacks
//! with them.

use std::collections::BTreeMap;
use std::time::Duration;

use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Random bytes in session ids and OAuth2 states.
const TOKEN_BYTES: usize = 16;

/// Generates an unguessable hex token.
#[must_use]
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Authentication result recorded on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthenticationState {
    /// Login has not finished.
    #[default]
    Pending,
    /// The provider authenticated the user.
    Ok,
    /// Login failed or was refused.
    Failed,
}

/// Where a session is in the login flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginPhase {
    /// Created, not yet sent to the provider.
    #[default]
    Started,
    /// Redirected to the provider; waiting for the callback.
    AwaitingCallback,
    /// Callback processed, user authenticated.
    Succeeded,
    /// Callback processed, login failed.
    Failed,
}

/// A login session for one SP.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Session id.
    pub sid: String,
    /// The SP entity id the login is for.
    pub entity_id: String,
    /// Social service that authenticated the user.
    pub service: Option<String>,
    /// Authentication result.
    pub authentication: AuthenticationState,
    /// `SUCCESS` once authenticated.
    pub status: Option<String>,
    /// Authenticating authority of the provider.
    pub authn_auth: Option<String>,
    /// Permanent user id at the provider.
    pub permanent_id: Option<String>,
    /// Login phase.
    pub phase: LoginPhase,
    /// Attributes converted from the provider profile.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Session {
    /// Creates a pending session for `entity_id` with a fresh id.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            sid: random_token(),
            entity_id: entity_id.into(),
            service: None,
            authentication: AuthenticationState::Pending,
            status: None,
            authn_auth: None,
            permanent_id: None,
            phase: LoginPhase::Started,
            attributes: BTreeMap::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Returns `true` if the session is older than `ttl`.
    #[must_use]
    pub fn is_expired(&self, ttl: Duration, now: OffsetDateTime) -> bool {
        now - self.created_at > ttl
    }
}

#[derive(Debug, Clone)]
struct StateBinding {
    sid: String,
    created_at: OffsetDateTime,
}

/// Shared session storage.
///
/// Sessions are keyed by id; OAuth2 states map to the id of the session that
/// issued them. Every operation touches a single key.
#[derive(Debug, Default)]
pub struct SessionCache {
    sessions: DashMap<String, Session>,
    states: DashMap<String, StateBinding>,
}

impl SessionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and stores a new session for `entity_id`.
    pub fn create(&self, entity_id: &str) -> Session {
        let session = Session::new(entity_id);
        self.sessions.insert(session.sid.clone(), session.clone());
        session
    }

    /// Returns the session `sid` if it exists and belongs to `entity_id`,
    /// otherwise creates a new one.
    pub fn get_or_create(&self, sid: Option<&str>, entity_id: &str) -> Session {
        sid.and_then(|sid| self.get(sid))
            .filter(|session| session.entity_id == entity_id)
            .unwrap_or_else(|| self.create(entity_id))
    }

    /// Returns a copy of the session.
    #[must_use]
    pub fn get(&self, sid: &str) -> Option<Session> {
        self.sessions.get(sid).map(|entry| entry.value().clone())
    }

    /// Stores `session`, replacing any session with the same id.
    pub fn put(&self, session: Session) {
        self.sessions.insert(session.sid.clone(), session);
    }

    /// Applies `f` to the session in place. Returns `false` if it does not exist.
    pub fn update<F>(&self, sid: &str, f: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        match self.sessions.get_mut(sid) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    /// Removes a session.
    pub fn remove(&self, sid: &str) -> Option<Session> {
        self.sessions.remove(sid).map(|(_, session)| session)
    }

    /// Binds an OAuth2 `state` to session `sid`.
    pub fn bind_state(&self, state: &str, sid: &str) {
        self.states.insert(
            state.to_string(),
            StateBinding {
                sid: sid.to_string(),
                created_at: OffsetDateTime::now_utc(),
            },
        );
    }

    /// Removes the binding for `state` and returns its session id.
    ///
    /// A state can be taken once.
    pub fn take_state(&self, state: &str) -> Option<String> {
        self.states.remove(state).map(|(_, binding)| binding.sid)
    }

    /// Number of sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops sessions and state bindings older than `ttl`. Returns the number
    /// of sessions removed.
    pub fn purge_expired(&self, ttl: Duration) -> usize {
        let now = OffsetDateTime::now_utc();
        let before = self.sessions.len();

        self.sessions.retain(|_, session| !session.is_expired(ttl, now));
        self.states
            .retain(|_, binding| now - binding.created_at <= ttl);

        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::debug!(removed, "Purged expired sessions");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_tokens_differ() {
        let a = random_token();
        let b = random_token();
        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_new_session_is_pending() {
        let cache = SessionCache::new();
        let session = cache.create("https://sp.example/");

        assert_eq!(session.authentication, AuthenticationState::Pending);
        assert_eq!(session.phase, LoginPhase::Started);
        assert_eq!(cache.get(&session.sid).unwrap().entity_id, "https://sp.example/");
    }

    #[test]
    fn test_get_or_create() {
        let cache = SessionCache::new();
        let session = cache.create("A");

        let same = cache.get_or_create(Some(&session.sid), "A");
        assert_eq!(same.sid, session.sid);

        // a session of another SP is not reused
        let other = cache.get_or_create(Some(&session.sid), "B");
        assert_ne!(other.sid, session.sid);

        let fresh = cache.get_or_create(Some("unknown"), "A");
        assert_ne!(fresh.sid, session.sid);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_state_is_one_shot() {
        let cache = SessionCache::new();
        let session = cache.create("A");
        cache.bind_state("state-1", &session.sid);

        assert_eq!(cache.take_state("state-1"), Some(session.sid));
        assert_eq!(cache.take_state("state-1"), None);
    }

    #[test]
    fn test_update() {
        let cache = SessionCache::new();
        let session = cache.create("A");

        assert!(cache.update(&session.sid, |s| s.authentication = AuthenticationState::Failed));
        assert_eq!(
            cache.get(&session.sid).unwrap().authentication,
            AuthenticationState::Failed
        );
        assert!(!cache.update("missing", |_| {}));
    }

    #[test]
    fn test_purge_expired() {
        let cache = SessionCache::new();
        let mut old = Session::new("A");
        old.created_at = OffsetDateTime::now_utc() - Duration::from_secs(120);
        cache.put(old.clone());
        let fresh = cache.create("B");
        cache.bind_state("s", &fresh.sid);

        assert_eq!(cache.purge_expired(Duration::from_secs(60)), 1);
        assert!(cache.get(&old.sid).is_none());
        assert!(cache.get(&fresh.sid).is_some());
        assert_eq!(cache.take_state("s"), Some(fresh.sid));
    }

    #[test]
    fn test_authentication_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&AuthenticationState::Failed).unwrap(),
            "\"FAILED\""
        );
        assert_eq!(
            serde_json::to_string(&AuthenticationState::Ok).unwrap(),
            "\"OK\""
        );
    }
}
