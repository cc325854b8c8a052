//! Registry session credentials
//!
//! The registry portal only answers requests that carry the `PSUSR` and
//! `JSESSIONID` cookies of a logged-in browser session. Refreshing them is a
//! manual operator task; the crawler only reads whatever is currently
//! active.

use crate::config::SessionConfig;
use crate::storage::StorageResult;
use chrono::{DateTime, Utc};

/// Cookies attached to every registry request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    /// Value of the `PSUSR` cookie
    pub primary_token: String,
    /// Value of the `JSESSIONID` cookie
    pub session_id: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionCredential {
    pub fn new(primary_token: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            primary_token: primary_token.into(),
            session_id: session_id.into(),
            is_active: true,
            expires_at: None,
        }
    }

    /// Renders the `Cookie` header value
    pub fn cookie_header(&self) -> String {
        format!("PSUSR={}; JSESSIONID={}", self.primary_token, self.session_id)
    }

    /// True once `expires_at` lies in the past; credentials without an
    /// expiry never expire
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

impl From<&SessionConfig> for SessionCredential {
    fn from(config: &SessionConfig) -> Self {
        Self {
            primary_token: config.primary_token.clone(),
            session_id: config.session_id.clone(),
            is_active: true,
            expires_at: config.expires_at,
        }
    }
}

/// Source of the active session
///
/// Read-only to the crawler: it is asked once per request and never told
/// about auth failures.
pub trait CookieStore: Send {
    /// Returns the session to send, None when there is none
    fn active_session(&self) -> StorageResult<Option<SessionCredential>>;
}

/// Cookie store holding one fixed credential, usually from the config file
#[derive(Debug, Clone, Default)]
pub struct StaticCookieStore {
    session: Option<SessionCredential>,
}

impl StaticCookieStore {
    pub fn new(session: Option<SessionCredential>) -> Self {
        Self { session }
    }

    /// A store that never yields a session
    pub fn empty() -> Self {
        Self::default()
    }
}

impl CookieStore for StaticCookieStore {
    fn active_session(&self) -> StorageResult<Option<SessionCredential>> {
        Ok(self.session.clone().filter(|s| s.is_active))
    }
}

/// Cookie store preferring the database and falling back to a fixed credential
pub struct LayeredCookieStore<S> {
    primary: S,
    fallback: StaticCookieStore,
}

impl<S: CookieStore> LayeredCookieStore<S> {
    pub fn new(primary: S, fallback: StaticCookieStore) -> Self {
        Self { primary, fallback }
    }
}

impl<S: CookieStore> CookieStore for LayeredCookieStore<S> {
    fn active_session(&self) -> StorageResult<Option<SessionCredential>> {
        match self.primary.active_session()? {
            Some(session) => Ok(Some(session)),
            None => self.fallback.active_session(),
        }
    }
}
