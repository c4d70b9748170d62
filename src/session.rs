//! Session provider contract.
//!
//! The session/identity provider is an external collaborator: it issues bearer
//! tokens, knows which tenant the signed-in user belongs to, and can refresh an
//! expired token. The request client only ever reads the current [`Session`]
//! and asks for a refresh after a 401; it never mutates the session itself.

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::time::SystemTime;

/// An authenticated session.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque bearer token.
    pub access_token: String,
    /// Tenant the session is bound to, if the backend is multi-tenant.
    pub tenant_id: Option<String>,
    /// When the token stops being valid, if known.
    pub expires_at: Option<SystemTime>,
}

impl Session {
    /// Create a session with a token and no tenant or expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Session {
            access_token: access_token.into(),
            tenant_id: None,
            expires_at: None,
        }
    }

    /// Bind the session to a tenant.
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Set the token expiry.
    pub fn with_expiry(mut self, expires_at: SystemTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// A session is valid while it has a token that has not expired.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty()
            && self
                .expires_at
                .map_or(true, |expiry| expiry > SystemTime::now())
    }
}

// Tokens must never reach logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("tenant_id", &self.tenant_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of the active session.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The current session, if the user is signed in.
    async fn current(&self) -> Option<Session>;

    /// Obtain a fresh token.
    ///
    /// `Ok(Some(_))` carries the refreshed session, `Ok(None)` means the provider
    /// had no token to hand out, and `Err(_)` means the refresh itself failed.
    async fn refresh(&self) -> Result<Option<Session>>;
}

/// A fixed session that cannot be refreshed.
///
/// Useful for service accounts, tests and demos. `refresh` always answers
/// `Ok(None)`, so a 401 is returned to the caller unchanged.
#[derive(Debug, Default)]
pub struct StaticSession {
    session: RwLock<Option<Session>>,
}

impl StaticSession {
    /// Wrap an existing session.
    pub fn new(session: Session) -> Self {
        StaticSession {
            session: RwLock::new(Some(session)),
        }
    }

    /// A provider with nobody signed in.
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Replace the held session.
    pub fn replace(&self, session: Option<Session>) {
        *self.session.write() = session;
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn current(&self) -> Option<Session> {
        self.session.read().clone()
    }

    async fn refresh(&self) -> Result<Option<Session>> {
        Ok(None)
    }
}
