//! Authenticated identities and the sessions that carry them.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Optional profile details supplied at sign-up and carried on the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    /// Full name entered on the sign-up form.
    pub full_name: Option<String>,
    /// Company entered on the sign-up form.
    pub company: Option<String>,
}

/// An authenticated principal as issued by the authentication backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable identity id. Profiles are keyed by it.
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub metadata: UserMetadata,
}

/// A live authenticated session.
///
/// The identity id of a session is the id of its [`User`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    /// Instant after which the session must no longer be reported as current.
    pub expiry: OffsetDateTime,
    pub user: User,
}

impl Session {
    /// Identity id of the authenticated user.
    pub fn identity_id(&self) -> &str {
        &self.user.id
    }

    /// Whether the session has expired as of now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Whether the session has expired as of `now`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expiry <= now
    }
}

/// Tag carried by every auth-state notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

/// One notification from the auth-state stream.
///
/// `session` replaces the current session unconditionally, whatever the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStateChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

impl AuthStateChange {
    pub fn signed_in(session: Session) -> Self {
        Self {
            event: AuthEvent::SignedIn,
            session: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            event: AuthEvent::SignedOut,
            session: None,
        }
    }
}
