//! Error types for medianode-session.
//!
//! Storage failures are flattened into a string-carrying variant, the way the
//! SeaORM store maps `DbErr`. Credential failures keep the backend-provided
//! message so it can be shown to the user verbatim.

/// A credential operation (sign-up, sign-in, sign-out, password reset) was
/// rejected by the authentication backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CredentialError {
    /// Message provided by the backend, suitable for display.
    pub message: String,
}

impl CredentialError {
    /// Creates a credential error carrying the backend's message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Main error type of this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database or network failure talking to the backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// The authentication backend rejected a credential operation.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),
}

impl From<sea_orm::DbErr> for Error {
    fn from(err: sea_orm::DbErr) -> Self {
        Error::Backend(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
