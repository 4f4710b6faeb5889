//! Capabilities consumed from the managed backend.
//!
//! The authentication service and the record store are separate traits so the
//! record side can be served by [`SeaOrmStore`](crate::SeaOrmStore) while
//! authentication stays with whatever identity provider the deployment uses.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::entity::{profile, subscription_plan};
use crate::error::{CredentialError, Result};
use crate::session::{AuthStateChange, Session, UserMetadata};

/// Authentication half of the backend.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Returns the session the backend already holds, if any.
    async fn get_session(&self) -> Result<Option<Session>>;

    /// Subscribes to auth-state notifications, delivered in emission order.
    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<UserMetadata>,
    ) -> std::result::Result<(), CredentialError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<(), CredentialError>;

    async fn sign_out(&self) -> std::result::Result<(), CredentialError>;

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> std::result::Result<(), CredentialError>;
}

/// Fields of a profile about to be provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfile {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub company: Option<String>,
    pub subscription_plan_id: String,
}

/// Record half of the backend: the `profiles` and `subscription_plans`
/// collections.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_profile(&self, identity_id: &str) -> Result<Option<profile::Model>>;

    /// Inserts a profile; fails if one already exists for the identity.
    async fn insert_profile(&self, profile: NewProfile) -> Result<profile::Model>;

    /// Inserts a profile unless one already exists for the identity.
    ///
    /// Returns `true` when this call created the row.
    async fn insert_profile_if_absent(&self, profile: NewProfile) -> Result<bool>;

    async fn find_plan(&self, plan_id: &str) -> Result<Option<subscription_plan::Model>>;
}
