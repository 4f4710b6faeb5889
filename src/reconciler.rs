//! Profile provisioning on sign-in.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::backend::{NewProfile, RecordStore};
use crate::config::{Config, LookupFailurePolicy, ProfileCreation, DEFAULT_PLAN_ID};
use crate::session::User;

/// Identity details a profile is provisioned from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSeed {
    pub identity_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub company: Option<String>,
}

impl From<&User> for ProfileSeed {
    fn from(user: &User) -> Self {
        Self {
            identity_id: user.id.clone(),
            email: user.email.clone(),
            display_name: user.metadata.full_name.clone(),
            company: user.metadata.company.clone(),
        }
    }
}

/// What a reconcile call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A profile already existed; nothing was written.
    Existing,
    /// This call created the profile.
    Created,
    /// The lookup missed but another writer created the row first.
    AlreadyProvisioned,
    /// The lookup failed and [`LookupFailurePolicy::Skip`] applied.
    Skipped,
    /// Creation failed; the error was logged.
    Failed,
}

/// Ensures a profile exists for every identity that signs in.
#[derive(Clone)]
pub struct ProfileReconciler {
    records: Arc<dyn RecordStore>,
    default_plan_id: String,
    lookup_failure: LookupFailurePolicy,
    creation: ProfileCreation,
}

impl ProfileReconciler {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self {
            records,
            default_plan_id: DEFAULT_PLAN_ID.to_string(),
            lookup_failure: LookupFailurePolicy::default(),
            creation: ProfileCreation::default(),
        }
    }

    pub fn from_config(records: Arc<dyn RecordStore>, config: &Config) -> Self {
        Self {
            records,
            default_plan_id: config.default_plan_id.clone(),
            lookup_failure: config.lookup_failure,
            creation: config.profile_creation,
        }
    }

    pub fn with_lookup_failure(mut self, policy: LookupFailurePolicy) -> Self {
        self.lookup_failure = policy;
        self
    }

    pub fn with_creation(mut self, creation: ProfileCreation) -> Self {
        self.creation = creation;
        self
    }

    /// Creates the identity's profile if it does not exist yet.
    ///
    /// Never fails: storage errors are logged and reported through the
    /// returned outcome.
    pub async fn reconcile(&self, seed: ProfileSeed) -> ReconcileOutcome {
        match self.records.find_profile(&seed.identity_id).await {
            Ok(Some(_)) => {
                debug!(identity_id = %seed.identity_id, "profile exists");
                return ReconcileOutcome::Existing;
            }
            Ok(None) => {}
            Err(e) => match self.lookup_failure {
                LookupFailurePolicy::Skip => {
                    warn!(
                        identity_id = %seed.identity_id,
                        error = %e,
                        "profile lookup failed, skipping provisioning"
                    );
                    return ReconcileOutcome::Skipped;
                }
                LookupFailurePolicy::Provision => {
                    warn!(
                        identity_id = %seed.identity_id,
                        error = %e,
                        "profile lookup failed, provisioning anyway"
                    );
                }
            },
        }

        self.create(seed).await
    }

    async fn create(&self, seed: ProfileSeed) -> ReconcileOutcome {
        let identity_id = seed.identity_id.clone();
        let profile = NewProfile {
            id: seed.identity_id,
            email: seed.email,
            display_name: seed.display_name,
            company: seed.company,
            subscription_plan_id: self.default_plan_id.clone(),
        };

        let created = match self.creation {
            ProfileCreation::CreateOrIgnore => self.records.insert_profile_if_absent(profile).await,
            ProfileCreation::LookupThenCreate => {
                self.records.insert_profile(profile).await.map(|_| true)
            }
        };

        match created {
            Ok(true) => {
                info!(identity_id = %identity_id, plan_id = %self.default_plan_id, "profile created");
                ReconcileOutcome::Created
            }
            Ok(false) => {
                debug!(identity_id = %identity_id, "profile created concurrently");
                ReconcileOutcome::AlreadyProvisioned
            }
            Err(e) => {
                error!(identity_id = %identity_id, error = %e, "profile creation failed");
                ReconcileOutcome::Failed
            }
        }
    }
}
