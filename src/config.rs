//! Runtime configuration.

use std::env;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::limits::SceneLimits;

/// Plan assigned to freshly provisioned profiles and assumed when a profile
/// carries no plan id.
pub const DEFAULT_PLAN_ID: &str = "free";

/// What the profile reconciler does when the profile lookup itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupFailurePolicy {
    /// Treat the failure like an existing profile and do nothing. A transient
    /// error on the very first sign-in leaves the identity unprovisioned until
    /// the next sign-in.
    #[default]
    Skip,
    /// Attempt creation anyway. Pair with [`ProfileCreation::CreateOrIgnore`]
    /// so an existing row is left untouched.
    Provision,
}

impl FromStr for LookupFailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "provision" => Ok(Self::Provision),
            other => Err(Error::Config(format!(
                "unknown profile lookup failure policy `{other}` (expected `skip` or `provision`)"
            ))),
        }
    }
}

/// How a missing profile is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileCreation {
    /// Insert and ignore a primary-key conflict, so racing sign-ins for the
    /// same identity still produce exactly one row.
    #[default]
    CreateOrIgnore,
    /// Plain insert after the lookup. A racing creator surfaces as a failed
    /// insert.
    LookupThenCreate,
}

impl FromStr for ProfileCreation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create-or-ignore" => Ok(Self::CreateOrIgnore),
            "lookup-then-create" => Ok(Self::LookupThenCreate),
            other => Err(Error::Config(format!(
                "unknown profile creation strategy `{other}` (expected `create-or-ignore` or `lookup-then-create`)"
            ))),
        }
    }
}

/// Configuration shared by the auth context, reconciler and limits calculator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Plan id given to new profiles.
    pub default_plan_id: String,
    /// Limits reported when no plan can be resolved.
    pub fallback_limits: SceneLimits,
    pub lookup_failure: LookupFailurePolicy,
    pub profile_creation: ProfileCreation,
    /// Where password-reset emails send the user back to.
    pub reset_redirect_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_plan_id: DEFAULT_PLAN_ID.to_string(),
            fallback_limits: SceneLimits::fallback(),
            lookup_failure: LookupFailurePolicy::default(),
            profile_creation: ProfileCreation::default(),
            reset_redirect_url: None,
        }
    }
}

impl Config {
    /// Builds a configuration from `MEDIANODE_*` environment variables, using
    /// defaults for anything unset.
    ///
    /// | Variable                           | Field                |
    /// |------------------------------------|----------------------|
    /// | `MEDIANODE_DEFAULT_PLAN`           | `default_plan_id`    |
    /// | `MEDIANODE_PROFILE_LOOKUP_FAILURE` | `lookup_failure`     |
    /// | `MEDIANODE_PROFILE_CREATION`       | `profile_creation`   |
    /// | `MEDIANODE_RESET_REDIRECT_URL`     | `reset_redirect_url` |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(plan) = lookup("MEDIANODE_DEFAULT_PLAN") {
            let plan = plan.trim();
            if plan.is_empty() {
                return Err(Error::Config("MEDIANODE_DEFAULT_PLAN is empty".into()));
            }
            config.default_plan_id = plan.to_string();
        }
        if let Some(policy) = lookup("MEDIANODE_PROFILE_LOOKUP_FAILURE") {
            config.lookup_failure = policy.parse()?;
        }
        if let Some(creation) = lookup("MEDIANODE_PROFILE_CREATION") {
            config.profile_creation = creation.parse()?;
        }
        config.reset_redirect_url = lookup("MEDIANODE_RESET_REDIRECT_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        Ok(config)
    }

    pub fn with_default_plan_id(mut self, plan_id: impl Into<String>) -> Self {
        self.default_plan_id = plan_id.into();
        self
    }

    pub fn with_lookup_failure(mut self, policy: LookupFailurePolicy) -> Self {
        self.lookup_failure = policy;
        self
    }

    pub fn with_profile_creation(mut self, creation: ProfileCreation) -> Self {
        self.profile_creation = creation;
        self
    }

    pub fn with_reset_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.reset_redirect_url = Some(url.into());
        self
    }
}
