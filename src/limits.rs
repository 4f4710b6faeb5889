//! Plan-derived scene limits.
//!
//! A story's scene count is bounded by the plan on the author's profile. The
//! calculator never fails: any missing or unreadable data degrades to
//! [`SceneLimits::fallback`].

use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::RecordStore;
use crate::config::DEFAULT_PLAN_ID;

/// Smallest scene count a user may choose.
pub const MIN_SCENES: u32 = 2;

/// Floor of the suggested scene count, before clamping to the plan maximum.
pub const SUGGESTED_SCENES_FLOOR: u32 = 5;

const FALLBACK_MAX_SCENES: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneLimits {
    pub max_scenes: u32,
    pub suggested_scenes: u32,
    /// Name of the resolved plan; `None` when the fallback is in effect.
    pub plan_name: Option<String>,
}

impl SceneLimits {
    /// Limits used when no plan resolves: 10 scenes, 5 suggested.
    pub fn fallback() -> Self {
        Self {
            max_scenes: FALLBACK_MAX_SCENES,
            suggested_scenes: SUGGESTED_SCENES_FLOOR,
            plan_name: None,
        }
    }

    /// Limits for a plan allowing `max_scenes`.
    pub fn for_plan(plan_name: impl Into<String>, max_scenes: u32) -> Self {
        Self {
            max_scenes,
            suggested_scenes: suggested_scenes(max_scenes),
            plan_name: Some(plan_name.into()),
        }
    }

    /// Maps a user-chosen scene count into `[MIN_SCENES, max_scenes]`.
    ///
    /// If a malformed plan sets `max_scenes` below [`MIN_SCENES`], the plan
    /// maximum wins.
    pub fn clamp_scene_count(&self, requested: u32) -> u32 {
        requested.max(MIN_SCENES).min(self.max_scenes)
    }
}

impl Default for SceneLimits {
    fn default() -> Self {
        Self::fallback()
    }
}

/// `max(5, max_scenes / 2)`, never above `max_scenes`.
pub fn suggested_scenes(max_scenes: u32) -> u32 {
    (max_scenes / 2).max(SUGGESTED_SCENES_FLOOR).min(max_scenes)
}

/// Resolves [`SceneLimits`] for an identity from its profile and plan.
#[derive(Clone)]
pub struct LimitsCalculator {
    records: Arc<dyn RecordStore>,
    fallback: SceneLimits,
}

impl LimitsCalculator {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self {
            records,
            fallback: SceneLimits::fallback(),
        }
    }

    pub fn with_fallback(mut self, fallback: SceneLimits) -> Self {
        self.fallback = fallback;
        self
    }

    /// Looks up the identity's profile, then its plan, and derives the limits.
    ///
    /// Lookup errors are logged and answered with the fallback.
    pub async fn resolve_limits(&self, identity_id: &str) -> SceneLimits {
        let profile = match self.records.find_profile(identity_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                debug!(identity_id, "no profile, using fallback scene limits");
                return self.fallback.clone();
            }
            Err(e) => {
                warn!(identity_id, error = %e, "profile lookup failed, using fallback scene limits");
                return self.fallback.clone();
            }
        };

        let plan_id = match profile.subscription_plan_id.as_str() {
            "" => DEFAULT_PLAN_ID,
            id => id,
        };

        let plan = match self.records.find_plan(plan_id).await {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                warn!(identity_id, plan_id, "plan not found, using fallback scene limits");
                return self.fallback.clone();
            }
            Err(e) => {
                warn!(identity_id, plan_id, error = %e, "plan lookup failed, using fallback scene limits");
                return self.fallback.clone();
            }
        };

        match u32::try_from(plan.max_scene_count) {
            Ok(max_scenes) => SceneLimits::for_plan(plan.name, max_scenes),
            Err(_) => {
                warn!(
                    plan_id,
                    max_scene_count = plan.max_scene_count,
                    "plan has a negative scene limit, using fallback scene limits"
                );
                self.fallback.clone()
            }
        }
    }
}
