//! Access control: may a learner open a module?

use std::collections::HashSet;

use serde::Serialize;
use trackflow_core::{
    DenyReason, Identity, Module, ModuleAccess, ModuleId, ModuleState, Track, TrackId,
    UserModuleProgress,
};
use tracing::debug;

use crate::engine::{require_user, TrackEngine};
use crate::error::Result;

/// State of one module for one learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModuleStateEntry {
    /// Module
    pub module_id: ModuleId,
    /// Derived state
    pub state: ModuleState,
}

/// Decide access from loaded state.
///
/// `modules` must be ordered by `order_index`. An explicit prerequisite
/// that is no longer part of the track falls back to the positional one.
pub fn evaluate_access(
    track: Option<&Track>,
    modules: &[Module],
    completed: &HashSet<ModuleId>,
    is_premium: bool,
    module_id: ModuleId,
) -> ModuleAccess {
    let Some(track) = track.filter(|t| t.is_published) else {
        return ModuleAccess::deny(module_id, DenyReason::NotFound);
    };
    if track.is_premium && !is_premium {
        return ModuleAccess::deny(module_id, DenyReason::PremiumRequired);
    }
    let Some(position) = modules.iter().position(|m| m.id == module_id) else {
        return ModuleAccess::deny(module_id, DenyReason::NotFound);
    };

    match prerequisite_of(modules, position) {
        Some(required) if !completed.contains(&required) => {
            ModuleAccess::deny(module_id, DenyReason::PreviousIncomplete)
        }
        _ => ModuleAccess::allow(module_id),
    }
}

fn prerequisite_of(modules: &[Module], position: usize) -> Option<ModuleId> {
    let explicit = modules[position]
        .prerequisite
        .filter(|p| modules.iter().any(|m| m.id == *p));
    explicit.or_else(|| position.checked_sub(1).map(|prev| modules[prev].id))
}

/// Per-module states, in module order.
pub fn derive_states(
    track: &Track,
    modules: &[Module],
    completed: &HashSet<ModuleId>,
    is_premium: bool,
) -> Vec<ModuleStateEntry> {
    let mut current_taken = false;
    modules
        .iter()
        .map(|module| {
            let state = if completed.contains(&module.id) {
                ModuleState::Completed
            } else if evaluate_access(Some(track), modules, completed, is_premium, module.id).allowed
            {
                if current_taken {
                    ModuleState::Available
                } else {
                    current_taken = true;
                    ModuleState::Current
                }
            } else {
                ModuleState::Locked
            };
            ModuleStateEntry { module_id: module.id, state }
        })
        .collect()
}

pub(crate) fn completed_set(completions: &[UserModuleProgress]) -> HashSet<ModuleId> {
    completions
        .iter()
        .filter(|c| c.is_completed)
        .map(|c| c.module_id)
        .collect()
}

impl TrackEngine {
    /// Check whether the caller may open `module_id`.
    ///
    /// Denials are returned as data. Store failures are errors, never a
    /// denial. Reads only.
    pub async fn check_module_access(
        &self,
        identity: &Identity,
        track_id: TrackId,
        module_id: ModuleId,
    ) -> Result<ModuleAccess> {
        require_user(&identity.user_id)?;

        let track = self
            .bounded("load_track", self.storage.load_track(track_id))
            .await?;
        let modules = match &track {
            Some(t) if t.is_published => self.modules(track_id).await?,
            _ => Vec::new(),
        };
        let completions = if modules.iter().any(|m| m.id == module_id) {
            self.bounded(
                "list_module_progress",
                self.storage
                    .list_module_progress(&identity.user_id, track_id),
            )
            .await?
        } else {
            Vec::new()
        };

        let access = evaluate_access(
            track.as_ref(),
            &modules,
            &completed_set(&completions),
            identity.is_premium,
            module_id,
        );
        debug!(
            user = %identity.user_id,
            track = %track_id,
            module = %module_id,
            allowed = access.allowed,
            reason = access.reason.map(|r| r.as_str()).unwrap_or("-"),
            "module access evaluated"
        );
        Ok(access)
    }

    /// States of every module in a published track for the caller.
    pub async fn module_states(
        &self,
        identity: &Identity,
        track_id: TrackId,
    ) -> Result<Vec<ModuleStateEntry>> {
        require_user(&identity.user_id)?;
        let track = self.published_track(track_id).await?;
        let modules = self.modules(track_id).await?;
        let completions = self
            .bounded(
                "list_module_progress",
                self.storage
                    .list_module_progress(&identity.user_id, track_id),
            )
            .await?;
        Ok(derive_states(
            &track,
            &modules,
            &completed_set(&completions),
            identity.is_premium,
        ))
    }
}
