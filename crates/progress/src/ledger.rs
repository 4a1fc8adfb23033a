//! Progress ledger: module completion and derived track progress.

use serde::Serialize;
use trackflow_core::{
    Identity, ModuleId, ProgressView, TrackId, UserId, UserModuleProgress, UserTrackProgress,
};
use tracing::info;

use crate::engine::{require_user, TrackEngine};
use crate::error::{Result, TrackError};

/// Result of a completion call.
#[derive(Debug, Clone, Serialize)]
pub struct TrackProgressSnapshot {
    /// Track progress after the call
    pub progress: ProgressView,
    /// Completed modules currently in the track
    pub completed_modules: usize,
    /// Modules currently in the track
    pub total_modules: usize,
    /// The stored completion for the module
    pub module_progress: UserModuleProgress,
    /// False when the module had already been completed
    pub newly_completed: bool,
}

impl TrackEngine {
    /// Mark a module completed for the caller.
    ///
    /// Repeated calls succeed without touching the original timestamp. The
    /// first call that brings every module to completed stamps the track's
    /// `completed_at`; later calls never overwrite it.
    pub async fn complete_module(
        &self,
        identity: &Identity,
        track_id: TrackId,
        module_id: ModuleId,
    ) -> Result<TrackProgressSnapshot> {
        let user_id = &identity.user_id;
        require_user(user_id)?;

        self.published_track(track_id).await?;
        let modules = self.modules(track_id).await?;
        if !modules.iter().any(|m| m.id == module_id) {
            return Err(TrackError::NotFound(format!(
                "module {} in track {}",
                module_id, track_id
            )));
        }

        // Completing a module implies the track was started.
        let (progress, _) = self
            .bounded(
                "start_track",
                self.storage
                    .start_track(&UserTrackProgress::started(user_id.clone(), track_id)),
            )
            .await?;

        let completion = UserModuleProgress::completed_now(user_id.clone(), track_id, module_id);
        let (module_progress, newly_completed) = self
            .bounded("complete_module", self.storage.complete_module(&completion))
            .await?;

        // Read after our own write: of two racing completions, the one that
        // reads last observes both.
        let (mut view, completions) = self.view_of(&progress, &modules).await?;
        let completed_modules = modules
            .iter()
            .filter(|m| completions.iter().any(|c| c.module_id == m.id && c.is_completed))
            .count();

        if completed_modules == modules.len() && progress.completed_at.is_none() {
            if let Some(stored) = self
                .bounded(
                    "mark_track_completed",
                    self.storage
                        .mark_track_completed(user_id, track_id, chrono::Utc::now()),
                )
                .await?
            {
                view.completed_at = stored.completed_at;
            }
            info!(user = %user_id, track = %track_id, "track completed");
        }

        info!(
            user = %user_id,
            track = %track_id,
            module = %module_id,
            newly_completed,
            percentage = view.progress_percentage,
            "module completion recorded"
        );

        Ok(TrackProgressSnapshot {
            progress: view,
            completed_modules,
            total_modules: modules.len(),
            module_progress,
            newly_completed,
        })
    }

    /// Current progress of `user_id` on a track, or `None` if never started.
    pub async fn track_progress(
        &self,
        user_id: &UserId,
        track_id: TrackId,
    ) -> Result<Option<ProgressView>> {
        let Some(progress) = self
            .bounded(
                "load_track_progress",
                self.storage.load_track_progress(user_id, track_id),
            )
            .await?
        else {
            return Ok(None);
        };
        let modules = self.modules(track_id).await?;
        let (view, _) = self.view_of(&progress, &modules).await?;
        Ok(Some(view))
    }

    /// Percentage for `user_id` computed from a count query.
    pub(crate) async fn percentage_for(
        &self,
        user_id: &UserId,
        track_id: TrackId,
    ) -> Result<u8> {
        let modules = self.modules(track_id).await?;
        let ids: Vec<ModuleId> = modules.iter().map(|m| m.id).collect();
        let completed = self
            .bounded(
                "count_completed_modules",
                self.storage.count_completed_modules(user_id, track_id, &ids),
            )
            .await?;
        Ok(trackflow_core::progress_percentage(completed, ids.len()))
    }
}
